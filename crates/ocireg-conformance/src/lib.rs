//! A backend-agnostic conformance harness: image fixtures plus a
//! suite of scenarios that any [`ocireg_core::registry::Registry`]
//! implementation is expected to satisfy. Dev-only; every crate that
//! ships a `Registry` impl depends on this as a `[dev-dependencies]`
//! entry and runs the suite from a `tests/conformance.rs` integration
//! test, the same shape `oci-distribution-test` is exercised in.

use bytes::Bytes;
use ocireg_core::ByteStream;

mod errors;
pub use errors::{Error, Result};

mod fixtures;
pub use fixtures::{Image, ImageBuilder, Index, IndexBuilder, Layer, LayerBuilder};

mod suite;
pub use suite::RegistryConformanceSuite;

/// Wrap a single in-memory chunk as the one-shot `ByteStream` every
/// `push_blob`/`push_manifest` call expects a reader to be.
pub(crate) fn single_chunk(bytes: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(bytes) }))
}
