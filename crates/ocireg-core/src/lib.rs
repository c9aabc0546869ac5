//! # ocireg-core
//!
//! The registry contract, data model, error taxonomy, and request
//! parser shared by every other `ocireg-*` crate. [`ocireg_http`] maps
//! the distribution-spec wire protocol onto this contract,
//! [`ocireg_memory`] implements it over in-process maps, and
//! [`ocireg_client`] implements it by calling a remote registry.
//!
//! The primary set of interoperability types live in [`crate::registry`].

pub mod error;
pub use error::{DistributionErrorCode, Error, ErrorEnvelope, ErrorInfo, Result};

mod digest;
pub use digest::{Digest, Digester};

mod descriptor;
pub use descriptor::{
    Descriptor, ManifestKind, ManifestSpec, MEDIA_TYPE_EMPTY_JSON, MEDIA_TYPE_IMAGE_CONFIG,
    MEDIA_TYPE_IMAGE_INDEX, MEDIA_TYPE_IMAGE_MANIFEST,
};

pub mod name;
pub use name::ManifestRef;

pub mod registry;

mod stream;
pub use stream::{collect_all, ByteStream, ChunkedBody, Paged, VerifyingBody};

pub mod parser;
pub use parser::{construct, decode_upload_id, encode_upload_id, parse, ParsedRequest};
