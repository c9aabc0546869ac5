//! The registry contract this crate implements.
//!
//! [`Registry`] is the single polymorphism point: the HTTP server
//! dispatches onto an `Arc<dyn Registry>`, the HTTP client implements
//! it by calling a remote, the in-memory backend implements it
//! directly over maps, and the filter middlewares and unifier each
//! wrap one or two `Arc<dyn Registry>` values and implement it again.
//!
//! Every method has a default that returns [`Error::unsupported`], so
//! an implementer only writes the methods it actually supports -- the
//! idiomatic stand-in for embedding a "do nothing" base struct.

use async_trait::async_trait;
use bytes::Bytes;

use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::stream::{ByteStream, Paged};

/// The OCI auth scope a call requires, for an external authorizer to
/// check before the call proceeds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthScope {
    RepositoryPull(String),
    RepositoryPush(String),
    RepositoryDelete(String),
    Catalog,
}

impl AuthScope {
    pub fn mount(from_repo: &str, to_repo: &str) -> Vec<AuthScope> {
        vec![
            AuthScope::RepositoryPull(from_repo.to_string()),
            AuthScope::RepositoryPush(to_repo.to_string()),
        ]
    }
}

impl std::fmt::Display for AuthScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthScope::RepositoryPull(r) => write!(f, "repository:{r}:pull"),
            AuthScope::RepositoryPush(r) => write!(f, "repository:{r}:push"),
            AuthScope::RepositoryDelete(r) => write!(f, "repository:{r}:delete"),
            AuthScope::Catalog => write!(f, "registry:catalog:*"),
        }
    }
}

/// A mutating handle for a chunked blob upload session.
///
/// Consuming methods take `self: Box<Self>` so the handle can be
/// stored and passed around as `Box<dyn BlobWriter>`.
#[async_trait]
pub trait BlobWriter: Send + Sync {
    /// Append bytes to the session. May buffer internally.
    async fn write(&mut self, bytes: Bytes) -> Result<()>;

    /// Bytes accepted so far.
    fn size(&self) -> i64;

    /// The minimum size of the next non-final chunk, if the
    /// implementation has a preference.
    fn chunk_size(&self) -> usize;

    /// The opaque resume token for this session.
    fn id(&self) -> &str;

    /// Finalize the session into a blob. Fails with `DIGEST_INVALID`
    /// if `expected` does not match the accumulated bytes.
    async fn commit(self: Box<Self>, expected: &Digest) -> Result<Descriptor>;

    /// Abandon the session. Idempotent; safe to call after `commit`.
    async fn cancel(self: Box<Self>) -> Result<()>;

    /// Release resources without cancelling the session.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// The registry contract. See the module documentation.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn get_blob(&self, _repo: &str, _digest: &Digest) -> Result<ByteStream> {
        Err(Error::unsupported())
    }

    async fn get_blob_range(
        &self,
        _repo: &str,
        _digest: &Digest,
        _start: i64,
        _end: i64,
    ) -> Result<ByteStream> {
        Err(Error::unsupported())
    }

    async fn get_manifest(&self, _repo: &str, _digest: &Digest) -> Result<ByteStream> {
        Err(Error::unsupported())
    }

    async fn get_tag(&self, _repo: &str, _tag: &str) -> Result<ByteStream> {
        Err(Error::unsupported())
    }

    async fn resolve_blob(&self, _repo: &str, _digest: &Digest) -> Result<Descriptor> {
        Err(Error::unsupported())
    }

    async fn resolve_manifest(&self, _repo: &str, _digest: &Digest) -> Result<Descriptor> {
        Err(Error::unsupported())
    }

    async fn resolve_tag(&self, _repo: &str, _tag: &str) -> Result<Descriptor> {
        Err(Error::unsupported())
    }

    async fn push_blob(
        &self,
        _repo: &str,
        _provisional: &Descriptor,
        _reader: ByteStream,
    ) -> Result<Descriptor> {
        Err(Error::unsupported())
    }

    async fn push_blob_chunked(&self, _repo: &str, _chunk_size: usize) -> Result<Box<dyn BlobWriter>> {
        Err(Error::unsupported())
    }

    async fn push_blob_chunked_resume(
        &self,
        _repo: &str,
        _id: &str,
        _offset: i64,
        _chunk_size: usize,
    ) -> Result<Box<dyn BlobWriter>> {
        Err(Error::unsupported())
    }

    /// Adopt a blob from another repository without re-uploading it.
    /// Implementations that cannot support cross-repository adoption
    /// should return `UNSUPPORTED` so the caller falls back to a
    /// regular upload.
    async fn mount_blob(&self, _from_repo: &str, _to_repo: &str, _digest: &Digest) -> Result<Descriptor> {
        Err(Error::unsupported())
    }

    async fn push_manifest(
        &self,
        _repo: &str,
        _tag: Option<&str>,
        _bytes: Bytes,
        _media_type: Option<&str>,
    ) -> Result<Descriptor> {
        Err(Error::unsupported())
    }

    async fn delete_blob(&self, _repo: &str, _digest: &Digest) -> Result<()> {
        Err(Error::unsupported())
    }

    async fn delete_manifest(&self, _repo: &str, _digest: &Digest) -> Result<()> {
        Err(Error::unsupported())
    }

    async fn delete_tag(&self, _repo: &str, _tag: &str) -> Result<()> {
        Err(Error::unsupported())
    }

    async fn repositories(&self, _start_after: Option<&str>) -> Result<Paged<String>> {
        Err(Error::unsupported())
    }

    async fn tags(&self, _repo: &str, _start_after: Option<&str>) -> Result<Paged<String>> {
        Err(Error::unsupported())
    }

    async fn referrers(
        &self,
        _repo: &str,
        _digest: &Digest,
        _artifact_type: Option<&str>,
    ) -> Result<Paged<Descriptor>> {
        Err(Error::unsupported())
    }
}
