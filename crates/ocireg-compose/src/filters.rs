//! Four filter middlewares: each wraps an `Arc<dyn Registry>` and
//! implements `Registry` again, so any number of them stack in any
//! order.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use ocireg_core::registry::{BlobWriter, Registry};
use ocireg_core::{ByteStream, Descriptor, Digest, DistributionErrorCode, Error, Paged, Result};

fn denied() -> Error {
    Error::new(DistributionErrorCode::Denied)
}

fn error_only_stream<T: Send + 'static>(e: Error) -> Paged<T> {
    Box::pin(futures::stream::once(async move { Err(e) }))
}

/// Permits only repositories for which `allow` returns true. Reads
/// and lists on a disallowed repository answer as if the repository
/// does not exist; writes are denied outright rather than pretending
/// not-found, since a write attempt is never ambiguous about intent.
pub struct Select {
    inner: Arc<dyn Registry>,
    allow: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl Select {
    pub fn new(inner: Arc<dyn Registry>, allow: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self { inner, allow: Arc::new(allow) }
    }

    fn check_read(&self, repo: &str) -> Result<()> {
        if (self.allow)(repo) {
            Ok(())
        } else {
            Err(Error::name_unknown())
        }
    }

    fn check_write(&self, repo: &str) -> Result<()> {
        if (self.allow)(repo) {
            Ok(())
        } else {
            Err(denied())
        }
    }
}

#[async_trait]
impl Registry for Select {
    async fn get_blob(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        self.check_read(repo)?;
        self.inner.get_blob(repo, digest).await
    }

    async fn get_blob_range(&self, repo: &str, digest: &Digest, start: i64, end: i64) -> Result<ByteStream> {
        self.check_read(repo)?;
        self.inner.get_blob_range(repo, digest, start, end).await
    }

    async fn get_manifest(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        self.check_read(repo)?;
        self.inner.get_manifest(repo, digest).await
    }

    async fn get_tag(&self, repo: &str, tag: &str) -> Result<ByteStream> {
        self.check_read(repo)?;
        self.inner.get_tag(repo, tag).await
    }

    async fn resolve_blob(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.check_read(repo)?;
        self.inner.resolve_blob(repo, digest).await
    }

    async fn resolve_manifest(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.check_read(repo)?;
        self.inner.resolve_manifest(repo, digest).await
    }

    async fn resolve_tag(&self, repo: &str, tag: &str) -> Result<Descriptor> {
        self.check_read(repo)?;
        self.inner.resolve_tag(repo, tag).await
    }

    async fn push_blob(&self, repo: &str, provisional: &Descriptor, reader: ByteStream) -> Result<Descriptor> {
        self.check_write(repo)?;
        self.inner.push_blob(repo, provisional, reader).await
    }

    async fn push_blob_chunked(&self, repo: &str, chunk_size: usize) -> Result<Box<dyn BlobWriter>> {
        self.check_write(repo)?;
        self.inner.push_blob_chunked(repo, chunk_size).await
    }

    async fn push_blob_chunked_resume(
        &self,
        repo: &str,
        id: &str,
        offset: i64,
        chunk_size: usize,
    ) -> Result<Box<dyn BlobWriter>> {
        self.check_write(repo)?;
        self.inner.push_blob_chunked_resume(repo, id, offset, chunk_size).await
    }

    async fn mount_blob(&self, from_repo: &str, to_repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.check_read(from_repo)?;
        self.check_write(to_repo)?;
        self.inner.mount_blob(from_repo, to_repo, digest).await
    }

    async fn push_manifest(
        &self,
        repo: &str,
        tag: Option<&str>,
        bytes: Bytes,
        media_type: Option<&str>,
    ) -> Result<Descriptor> {
        self.check_write(repo)?;
        self.inner.push_manifest(repo, tag, bytes, media_type).await
    }

    async fn delete_blob(&self, repo: &str, digest: &Digest) -> Result<()> {
        self.check_write(repo)?;
        self.inner.delete_blob(repo, digest).await
    }

    async fn delete_manifest(&self, repo: &str, digest: &Digest) -> Result<()> {
        self.check_write(repo)?;
        self.inner.delete_manifest(repo, digest).await
    }

    async fn delete_tag(&self, repo: &str, tag: &str) -> Result<()> {
        self.check_write(repo)?;
        self.inner.delete_tag(repo, tag).await
    }

    async fn repositories(&self, start_after: Option<&str>) -> Result<Paged<String>> {
        let inner = self.inner.repositories(start_after).await?;
        Ok(filter_names(inner, self.allow.clone()))
    }

    async fn tags(&self, repo: &str, start_after: Option<&str>) -> Result<Paged<String>> {
        if !(self.allow)(repo) {
            return Ok(error_only_stream(Error::name_unknown()));
        }
        self.inner.tags(repo, start_after).await
    }

    async fn referrers(&self, repo: &str, digest: &Digest, artifact_type: Option<&str>) -> Result<Paged<Descriptor>> {
        if !(self.allow)(repo) {
            return Ok(error_only_stream(Error::name_unknown()));
        }
        self.inner.referrers(repo, digest, artifact_type).await
    }
}

fn filter_names(inner: Paged<String>, allow: Arc<dyn Fn(&str) -> bool + Send + Sync>) -> Paged<String> {
    Box::pin(inner.filter_map(move |item| {
        let allow = allow.clone();
        async move {
            match item {
                Ok(name) if allow(&name) => Some(Ok(name)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        }
    }))
}

/// Exposes only the subtree of repositories under `prefix`, with the
/// prefix stripped from every name the caller sees. `repo` arguments
/// coming in are re-prefixed before reaching `inner`, so a client of
/// `Sub` cannot tell it isn't talking to a registry whose only
/// repositories live under `prefix`.
pub struct Sub {
    inner: Arc<dyn Registry>,
    prefix: String,
}

impl Sub {
    pub fn new(inner: Arc<dyn Registry>, prefix: impl Into<String>) -> Self {
        Self { inner, prefix: prefix.into() }
    }

    fn qualify(&self, repo: &str) -> String {
        format!("{}/{}", self.prefix, repo)
    }
}

#[async_trait]
impl Registry for Sub {
    async fn get_blob(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        self.inner.get_blob(&self.qualify(repo), digest).await
    }

    async fn get_blob_range(&self, repo: &str, digest: &Digest, start: i64, end: i64) -> Result<ByteStream> {
        self.inner.get_blob_range(&self.qualify(repo), digest, start, end).await
    }

    async fn get_manifest(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        self.inner.get_manifest(&self.qualify(repo), digest).await
    }

    async fn get_tag(&self, repo: &str, tag: &str) -> Result<ByteStream> {
        self.inner.get_tag(&self.qualify(repo), tag).await
    }

    async fn resolve_blob(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.inner.resolve_blob(&self.qualify(repo), digest).await
    }

    async fn resolve_manifest(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.inner.resolve_manifest(&self.qualify(repo), digest).await
    }

    async fn resolve_tag(&self, repo: &str, tag: &str) -> Result<Descriptor> {
        self.inner.resolve_tag(&self.qualify(repo), tag).await
    }

    async fn push_blob(&self, repo: &str, provisional: &Descriptor, reader: ByteStream) -> Result<Descriptor> {
        self.inner.push_blob(&self.qualify(repo), provisional, reader).await
    }

    async fn push_blob_chunked(&self, repo: &str, chunk_size: usize) -> Result<Box<dyn BlobWriter>> {
        self.inner.push_blob_chunked(&self.qualify(repo), chunk_size).await
    }

    async fn push_blob_chunked_resume(
        &self,
        repo: &str,
        id: &str,
        offset: i64,
        chunk_size: usize,
    ) -> Result<Box<dyn BlobWriter>> {
        self.inner.push_blob_chunked_resume(&self.qualify(repo), id, offset, chunk_size).await
    }

    async fn mount_blob(&self, from_repo: &str, to_repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.inner.mount_blob(&self.qualify(from_repo), &self.qualify(to_repo), digest).await
    }

    async fn push_manifest(
        &self,
        repo: &str,
        tag: Option<&str>,
        bytes: Bytes,
        media_type: Option<&str>,
    ) -> Result<Descriptor> {
        self.inner.push_manifest(&self.qualify(repo), tag, bytes, media_type).await
    }

    async fn delete_blob(&self, repo: &str, digest: &Digest) -> Result<()> {
        self.inner.delete_blob(&self.qualify(repo), digest).await
    }

    async fn delete_manifest(&self, repo: &str, digest: &Digest) -> Result<()> {
        self.inner.delete_manifest(&self.qualify(repo), digest).await
    }

    async fn delete_tag(&self, repo: &str, tag: &str) -> Result<()> {
        self.inner.delete_tag(&self.qualify(repo), tag).await
    }

    async fn repositories(&self, start_after: Option<&str>) -> Result<Paged<String>> {
        let prefix_with_slash = format!("{}/", self.prefix);
        let cursor = start_after.map(|c| self.qualify(c));
        let inner = self.inner.repositories(cursor.as_deref().or(Some(&prefix_with_slash))).await?;
        Ok(strip_prefix(inner, prefix_with_slash))
    }

    async fn tags(&self, repo: &str, start_after: Option<&str>) -> Result<Paged<String>> {
        self.inner.tags(&self.qualify(repo), start_after).await
    }

    async fn referrers(&self, repo: &str, digest: &Digest, artifact_type: Option<&str>) -> Result<Paged<Descriptor>> {
        self.inner.referrers(&self.qualify(repo), digest, artifact_type).await
    }
}

fn strip_prefix(inner: Paged<String>, prefix_with_slash: String) -> Paged<String> {
    Box::pin(inner.filter_map(move |item| {
        let prefix_with_slash = prefix_with_slash.clone();
        async move {
            match item {
                Ok(name) => name.strip_prefix(prefix_with_slash.as_str()).map(|s| Ok(s.to_string())),
                Err(e) => Some(Err(e)),
            }
        }
    }))
}

/// Passes reads and lists through unchanged; every write or delete
/// answers `UNSUPPORTED`, matching the contract's own do-nothing
/// default rather than inventing a new failure mode.
pub struct ReadOnly {
    inner: Arc<dyn Registry>,
}

impl ReadOnly {
    pub fn new(inner: Arc<dyn Registry>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Registry for ReadOnly {
    async fn get_blob(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        self.inner.get_blob(repo, digest).await
    }

    async fn get_blob_range(&self, repo: &str, digest: &Digest, start: i64, end: i64) -> Result<ByteStream> {
        self.inner.get_blob_range(repo, digest, start, end).await
    }

    async fn get_manifest(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        self.inner.get_manifest(repo, digest).await
    }

    async fn get_tag(&self, repo: &str, tag: &str) -> Result<ByteStream> {
        self.inner.get_tag(repo, tag).await
    }

    async fn resolve_blob(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.inner.resolve_blob(repo, digest).await
    }

    async fn resolve_manifest(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.inner.resolve_manifest(repo, digest).await
    }

    async fn resolve_tag(&self, repo: &str, tag: &str) -> Result<Descriptor> {
        self.inner.resolve_tag(repo, tag).await
    }

    async fn repositories(&self, start_after: Option<&str>) -> Result<Paged<String>> {
        self.inner.repositories(start_after).await
    }

    async fn tags(&self, repo: &str, start_after: Option<&str>) -> Result<Paged<String>> {
        self.inner.tags(repo, start_after).await
    }

    async fn referrers(&self, repo: &str, digest: &Digest, artifact_type: Option<&str>) -> Result<Paged<Descriptor>> {
        self.inner.referrers(repo, digest, artifact_type).await
    }

    // push_blob, push_blob_chunked*, mount_blob, push_manifest,
    // delete_blob, delete_manifest, delete_tag all fall through to
    // the contract's `Unsupported` default.
}

/// Passes everything through except that an existing tag may never be
/// repointed at a different digest, and nothing may be deleted.
/// Pushing the same `(tag, digest)` pair again is a no-op success,
/// since it changes nothing about what the tag resolves to.
pub struct Immutable {
    inner: Arc<dyn Registry>,
}

impl Immutable {
    pub fn new(inner: Arc<dyn Registry>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Registry for Immutable {
    async fn get_blob(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        self.inner.get_blob(repo, digest).await
    }

    async fn get_blob_range(&self, repo: &str, digest: &Digest, start: i64, end: i64) -> Result<ByteStream> {
        self.inner.get_blob_range(repo, digest, start, end).await
    }

    async fn get_manifest(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        self.inner.get_manifest(repo, digest).await
    }

    async fn get_tag(&self, repo: &str, tag: &str) -> Result<ByteStream> {
        self.inner.get_tag(repo, tag).await
    }

    async fn resolve_blob(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.inner.resolve_blob(repo, digest).await
    }

    async fn resolve_manifest(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.inner.resolve_manifest(repo, digest).await
    }

    async fn resolve_tag(&self, repo: &str, tag: &str) -> Result<Descriptor> {
        self.inner.resolve_tag(repo, tag).await
    }

    async fn push_blob(&self, repo: &str, provisional: &Descriptor, reader: ByteStream) -> Result<Descriptor> {
        self.inner.push_blob(repo, provisional, reader).await
    }

    async fn push_blob_chunked(&self, repo: &str, chunk_size: usize) -> Result<Box<dyn BlobWriter>> {
        self.inner.push_blob_chunked(repo, chunk_size).await
    }

    async fn push_blob_chunked_resume(
        &self,
        repo: &str,
        id: &str,
        offset: i64,
        chunk_size: usize,
    ) -> Result<Box<dyn BlobWriter>> {
        self.inner.push_blob_chunked_resume(repo, id, offset, chunk_size).await
    }

    async fn mount_blob(&self, from_repo: &str, to_repo: &str, digest: &Digest) -> Result<Descriptor> {
        self.inner.mount_blob(from_repo, to_repo, digest).await
    }

    async fn push_manifest(
        &self,
        repo: &str,
        tag: Option<&str>,
        bytes: Bytes,
        media_type: Option<&str>,
    ) -> Result<Descriptor> {
        if let Some(tag) = tag {
            if let Ok(existing) = self.inner.resolve_tag(repo, tag).await {
                let incoming_digest = Digest::of(&bytes);
                let incoming_media_type = media_type.map(str::to_string).or_else(|| {
                    ocireg_core::ManifestSpec::try_from(bytes.as_ref()).ok().and_then(|s| s.media_type)
                });
                if existing.digest == incoming_digest
                    && incoming_media_type.as_deref().map(|mt| mt == existing.media_type).unwrap_or(true)
                {
                    return Ok(existing);
                }
                return Err(denied());
            }
        }
        self.inner.push_manifest(repo, tag, bytes, media_type).await
    }

    async fn repositories(&self, start_after: Option<&str>) -> Result<Paged<String>> {
        self.inner.repositories(start_after).await
    }

    async fn tags(&self, repo: &str, start_after: Option<&str>) -> Result<Paged<String>> {
        self.inner.tags(repo, start_after).await
    }

    async fn referrers(&self, repo: &str, digest: &Digest, artifact_type: Option<&str>) -> Result<Paged<Descriptor>> {
        self.inner.referrers(repo, digest, artifact_type).await
    }

    async fn delete_blob(&self, _repo: &str, _digest: &Digest) -> Result<()> {
        Err(denied())
    }

    async fn delete_manifest(&self, _repo: &str, _digest: &Digest) -> Result<()> {
        Err(denied())
    }

    async fn delete_tag(&self, _repo: &str, _tag: &str) -> Result<()> {
        Err(denied())
    }
}
