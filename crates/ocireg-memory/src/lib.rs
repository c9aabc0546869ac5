//! # ocireg-memory
//!
//! The canonical in-memory reference implementation of the registry
//! contract: a process-wide map of maps behind a single mutex,
//! exercising every invariant -- digest validation, manifest reference
//! checking, immutable-tag policy, and the subject/referrers graph.
//!
//! [`MemoryRegistry`] holds that single mutex "across every
//! operation" deliberately: the
//! state is map-of-maps and finer-grained locking would not pay off
//! at the design altitude this backend targets.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::Mutex;

use ocireg_core::name::validate_tag_name;
use ocireg_core::registry::{BlobWriter, Registry};
use ocireg_core::{ByteStream, Descriptor, Digest, DistributionErrorCode, Error, ManifestSpec, Paged, Result};

mod error;
pub use error::Error as MemoryError;

mod repository;
use repository::{validate_references, Repository, StoredManifest, UploadSession};

mod writer;
use writer::{MemoryBlobWriter, DEFAULT_CHUNK_SIZE};

/// In-memory backend configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryConfig {
    /// No tag may be overwritten with a differing (digest, media
    /// type); no tagged manifest (or blob reachable from one) may be
    /// deleted; no tag may be deleted.
    pub immutable_tags: bool,
    /// Disables the "every layer/config/index-member digest must
    /// already exist" enforcement in `push_manifest`.
    pub lax_child_references: bool,
}

pub(crate) struct State {
    repos: Mutex<HashMap<String, Repository>>,
}

/// The in-memory backend. An instance, not a singleton: create
/// as many as you like, each with independent state.
#[derive(Clone)]
pub struct MemoryRegistry {
    state: Arc<State>,
    config: MemoryConfig,
}

impl MemoryRegistry {
    pub fn new(config: MemoryConfig) -> Self {
        Self { state: Arc::new(State { repos: Mutex::new(HashMap::new()) }), config }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl MemoryRegistry {
    /// Create `repo` with no content if it does not already exist.
    /// Used by the `ocireg` binary to pre-populate `static_repositories`
    /// from its config at startup; a no-op for a repo that already has
    /// blobs or manifests in it.
    pub async fn ensure_repository(&self, repo: &str) {
        let mut repos = self.state.repos.lock().await;
        repos.entry(repo.to_string()).or_default();
    }
}

fn name_unknown() -> Error {
    Error::new(DistributionErrorCode::NameUnknown)
}

fn blob_unknown() -> Error {
    Error::new(DistributionErrorCode::BlobUnknown)
}

fn manifest_unknown() -> Error {
    Error::new(DistributionErrorCode::ManifestUnknown)
}

fn single_chunk(bytes: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(bytes) }))
}

fn paged<T: Send + 'static>(items: Vec<T>) -> Paged<T> {
    Box::pin(futures::stream::iter(items.into_iter().map(Ok)))
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn get_blob(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        let repos = self.state.repos.lock().await;
        let r = repos.get(repo).ok_or_else(name_unknown)?;
        let bytes = r.blobs.get(digest).ok_or_else(blob_unknown)?.clone();
        Ok(single_chunk(bytes))
    }

    async fn get_blob_range(&self, repo: &str, digest: &Digest, start: i64, end: i64) -> Result<ByteStream> {
        let repos = self.state.repos.lock().await;
        let r = repos.get(repo).ok_or_else(name_unknown)?;
        let bytes = r.blobs.get(digest).ok_or_else(blob_unknown)?;
        let total = bytes.len() as i64;
        if start < 0 || (total > 0 && start >= total) {
            return Err(Error::new(DistributionErrorCode::RangeInvalid));
        }
        let end = if end < 0 { total } else { end.min(total) };
        let end = end.max(start);
        Ok(single_chunk(bytes.slice(start as usize..end as usize)))
    }

    async fn get_manifest(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        let repos = self.state.repos.lock().await;
        let r = repos.get(repo).ok_or_else(name_unknown)?;
        let stored = r.manifests.get(digest).ok_or_else(manifest_unknown)?;
        Ok(single_chunk(stored.bytes.clone()))
    }

    async fn get_tag(&self, repo: &str, tag: &str) -> Result<ByteStream> {
        let repos = self.state.repos.lock().await;
        let r = repos.get(repo).ok_or_else(name_unknown)?;
        let descriptor = r.tags.get(tag).ok_or_else(manifest_unknown)?;
        let stored = r.manifests.get(&descriptor.digest).ok_or_else(manifest_unknown)?;
        Ok(single_chunk(stored.bytes.clone()))
    }

    async fn resolve_blob(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        let repos = self.state.repos.lock().await;
        let r = repos.get(repo).ok_or_else(name_unknown)?;
        let bytes = r.blobs.get(digest).ok_or_else(blob_unknown)?;
        Ok(Descriptor::new("application/octet-stream", digest.clone(), bytes.len() as i64))
    }

    async fn resolve_manifest(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        let repos = self.state.repos.lock().await;
        let r = repos.get(repo).ok_or_else(name_unknown)?;
        let stored = r.manifests.get(digest).ok_or_else(manifest_unknown)?;
        Ok(stored.descriptor.clone())
    }

    async fn resolve_tag(&self, repo: &str, tag: &str) -> Result<Descriptor> {
        let repos = self.state.repos.lock().await;
        let r = repos.get(repo).ok_or_else(name_unknown)?;
        let descriptor = r.tags.get(tag).ok_or_else(manifest_unknown)?;
        let stored = r.manifests.get(&descriptor.digest).ok_or_else(manifest_unknown)?;
        Ok(stored.descriptor.clone())
    }

    async fn push_blob(&self, repo: &str, provisional: &Descriptor, mut reader: ByteStream) -> Result<Descriptor> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = reader.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        let bytes = buffer.freeze();
        provisional.validate_against(&bytes)?;

        let mut repos = self.state.repos.lock().await;
        let r = repos.entry(repo.to_string()).or_default();
        r.blobs.insert(provisional.digest.clone(), bytes.clone());
        Ok(Descriptor::new(provisional.media_type.clone(), provisional.digest.clone(), bytes.len() as i64))
    }

    async fn push_blob_chunked(&self, repo: &str, chunk_size: usize) -> Result<Box<dyn BlobWriter>> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut repos = self.state.repos.lock().await;
        let r = repos.entry(repo.to_string()).or_default();
        r.uploads.insert(id.clone(), UploadSession { id: id.clone(), buffer: BytesMut::new(), committed: false });
        drop(repos);

        Ok(Box::new(MemoryBlobWriter {
            state: self.state.clone(),
            repo: repo.to_string(),
            id,
            size: 0,
            chunk_size: if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size },
            media_type: "application/octet-stream".to_string(),
        }))
    }

    async fn push_blob_chunked_resume(
        &self,
        repo: &str,
        id: &str,
        offset: i64,
        chunk_size: usize,
    ) -> Result<Box<dyn BlobWriter>> {
        let repos = self.state.repos.lock().await;
        let r = repos.get(repo).ok_or_else(name_unknown)?;
        let session = r
            .uploads
            .get(id)
            .ok_or_else(|| Error::new(DistributionErrorCode::BlobUploadUnknown))?;
        let size = session.buffer.len() as i64;
        // offset < 0 is the read-only resume convention used by the
        // HTTP server's upload-info handler: report status, skip the
        // monotonicity check.
        if offset >= 0 && offset != size {
            return Err(Error::new(DistributionErrorCode::RangeInvalid));
        }
        drop(repos);

        Ok(Box::new(MemoryBlobWriter {
            state: self.state.clone(),
            repo: repo.to_string(),
            id: id.to_string(),
            size,
            chunk_size: if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size },
            media_type: "application/octet-stream".to_string(),
        }))
    }

    async fn mount_blob(&self, from_repo: &str, to_repo: &str, digest: &Digest) -> Result<Descriptor> {
        let mut repos = self.state.repos.lock().await;
        let from = repos.get(from_repo).ok_or_else(name_unknown)?;
        let bytes = from.blobs.get(digest).ok_or_else(blob_unknown)?.clone();
        let size = bytes.len() as i64;
        let to = repos.entry(to_repo.to_string()).or_default();
        to.blobs.insert(digest.clone(), bytes);
        Ok(Descriptor::new("application/octet-stream", digest.clone(), size))
    }

    async fn push_manifest(
        &self,
        repo: &str,
        tag: Option<&str>,
        bytes: Bytes,
        media_type: Option<&str>,
    ) -> Result<Descriptor> {
        if let Some(tag) = tag {
            validate_tag_name(tag)?;
        }

        let mut spec = ManifestSpec::try_from(bytes.as_ref())?;
        match media_type {
            Some(mt) => spec.set_media_type(mt.to_string()),
            None if spec.media_type.is_none() => spec.infer_media_type()?,
            None => {}
        }
        let media_type = spec
            .media_type
            .clone()
            .unwrap_or_else(|| ocireg_core::MEDIA_TYPE_IMAGE_MANIFEST.to_string());

        let digest = Digest::of(&bytes);
        let descriptor = Descriptor {
            media_type,
            digest: digest.clone(),
            size: bytes.len() as i64,
            artifact_type: spec.artifact_type.clone(),
            annotations: spec.annotations.clone(),
            subject: spec.subject.clone().map(Box::new),
        };

        let mut repos = self.state.repos.lock().await;
        let r = repos.entry(repo.to_string()).or_default();
        validate_references(r, &spec, self.config.lax_child_references)?;

        if let Some(tag) = tag {
            if self.config.immutable_tags {
                if let Some(existing) = r.tags.get(tag) {
                    if existing.digest != descriptor.digest || existing.media_type != descriptor.media_type {
                        return Err(Error::new(DistributionErrorCode::Denied));
                    }
                }
            }
        }

        r.manifests.insert(
            digest.clone(),
            StoredManifest {
                bytes,
                descriptor: descriptor.clone(),
                config: spec.config.as_ref().map(|d| d.digest.clone()),
                layers: spec.layers.iter().map(|d| d.digest.clone()).collect(),
                manifests: spec.manifests.iter().map(|d| d.digest.clone()).collect(),
            },
        );
        if let Some(tag) = tag {
            r.tags.insert(tag.to_string(), descriptor.clone());
        }

        Ok(descriptor)
    }

    async fn delete_blob(&self, repo: &str, digest: &Digest) -> Result<()> {
        let mut repos = self.state.repos.lock().await;
        let r = repos.get_mut(repo).ok_or_else(name_unknown)?;
        if !r.blobs.contains_key(digest) {
            return Err(blob_unknown());
        }
        if self.config.immutable_tags {
            let (_, protected_blobs) = r.protected();
            if protected_blobs.contains(digest) {
                return Err(Error::new(DistributionErrorCode::Denied));
            }
        }
        r.blobs.remove(digest);
        Ok(())
    }

    async fn delete_manifest(&self, repo: &str, digest: &Digest) -> Result<()> {
        let mut repos = self.state.repos.lock().await;
        let r = repos.get_mut(repo).ok_or_else(name_unknown)?;
        if !r.manifests.contains_key(digest) {
            return Err(manifest_unknown());
        }
        if self.config.immutable_tags {
            let (protected_manifests, _) = r.protected();
            if protected_manifests.contains(digest) {
                return Err(Error::new(DistributionErrorCode::Denied));
            }
        }
        r.manifests.remove(digest);
        Ok(())
    }

    async fn delete_tag(&self, repo: &str, tag: &str) -> Result<()> {
        if self.config.immutable_tags {
            return Err(Error::new(DistributionErrorCode::Denied));
        }
        let mut repos = self.state.repos.lock().await;
        let r = repos.get_mut(repo).ok_or_else(name_unknown)?;
        if r.tags.remove(tag).is_none() {
            return Err(manifest_unknown());
        }
        Ok(())
    }

    async fn repositories(&self, start_after: Option<&str>) -> Result<Paged<String>> {
        let repos = self.state.repos.lock().await;
        let mut names: Vec<String> = repos.keys().cloned().collect();
        names.sort();
        if let Some(cursor) = start_after {
            names.retain(|n| n.as_str() > cursor);
        }
        Ok(paged(names))
    }

    async fn tags(&self, repo: &str, start_after: Option<&str>) -> Result<Paged<String>> {
        let repos = self.state.repos.lock().await;
        let r = repos.get(repo).ok_or_else(name_unknown)?;
        let mut names: Vec<String> = r.tags.keys().cloned().collect();
        names.sort();
        if let Some(cursor) = start_after {
            names.retain(|n| n.as_str() > cursor);
        }
        Ok(paged(names))
    }

    async fn referrers(&self, repo: &str, digest: &Digest, artifact_type: Option<&str>) -> Result<Paged<Descriptor>> {
        let repos = self.state.repos.lock().await;
        let r = repos.get(repo).ok_or_else(name_unknown)?;
        let mut descriptors: Vec<Descriptor> = r
            .manifests
            .values()
            .filter(|stored| stored.descriptor.subject.as_ref().map(|s| &s.digest) == Some(digest))
            .filter(|stored| match artifact_type {
                Some(at) => stored.descriptor.artifact_type.as_deref() == Some(at),
                None => true,
            })
            .map(|stored| stored.descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.digest.cmp(&b.digest));
        Ok(paged(descriptors))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn registry() -> MemoryRegistry {
        MemoryRegistry::new(MemoryConfig::default())
    }

    async fn push_hello(r: &MemoryRegistry) -> Descriptor {
        let bytes = Bytes::from_static(b"hello world");
        let digest = Digest::of(&bytes);
        let provisional = Descriptor::new("application/octet-stream", digest, bytes.len() as i64);
        r.push_blob("foo/bar", &provisional, single_chunk(bytes)).await.unwrap()
    }

    #[tokio::test]
    async fn push_pull_round_trip() {
        let r = registry();
        let descriptor = push_hello(&r).await;
        assert_eq!(descriptor.digest.to_string(), "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
        assert_eq!(descriptor.size, 11);
    }

    #[tokio::test]
    async fn range_reads_clamp() {
        let r = registry();
        let descriptor = push_hello(&r).await;

        let mut s = r.get_blob_range("foo/bar", &descriptor.digest, 1, 5).await.unwrap();
        let chunk = s.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"ello");

        let mut s = r.get_blob_range("foo/bar", &descriptor.digest, 1, -1).await.unwrap();
        let chunk = s.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"ello world");

        let mut s = r.get_blob_range("foo/bar", &descriptor.digest, 1, 5000).await.unwrap();
        let chunk = s.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"ello world");
    }

    #[tokio::test]
    async fn missing_repo_is_name_unknown() {
        let r = registry();
        let digest = Digest::of(b"nope");
        let err = r.get_blob("missing/repo", &digest).await.unwrap_err();
        assert!(err.is_code(DistributionErrorCode::NameUnknown));
    }

    #[tokio::test]
    async fn immutable_tags_reject_retag() {
        let r = MemoryRegistry::new(MemoryConfig { immutable_tags: true, lax_child_references: true });
        let m1 = br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","config":{"mediaType":"application/vnd.oci.empty.v1+json","digest":"sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a","size":2},"layers":[]}"#;
        let d1 = r.push_manifest("repo", Some("v1"), Bytes::from_static(m1), None).await.unwrap();

        // Re-pushing the same bytes to the same tag is idempotent.
        let d1_again = r.push_manifest("repo", Some("v1"), Bytes::from_static(m1), None).await.unwrap();
        assert_eq!(d1.digest, d1_again.digest);

        let m2 = br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","config":{"mediaType":"application/vnd.oci.empty.v1+json","digest":"sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a","size":2},"layers":[],"annotations":{"x":"y"}}"#;
        let err = r.push_manifest("repo", Some("v1"), Bytes::from_static(m2), None).await.unwrap_err();
        assert!(err.is_code(DistributionErrorCode::Denied));

        let err = r.delete_tag("repo", "v1").await.unwrap_err();
        assert!(err.is_code(DistributionErrorCode::Denied));
    }
}
