//! [`ocireg_core::registry::BlobWriter`] over the in-memory backend's
//! shared state. Per call to `write`/`commit`/`cancel` takes the
//! registry-wide mutex once and releases it; `size`/`chunk_size`/`id`
//! are synchronous in the contract, so this struct caches them
//! locally rather than reaching for the lock on every read.

use async_trait::async_trait;
use bytes::Bytes;

use ocireg_core::registry::BlobWriter;
use ocireg_core::{Descriptor, Digest, DistributionErrorCode, Error, Result};

use crate::repository::UploadSession;
use crate::State;

pub(crate) const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

pub struct MemoryBlobWriter {
    pub(crate) state: std::sync::Arc<State>,
    pub(crate) repo: String,
    pub(crate) id: String,
    pub(crate) size: i64,
    pub(crate) chunk_size: usize,
    pub(crate) media_type: String,
}

#[async_trait]
impl BlobWriter for MemoryBlobWriter {
    async fn write(&mut self, bytes: Bytes) -> Result<()> {
        let mut repos = self.state.repos.lock().await;
        let repo = repos.entry(self.repo.clone()).or_default();
        let session = repo
            .uploads
            .get_mut(&self.id)
            .ok_or_else(|| Error::new(DistributionErrorCode::BlobUploadUnknown))?;
        if session.committed {
            return Err(Error::new(DistributionErrorCode::BlobUploadUnknown));
        }
        session.buffer.extend_from_slice(&bytes);
        self.size = session.buffer.len() as i64;
        Ok(())
    }

    fn size(&self) -> i64 {
        self.size
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn commit(self: Box<Self>, expected: &Digest) -> Result<Descriptor> {
        let mut repos = self.state.repos.lock().await;
        let repo = repos.entry(self.repo.clone()).or_default();
        let session = repo
            .uploads
            .remove(&self.id)
            .ok_or_else(|| Error::new(DistributionErrorCode::BlobUploadUnknown))?;

        let bytes = session.buffer.clone().freeze();
        let computed = Digest::of(&bytes);
        if &computed != expected {
            // leave the session resumable so the caller can retry the
            // commit with the right digest instead of re-uploading.
            repo.uploads.insert(self.id.clone(), UploadSession { committed: false, ..session });
            return Err(Error::invalid_digest(format!("expected {expected}, computed {computed}")));
        }

        let size = bytes.len() as i64;
        repo.blobs.insert(expected.clone(), bytes);
        Ok(Descriptor::new(self.media_type.clone(), expected.clone(), size))
    }

    async fn cancel(self: Box<Self>) -> Result<()> {
        let mut repos = self.state.repos.lock().await;
        if let Some(repo) = repos.get_mut(&self.repo) {
            repo.uploads.remove(&self.id);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
