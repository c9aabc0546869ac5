//! [`ocireg_core::registry::BlobWriter`] over a remote upload
//! session: each `write` is one `PATCH`, `commit` is the finalizing
//! `PUT`, `cancel` a `DELETE`. The server's `Location` response
//! header is the source of truth for where the next request goes,
//! matching how a real distribution-spec client must behave -- the
//! path is opaque and may change between chunks.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header;
use reqwest::Method;

use ocireg_core::registry::{AuthScope, BlobWriter};
use ocireg_core::{Descriptor, Digest, DistributionErrorCode, Error as CoreError, Result as CoreResult};

use crate::auth::{apply, AuthProvider};
use crate::check_status;
use crate::headers::{content_length, location, DOCKER_CONTENT_DIGEST, OCI_CHUNK_MIN_LENGTH};

pub struct HttpBlobWriter {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: url::Url,
    pub(crate) auth: Option<Arc<dyn AuthProvider>>,
    pub(crate) repo: String,
    pub(crate) id: String,
    pub(crate) location: String,
    pub(crate) size: i64,
    pub(crate) chunk_size: usize,
}

impl HttpBlobWriter {
    fn resolve(&self, path: &str) -> CoreResult<url::Url> {
        self.base_url
            .join(path)
            .map_err(|e| CoreError::with_message(DistributionErrorCode::Unknown, format!("malformed location: {e}")))
    }

    fn scopes(&self) -> Vec<AuthScope> {
        vec![AuthScope::RepositoryPush(self.repo.clone())]
    }
}

#[async_trait]
impl BlobWriter for HttpBlobWriter {
    async fn write(&mut self, bytes: Bytes) -> CoreResult<()> {
        let start = self.size;
        let end = start + bytes.len() as i64 - 1;
        let url = self.resolve(&self.location)?;
        let scopes = self.scopes();

        let request = apply(self.client.request(Method::PATCH, url), self.auth.as_deref(), &scopes)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, bytes.len())
            .header(header::CONTENT_RANGE, format!("{start}-{end}"))
            .header(header::EXPECT, "100-continue")
            .body(bytes);

        let response = request.send().await.map_err(crate::Error::from)?;
        let response = check_status(response).await?;

        if let Some(loc) = location(&response) {
            self.location = loc;
        }
        self.size = end + 1;
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

    async fn commit(self: Box<Self>, expected: &Digest) -> CoreResult<Descriptor> {
        let mut url = self.resolve(&self.location)?;
        url.query_pairs_mut().append_pair("digest", &expected.to_string());
        let scopes = self.scopes();

        let request = apply(self.client.request(Method::PUT, url), self.auth.as_deref(), &scopes)
            .header(header::CONTENT_LENGTH, 0)
            .header(header::EXPECT, "100-continue");

        let response = request.send().await.map_err(crate::Error::from)?;
        let response = check_status(response).await?;

        let digest = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .map(Digest::try_from)
            .transpose()?
            .unwrap_or_else(|| expected.clone());
        let size = content_length(&response).unwrap_or(self.size);
        Ok(Descriptor::new("application/octet-stream", digest, size))
    }

    async fn cancel(self: Box<Self>) -> CoreResult<()> {
        let url = self.resolve(&self.location)?;
        let scopes = self.scopes();
        let request = apply(self.client.request(Method::DELETE, url), self.auth.as_deref(), &scopes);
        let response = request.send().await.map_err(crate::Error::from)?;
        check_status(response).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> CoreResult<()> {
        Ok(())
    }
}

pub(crate) const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

pub(crate) fn chunk_size_from_header(response: &reqwest::Response) -> usize {
    response
        .headers()
        .get(OCI_CHUNK_MIN_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_CHUNK_SIZE)
}
