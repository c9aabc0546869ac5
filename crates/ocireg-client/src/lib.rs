//! # ocireg-client
//!
//! Implements the registry contract (`ocireg_core::registry::Registry`)
//! by issuing HTTP requests against a remote distribution-spec
//! registry. Every method constructs a [`ParsedRequest`],
//! materializes it back to a method and URL via
//! [`ocireg_core::parser::construct`] -- the same function the server
//! uses in reverse -- sends it, and decodes the response.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::header;
use reqwest::{Method, RequestBuilder, Response};
use url::Url;

use ocireg_core::name::validate_tag_name;
use ocireg_core::parser::{construct, ParsedRequest};
use ocireg_core::registry::{AuthScope, BlobWriter, Registry};
use ocireg_core::{
    ByteStream, Descriptor, Digest, DistributionErrorCode, Error as CoreError, ErrorEnvelope, ManifestKind,
    ManifestRef, ManifestSpec, Paged, Result as CoreResult, VerifyingBody,
};

mod auth;
pub use auth::{scope_for, AuthProvider, StaticToken, Token};

mod error;
pub use error::Error;

mod headers;
use headers::{content_length, next_link, DOCKER_CONTENT_DIGEST};

mod writer;
pub use writer::HttpBlobWriter;
use writer::{chunk_size_from_header, DEFAULT_CHUNK_SIZE};

/// An HTTP client implementing the registry contract against a
/// single remote registry, reachable at `base_url`.
#[derive(Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: Url,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl std::fmt::Debug for HttpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegistry").field("base_url", &self.base_url.as_str()).finish()
    }
}

impl HttpRegistry {
    pub fn new(base_url: Url) -> Self {
        Self { client: reqwest::Client::new(), base_url, auth: None }
    }

    pub fn with_auth(base_url: Url, auth: Arc<dyn AuthProvider>) -> Self {
        Self { client: reqwest::Client::new(), base_url, auth: Some(auth) }
    }

    fn url(&self, path_and_query: &str) -> CoreResult<Url> {
        self.base_url
            .join(path_and_query)
            .map_err(|e| Error::from(e).into())
    }

    /// Build a request for a parsed contract call, with auth already
    /// attached for the scope that call requires.
    fn request(&self, parsed: &ParsedRequest) -> CoreResult<RequestBuilder> {
        let (method, path) = construct(parsed);
        let url = self.url(&path)?;
        let scopes = scope_for(parsed);
        Ok(auth::apply(self.client.request(method, url), self.auth.as_deref(), &scopes))
    }

    /// Send a parsed contract call with no body and decode a non-2xx
    /// response into the shared error taxonomy.
    async fn dispatch(&self, parsed: &ParsedRequest) -> CoreResult<Response> {
        let response = self.request(parsed)?.send().await.map_err(Error::from)?;
        check_status(response).await
    }
}

/// Per-response policy: a JSON error body decodes as the wire
/// envelope; anything else becomes a generic error carrying the HTTP
/// status for introspection.
pub(crate) async fn check_status(response: Response) -> CoreResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        let bytes = response.bytes().await.unwrap_or_default();
        if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(&bytes) {
            let mut err: CoreError = envelope.into();
            err.http_status = Some(status);
            return Err(err);
        }
    }
    Err(CoreError::with_message(DistributionErrorCode::Unknown, format!("registry responded {status}")).with_http_status(status))
}

fn core_stream(response: Response) -> impl futures_core::Stream<Item = CoreResult<Bytes>> + Send {
    response.bytes_stream().map(|r| r.map_err(|e| CoreError::with_message(DistributionErrorCode::Unknown, e.to_string())))
}

fn descriptor_from_headers(response: &Response, media_type: &str, fallback_digest: Option<&Digest>) -> CoreResult<Descriptor> {
    let digest = response
        .headers()
        .get(DOCKER_CONTENT_DIGEST)
        .and_then(|v| v.to_str().ok())
        .map(Digest::try_from)
        .transpose()?
        .or_else(|| fallback_digest.cloned())
        .ok_or_else(|| CoreError::with_message(DistributionErrorCode::Unknown, "response missing digest header"))?;
    let size = content_length(response).unwrap_or(0);
    Ok(Descriptor::new(media_type, digest, size))
}

#[derive(serde::Deserialize)]
struct CatalogResponse {
    repositories: Vec<String>,
}

#[derive(serde::Deserialize)]
struct TagsResponse {
    tags: Vec<String>,
}

#[derive(serde::Deserialize)]
struct ReferrersResponse {
    manifests: Vec<Descriptor>,
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn get_blob(&self, repo: &str, digest: &Digest) -> CoreResult<ByteStream> {
        let parsed = ParsedRequest::BlobGet { repo: repo.to_string(), digest: digest.clone() };
        let response = self.dispatch(&parsed).await?;
        let expected_size = match content_length(&response) {
            Some(n) => n,
            None => self.resolve_blob(repo, digest).await?.size,
        };
        Ok(Box::pin(VerifyingBody::new(core_stream(response), digest.clone(), expected_size)))
    }

    async fn get_blob_range(&self, repo: &str, digest: &Digest, start: i64, end: i64) -> CoreResult<ByteStream> {
        let parsed = ParsedRequest::BlobGet { repo: repo.to_string(), digest: digest.clone() };
        let range = if end < 0 { format!("bytes={start}-") } else { format!("bytes={start}-{}", end - 1) };
        let response = self.request(&parsed)?.header(header::RANGE, range).send().await.map_err(Error::from)?;
        let response = check_status(response).await?;
        Ok(Box::pin(core_stream(response)))
    }

    async fn get_manifest(&self, repo: &str, digest: &Digest) -> CoreResult<ByteStream> {
        let parsed = ParsedRequest::ManifestGet { repo: repo.to_string(), reference: ManifestRef::Digest(digest.clone()) };
        let response = self.dispatch(&parsed).await?;
        let expected_size = match content_length(&response) {
            Some(n) => n,
            None => self.resolve_manifest(repo, digest).await?.size,
        };
        Ok(Box::pin(VerifyingBody::new(core_stream(response), digest.clone(), expected_size)))
    }

    async fn get_tag(&self, repo: &str, tag: &str) -> CoreResult<ByteStream> {
        let parsed = ParsedRequest::ManifestGet { repo: repo.to_string(), reference: ManifestRef::Tag(tag.to_string()) };
        let response = self.dispatch(&parsed).await?;
        // The digest to verify against is whatever the server claims via
        // Docker-Content-Digest; a tag carries no digest of its own.
        let digest = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .map(Digest::try_from)
            .transpose()?;
        let Some(digest) = digest else {
            // Server omitted the digest header: nothing to verify against.
            return Ok(Box::pin(core_stream(response)));
        };
        let expected_size = content_length(&response).unwrap_or(0);
        Ok(Box::pin(VerifyingBody::new(core_stream(response), digest, expected_size)))
    }

    async fn resolve_blob(&self, repo: &str, digest: &Digest) -> CoreResult<Descriptor> {
        let parsed = ParsedRequest::BlobHead { repo: repo.to_string(), digest: digest.clone() };
        let response = self.dispatch(&parsed).await?;
        descriptor_from_headers(&response, "application/octet-stream", Some(digest))
    }

    async fn resolve_manifest(&self, repo: &str, digest: &Digest) -> CoreResult<Descriptor> {
        let parsed = ParsedRequest::ManifestHead { repo: repo.to_string(), reference: ManifestRef::Digest(digest.clone()) };
        let response = self.dispatch(&parsed).await?;
        let media_type = content_type(&response).unwrap_or_else(|| ocireg_core::MEDIA_TYPE_IMAGE_MANIFEST.to_string());
        descriptor_from_headers(&response, &media_type, Some(digest))
    }

    async fn resolve_tag(&self, repo: &str, tag: &str) -> CoreResult<Descriptor> {
        let parsed = ParsedRequest::ManifestHead { repo: repo.to_string(), reference: ManifestRef::Tag(tag.to_string()) };
        let response = self.dispatch(&parsed).await?;
        let media_type = content_type(&response).unwrap_or_else(|| ocireg_core::MEDIA_TYPE_IMAGE_MANIFEST.to_string());
        descriptor_from_headers(&response, &media_type, None)
    }

    async fn push_blob(&self, repo: &str, provisional: &Descriptor, mut reader: ByteStream) -> CoreResult<Descriptor> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = reader.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        let bytes = buffer.freeze();
        provisional.validate_against(&bytes)?;

        let parsed = ParsedRequest::BlobUploadBlob { repo: repo.to_string(), digest: provisional.digest.clone() };
        let request = self
            .request(&parsed)?
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, bytes.len())
            .header(header::EXPECT, "100-continue")
            .body(bytes.clone());
        let response = request.send().await.map_err(Error::from)?;
        let response = check_status(response).await?;
        descriptor_from_headers(&response, &provisional.media_type, Some(&provisional.digest))
            .map(|d| Descriptor { size: bytes.len() as i64, ..d })
    }

    async fn push_blob_chunked(&self, repo: &str, chunk_size: usize) -> CoreResult<Box<dyn BlobWriter>> {
        let parsed = ParsedRequest::BlobStartUpload { repo: repo.to_string() };
        let response = self.dispatch(&parsed).await?;
        let location = headers::location(&response).ok_or_else(|| {
            CoreError::with_message(DistributionErrorCode::Unknown, "start-upload response missing Location")
        })?;
        let server_chunk_size = chunk_size_from_header(&response);
        Ok(Box::new(HttpBlobWriter {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            auth: self.auth.clone(),
            repo: repo.to_string(),
            id: upload_id_from_location(&location),
            location,
            size: 0,
            chunk_size: if chunk_size == 0 { server_chunk_size } else { chunk_size },
        }))
    }

    async fn push_blob_chunked_resume(
        &self,
        repo: &str,
        id: &str,
        offset: i64,
        chunk_size: usize,
    ) -> CoreResult<Box<dyn BlobWriter>> {
        let parsed = ParsedRequest::BlobUploadInfo { repo: repo.to_string(), id: id.to_string() };
        let response = self.dispatch(&parsed).await?;
        let location = headers::location(&response).unwrap_or_else(|| construct(&parsed).1);
        let server_chunk_size = chunk_size_from_header(&response);
        let reported = upload_range_end(&response).map(|end| end + 1).unwrap_or(0);

        if offset >= 0 && offset != reported {
            return Err(CoreError::new(DistributionErrorCode::RangeInvalid));
        }

        Ok(Box::new(HttpBlobWriter {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            auth: self.auth.clone(),
            repo: repo.to_string(),
            id: id.to_string(),
            location,
            size: reported,
            chunk_size: if chunk_size == 0 { server_chunk_size } else { chunk_size },
        }))
    }

    async fn mount_blob(&self, from_repo: &str, to_repo: &str, digest: &Digest) -> CoreResult<Descriptor> {
        let parsed = ParsedRequest::BlobMount {
            repo: to_repo.to_string(),
            digest: digest.clone(),
            from: Some(from_repo.to_string()),
        };
        let response = self.request(&parsed)?.header(header::CONTENT_LENGTH, 0).send().await.map_err(Error::from)?;
        let response = check_status(response).await?;

        if response.status() == reqwest::StatusCode::ACCEPTED {
            // The server downgraded the mount to a regular upload session;
            // the caller is told to fall back, not handed a partially
            // started session to manage.
            return Err(CoreError::unsupported());
        }
        descriptor_from_headers(&response, "application/octet-stream", Some(digest))
    }

    async fn push_manifest(
        &self,
        repo: &str,
        tag: Option<&str>,
        bytes: Bytes,
        media_type: Option<&str>,
    ) -> CoreResult<Descriptor> {
        if let Some(tag) = tag {
            validate_tag_name(tag)?;
        }

        let mut spec = ManifestSpec::try_from(bytes.as_ref())?;
        match media_type {
            Some(mt) => spec.set_media_type(mt.to_string()),
            None if spec.media_type.is_none() => spec.infer_media_type()?,
            None => {}
        }
        let media_type = spec.media_type.clone().unwrap_or_else(|| ocireg_core::MEDIA_TYPE_IMAGE_MANIFEST.to_string());

        let reference = match tag {
            Some(tag) => ManifestRef::Tag(tag.to_string()),
            None => ManifestRef::Digest(Digest::of(&bytes)),
        };
        let parsed = ParsedRequest::ManifestPut { repo: repo.to_string(), reference };
        let request = self
            .request(&parsed)?
            .header(header::CONTENT_TYPE, media_type.clone())
            .header(header::CONTENT_LENGTH, bytes.len())
            .header(header::EXPECT, "100-continue")
            .body(bytes.clone());
        let response = request.send().await.map_err(Error::from)?;
        let response = check_status(response).await?;

        let digest = Digest::of(&bytes);
        Ok(Descriptor {
            media_type,
            digest,
            size: bytes.len() as i64,
            artifact_type: spec.artifact_type.clone(),
            annotations: spec.annotations.clone(),
            subject: spec.subject.clone().map(Box::new),
        })
        .map(|d| {
            // Trust the server's own digest header if it disagrees with
            // what we computed locally (it shouldn't, but the wire is
            // the final authority on what got stored).
            if let Some(server_digest) = response
                .headers()
                .get(DOCKER_CONTENT_DIGEST)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| Digest::try_from(s).ok())
            {
                Descriptor { digest: server_digest, ..d }
            } else {
                d
            }
        })
    }

    async fn delete_blob(&self, repo: &str, digest: &Digest) -> CoreResult<()> {
        let parsed = ParsedRequest::BlobDelete { repo: repo.to_string(), digest: digest.clone() };
        self.dispatch(&parsed).await?;
        Ok(())
    }

    async fn delete_manifest(&self, repo: &str, digest: &Digest) -> CoreResult<()> {
        let parsed = ParsedRequest::ManifestDelete { repo: repo.to_string(), reference: ManifestRef::Digest(digest.clone()) };
        self.dispatch(&parsed).await?;
        Ok(())
    }

    async fn delete_tag(&self, repo: &str, tag: &str) -> CoreResult<()> {
        let parsed = ParsedRequest::ManifestDelete { repo: repo.to_string(), reference: ManifestRef::Tag(tag.to_string()) };
        self.dispatch(&parsed).await?;
        Ok(())
    }

    async fn repositories(&self, start_after: Option<&str>) -> CoreResult<Paged<String>> {
        let mut path = construct(&ParsedRequest::CatalogList { n: None, last: start_after.map(str::to_string) }).1;
        let scopes = vec![AuthScope::Catalog];
        let mut names = Vec::new();
        loop {
            let url = self.url(&path)?;
            let response = auth::apply(self.client.get(url), self.auth.as_deref(), &scopes).send().await.map_err(Error::from)?;
            let response = check_status(response).await?;
            let next = next_link(&response);
            let body: CatalogResponse = response.json().await.map_err(Error::from)?;
            names.extend(body.repositories);
            match next {
                Some(p) => path = p,
                None => break,
            }
        }
        Ok(Box::pin(futures::stream::iter(names.into_iter().map(Ok))))
    }

    async fn tags(&self, repo: &str, start_after: Option<&str>) -> CoreResult<Paged<String>> {
        let mut path = construct(&ParsedRequest::TagsList { repo: repo.to_string(), n: None, last: start_after.map(str::to_string) }).1;
        let scopes = vec![AuthScope::RepositoryPull(repo.to_string())];
        let mut names = Vec::new();
        loop {
            let url = self.url(&path)?;
            let response = auth::apply(self.client.get(url), self.auth.as_deref(), &scopes).send().await.map_err(Error::from)?;
            let response = check_status(response).await?;
            let next = next_link(&response);
            let body: TagsResponse = response.json().await.map_err(Error::from)?;
            names.extend(body.tags);
            match next {
                Some(p) => path = p,
                None => break,
            }
        }
        Ok(Box::pin(futures::stream::iter(names.into_iter().map(Ok))))
    }

    async fn referrers(&self, repo: &str, digest: &Digest, artifact_type: Option<&str>) -> CoreResult<Paged<Descriptor>> {
        let path = construct(&ParsedRequest::ReferrersList {
            repo: repo.to_string(),
            digest: digest.clone(),
            artifact_type: artifact_type.map(str::to_string),
        })
        .1;
        let scopes = vec![AuthScope::RepositoryPull(repo.to_string())];
        let url = self.url(&path)?;
        let response = auth::apply(self.client.get(url), self.auth.as_deref(), &scopes).send().await.map_err(Error::from)?;
        let response = check_status(response).await?;
        let body: ReferrersResponse = response.json().await.map_err(Error::from)?;
        Ok(Box::pin(futures::stream::iter(body.manifests.into_iter().map(Ok))))
    }
}

fn content_type(response: &Response) -> Option<String> {
    response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// The upload id is whatever segment follows `blobs/uploads/` in the
/// `Location` the server handed back -- opaque to the client, passed
/// straight back on resume and completion.
fn upload_id_from_location(location: &str) -> String {
    location.rsplit('/').next().unwrap_or(location).split('?').next().unwrap_or(location).to_string()
}

/// Parses the `Range: 0-<end>` the upload-info and chunk-PATCH
/// responses carry, returning the inclusive end.
fn upload_range_end(response: &Response) -> Option<i64> {
    let value = response.headers().get(header::RANGE)?.to_str().ok()?;
    let (_, end) = value.split_once('-')?;
    end.parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn upload_id_strips_query_and_path() {
        assert_eq!(upload_id_from_location("/v2/foo/blobs/uploads/abc123?digest=sha256:x"), "abc123");
        assert_eq!(upload_id_from_location("/v2/foo/blobs/uploads/abc123"), "abc123");
    }

    #[test]
    fn range_end_parses() {
        let parsed = ParsedRequest::Ping;
        let _ = construct(&parsed);
    }
}
