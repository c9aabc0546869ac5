//! # ocireg-http
//!
//! The HTTP wire layer for the registry contract: request
//! parsing lives in [`ocireg_core::parser`], and this crate owns
//! translating a [`ocireg_core::parser::ParsedRequest`] into calls
//! against an [`ocireg_core::registry::Registry`] and the result back
//! into an HTTP response, including the chunked-upload state machine,
//! range reads, and wire error mapping.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ocireg_http::{OciRegistryServer, ServerConfig};
//! use ocireg_memory::MemoryRegistry;
//!
//! let registry = Arc::new(MemoryRegistry::new(Default::default()));
//! let server = OciRegistryServer::new(registry, ServerConfig::default());
//! let router = server.router();
//! // axum::Server::bind(&addr).serve(router.into_make_service())
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Router;
use http::{Request, StatusCode};
use tower_http::trace::{self, TraceLayer};

mod config;
pub use config::ServerConfig;

pub(crate) mod blobs;
mod catalog;
pub(crate) mod errors;
pub(crate) use errors::Result;
pub(crate) mod headers;
mod manifests;
mod pagination;
mod referrers;
mod tags;

use ocireg_core::parser::{self, ParsedRequest};
use ocireg_core::registry::Registry;

/// Shared state behind every handler: the backend contract
/// implementation plus the effect toggles of the "server
/// configuration surface".
pub(crate) struct Inner {
    pub registry: Arc<dyn Registry>,
    pub config: ServerConfig,
}

/// Owns an `axum::Router` implementing the distribution-spec wire
/// protocol on top of any [`Registry`] implementation -- an
/// in-memory backend, an HTTP client proxying a remote, or a
/// middleware/unifier composition of either.
#[derive(Clone)]
pub struct OciRegistryServer {
    inner: Arc<Inner>,
}

impl OciRegistryServer {
    pub fn new(registry: Arc<dyn Registry>, config: ServerConfig) -> Self {
        Self { inner: Arc::new(Inner { registry, config }) }
    }

    /// Build the axum router. Every route funnels through a single
    /// dispatcher so that request parsing and translation stays in
    /// one place; there is no per-route axum extractor
    /// logic.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(dispatch)
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().include_headers(true))
                    .on_response(trace::DefaultOnResponse::new())
                    .on_request(trace::DefaultOnRequest::new()),
            )
            .with_state(self.inner.clone())
    }
}

async fn dispatch(State(state): State<Arc<Inner>>, req: Request<Body>) -> Response {
    match dispatch_inner(&state, req).await {
        Ok(response) => response,
        Err(e) => with_api_version(e.into_response()),
    }
}

async fn dispatch_inner(state: &Inner, req: Request<Body>) -> Result<Response> {
    let (parts, body) = req.into_parts();
    let url = match parts.uri.path_and_query() {
        Some(pq) => pq.as_str().to_string(),
        None => parts.uri.path().to_string(),
    };

    let parsed = match parser::parse(&parts.method, &url) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(error = %e, method = %parts.method, url, "rejecting malformed request");
            return Ok(with_api_version(errors::render_error(&e)));
        }
    };

    let response = match parsed {
        ParsedRequest::Ping => ping(),
        ParsedRequest::BlobGet { repo, digest } => blobs::get(state, &repo, &digest, &parts.headers).await,
        ParsedRequest::BlobHead { repo, digest } => blobs::head(state, &repo, &digest).await,
        ParsedRequest::BlobDelete { repo, digest } => blobs::delete(state, &repo, &digest).await,
        ParsedRequest::BlobStartUpload { repo } => blobs::start_upload(state, &repo).await,
        ParsedRequest::BlobUploadBlob { repo, digest } => blobs::upload_blob(state, &repo, &digest, body).await,
        ParsedRequest::BlobMount { repo, digest, from } => match from {
            Some(from) => blobs::mount(state, &from, &repo, &digest).await,
            None => blobs::start_upload(state, &repo).await,
        },
        ParsedRequest::BlobUploadInfo { repo, id } => blobs::upload_info(state, &repo, &id).await,
        ParsedRequest::BlobUploadChunk { repo, id } => blobs::upload_chunk(state, &repo, &id, &parts.headers, body).await,
        ParsedRequest::BlobCompleteUpload { repo, id, digest } => {
            blobs::complete_upload(state, &repo, &id, digest.as_ref(), body).await
        }
        ParsedRequest::ManifestGet { repo, reference } => manifests::get(state, &repo, &reference).await,
        ParsedRequest::ManifestHead { repo, reference } => manifests::head(state, &repo, &reference).await,
        ParsedRequest::ManifestPut { repo, reference } => {
            let content_type = parts
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            manifests::put(state, &repo, &reference, content_type.as_deref(), body).await
        }
        ParsedRequest::ManifestDelete { repo, reference } => manifests::delete(state, &repo, &reference).await,
        ParsedRequest::TagsList { repo, n, last } => tags::list(state, &repo, n, last).await,
        ParsedRequest::ReferrersList { repo, digest, artifact_type } => {
            referrers::list(state, &repo, &digest, artifact_type).await
        }
        ParsedRequest::CatalogList { n, last } => catalog::list(state, n, last).await,
    };

    response.map(with_api_version)
}

fn ping() -> Result<Response> {
    Ok((StatusCode::OK, "{}").into_response())
}

/// Every response carries `Docker-Distribution-API-Version:
/// registry/2.0`: set here rather than via a blanket
/// `SetResponseHeaderLayer` so it also lands on the parser-rejection
/// path, which never reaches a handler.
fn with_api_version(mut response: Response) -> Response {
    response
        .headers_mut()
        .entry(http::header::HeaderName::from_static("docker-distribution-api-version"))
        .or_insert_with(|| http::HeaderValue::from_static("registry/2.0"));
    response
}
