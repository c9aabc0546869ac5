use axum::body::{Body, StreamBody};
use axum::response::{IntoResponse, Redirect, Response};
use futures::StreamExt;
use http::{header, HeaderMap, HeaderValue, StatusCode};

use ocireg_core::{Descriptor, Digest, DistributionErrorCode, Error as CoreError};

use crate::errors::{Error, Result};
use crate::headers::{content_length, parse_content_range, parse_range, DOCKER_CONTENT_DIGEST, OCI_CHUNK_MIN_LENGTH};
use crate::Inner;

fn digest_headers(descriptor: &Descriptor) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::HeaderName::from_static(DOCKER_CONTENT_DIGEST),
        HeaderValue::from_str(&descriptor.digest.to_string())?,
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&descriptor.size.to_string())?,
    );
    Ok(headers)
}

fn redirect_location(state: &Inner, digest: &Digest) -> Option<String> {
    let placeholder = Descriptor::new("application/octet-stream", digest.clone(), 0);
    state.config.descriptor_locations(false, &placeholder).into_iter().next()
}

pub async fn get(state: &Inner, repo: &str, digest: &Digest, request_headers: &HeaderMap) -> Result<Response> {
    if let Some(location) = redirect_location(state, digest) {
        return Ok(Redirect::temporary(&location).into_response());
    }

    let range = parse_range(request_headers)?;
    let descriptor = state.registry.resolve_blob(repo, digest).await?;

    let (stream, status, mut headers) = match range {
        Some((start, end)) => {
            let total = descriptor.size;
            if start < 0 || start >= total {
                return Err(Error::Core(CoreError::new(DistributionErrorCode::RangeInvalid)));
            }
            let clamped_end = if end < 0 || end >= total { total - 1 } else { end };
            let stream = state.registry.get_blob_range(repo, digest, start, clamped_end + 1).await?;
            let mut headers = digest_headers(&descriptor)?;
            headers.insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&format!("bytes {start}-{clamped_end}/{total}"))?,
            );
            headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from_str(&(clamped_end - start + 1).to_string())?,
            );
            (stream, StatusCode::PARTIAL_CONTENT, headers)
        }
        None => {
            let stream = state.registry.get_blob(repo, digest).await?;
            (stream, StatusCode::OK, digest_headers(&descriptor)?)
        }
    };

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    Ok((status, headers, StreamBody::new(stream)).into_response())
}

pub async fn head(state: &Inner, repo: &str, digest: &Digest) -> Result<Response> {
    let descriptor = state.registry.resolve_blob(repo, digest).await?;
    Ok((StatusCode::OK, digest_headers(&descriptor)?, "").into_response())
}

pub async fn delete(state: &Inner, repo: &str, digest: &Digest) -> Result<Response> {
    state.registry.delete_blob(repo, digest).await?;
    Ok((StatusCode::ACCEPTED, "").into_response())
}

fn upload_response(state: &Inner, repo: &str, id: &str, size: i64) -> Result<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, HeaderValue::from_str(&state.config.upload_location(repo, id))?);
    headers.insert(header::RANGE, HeaderValue::from_str(&format!("0-{}", (size - 1).max(0)))?);
    Ok((StatusCode::ACCEPTED, headers, "").into_response())
}

pub async fn start_upload(state: &Inner, repo: &str) -> Result<Response> {
    let writer = state.registry.push_blob_chunked(repo, 0).await?;
    let id = writer.id().to_string();
    let size = writer.size();
    let min_chunk = writer.chunk_size();
    writer.close().await?;
    let mut response = upload_response(state, repo, &id, size)?;
    response
        .headers_mut()
        .insert(header::HeaderName::from_static(OCI_CHUNK_MIN_LENGTH), HeaderValue::from_str(&min_chunk.to_string())?);
    Ok(response)
}

pub async fn upload_blob(state: &Inner, repo: &str, digest: &Digest, body: Body) -> Result<Response> {
    if state.config.disable_single_post_upload {
        return start_upload(state, repo).await;
    }
    let bytes = hyper::body::to_bytes(body)
        .await
        .map_err(|e| Error::Core(CoreError::with_message(DistributionErrorCode::Unknown, e.to_string())))?;
    let provisional = Descriptor::new("application/octet-stream", digest.clone(), bytes.len() as i64);
    let stream: ocireg_core::ByteStream = Box::pin(futures::stream::once(async move { Ok(bytes) }));
    let descriptor = state.registry.push_blob(repo, &provisional, stream).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, HeaderValue::from_str(&format!("/v2/{repo}/blobs/{}", descriptor.digest))?);
    headers.insert(
        header::HeaderName::from_static(DOCKER_CONTENT_DIGEST),
        HeaderValue::from_str(&descriptor.digest.to_string())?,
    );
    Ok((StatusCode::CREATED, headers, "").into_response())
}

pub async fn mount(state: &Inner, from_repo: &str, to_repo: &str, digest: &Digest) -> Result<Response> {
    match state.registry.mount_blob(from_repo, to_repo, digest).await {
        Ok(descriptor) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::LOCATION,
                HeaderValue::from_str(&format!("/v2/{to_repo}/blobs/{}", descriptor.digest))?,
            );
            headers.insert(
                header::HeaderName::from_static(DOCKER_CONTENT_DIGEST),
                HeaderValue::from_str(&descriptor.digest.to_string())?,
            );
            Ok((StatusCode::CREATED, headers, "").into_response())
        }
        Err(e) if e.is_code(DistributionErrorCode::Unsupported) => start_upload(state, to_repo).await,
        Err(e) => Err(Error::Core(e)),
    }
}

/// `GET /blobs/uploads/<id>`: re-resolves the session without writing
/// to it. The resume offset is passed as `-1`, a convention this
/// server and `ocireg-memory`'s writer resume share for "report
/// status only, skip the offset check" -- the contract says the session is
/// "re-resolved" here but doesn't specify how a read-only resume
/// signals that to the backend.
pub async fn upload_info(state: &Inner, repo: &str, id: &str) -> Result<Response> {
    let writer = state.registry.push_blob_chunked_resume(repo, id, -1, 0).await?;
    let size = writer.size();
    let min_chunk = writer.chunk_size();
    writer.close().await?;
    let mut response = upload_response(state, repo, id, size)?;
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
        .headers_mut()
        .insert(header::HeaderName::from_static(OCI_CHUNK_MIN_LENGTH), HeaderValue::from_str(&min_chunk.to_string())?);
    Ok(response)
}

pub async fn upload_chunk(state: &Inner, repo: &str, id: &str, request_headers: &HeaderMap, body: Body) -> Result<Response> {
    let content_range = parse_content_range(request_headers)?;
    let offset = content_range.map(|r| r.start).unwrap_or(0);

    if let Some(range) = content_range {
        if let Some(len) = content_length(request_headers) {
            if len != (range.end - range.start + 1) as u64 {
                return Err(Error::Core(CoreError::new(DistributionErrorCode::SizeInvalid)));
            }
        }
    }

    let mut writer = state.registry.push_blob_chunked_resume(repo, id, offset, 0).await?;

    let mut stream = body;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Core(CoreError::with_message(DistributionErrorCode::Unknown, e.to_string())))?;
        writer.write(chunk).await?;
    }

    let size = writer.size();
    let min_chunk = writer.chunk_size();
    let id = writer.id().to_string();
    writer.close().await?;

    let mut response = upload_response(state, repo, &id, size)?;
    response
        .headers_mut()
        .insert(header::HeaderName::from_static(OCI_CHUNK_MIN_LENGTH), HeaderValue::from_str(&min_chunk.to_string())?);
    Ok(response)
}

pub async fn complete_upload(state: &Inner, repo: &str, id: &str, digest: Option<&Digest>, body: Body) -> Result<Response> {
    let digest = digest.ok_or(Error::MissingHeader("digest"))?;

    let mut writer = state.registry.push_blob_chunked_resume(repo, id, -1, 0).await?;

    let mut stream = body;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Core(CoreError::with_message(DistributionErrorCode::Unknown, e.to_string())))?;
        writer.write(chunk).await?;
    }

    let descriptor = writer.commit(digest).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, HeaderValue::from_str(&format!("/v2/{repo}/blobs/{}", descriptor.digest))?);
    headers.insert(
        header::HeaderName::from_static(DOCKER_CONTENT_DIGEST),
        HeaderValue::from_str(&descriptor.digest.to_string())?,
    );
    Ok((StatusCode::CREATED, headers, "").into_response())
}
