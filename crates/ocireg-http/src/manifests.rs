use axum::response::{IntoResponse, Redirect, Response};
use axum::body::{Body, StreamBody};
use http::{header, HeaderMap, HeaderValue, StatusCode};

use ocireg_core::{Descriptor, DistributionErrorCode, Error as CoreError, ManifestRef, ManifestSpec};

use crate::errors::{Error, Result};
use crate::headers::OCI_SUBJECT;
use crate::Inner;

const MAX_MANIFEST_SIZE: u64 = 4 * 1024 * 1024;

fn manifest_headers(descriptor: &Descriptor, omit_digest: bool) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if !omit_digest {
        headers.insert(
            header::HeaderName::from_static(crate::headers::DOCKER_CONTENT_DIGEST),
            HeaderValue::from_str(&descriptor.digest.to_string())?,
        );
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_str(&descriptor.size.to_string())?);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(&descriptor.media_type)?);
    if let Some(subject) = &descriptor.subject {
        headers.insert(
            header::HeaderName::from_static(OCI_SUBJECT),
            HeaderValue::from_str(&subject.digest.to_string())?,
        );
    }
    Ok(headers)
}

async fn resolve(state: &Inner, repo: &str, reference: &ManifestRef) -> Result<Descriptor> {
    let descriptor = match reference {
        ManifestRef::Digest(digest) => state.registry.resolve_manifest(repo, digest).await,
        ManifestRef::Tag(tag) => state.registry.resolve_tag(repo, tag).await,
    };
    descriptor.map_err(Error::Core)
}

pub async fn head(state: &Inner, repo: &str, reference: &ManifestRef) -> Result<Response> {
    let descriptor = resolve(state, repo, reference).await?;
    Ok((StatusCode::OK, manifest_headers(&descriptor, false)?, "").into_response())
}

pub async fn get(state: &Inner, repo: &str, reference: &ManifestRef) -> Result<Response> {
    let descriptor = resolve(state, repo, reference).await?;
    if let Some(location) = state.config.descriptor_locations(true, &descriptor).into_iter().next() {
        return Ok(Redirect::temporary(&location).into_response());
    }
    let stream = match reference {
        ManifestRef::Digest(digest) => state.registry.get_manifest(repo, digest).await?,
        ManifestRef::Tag(tag) => state.registry.get_tag(repo, tag).await?,
    };
    let omit_digest = state.config.omit_digest_from_tag_get_response && matches!(reference, ManifestRef::Tag(_));
    Ok((StatusCode::OK, manifest_headers(&descriptor, omit_digest)?, StreamBody::new(stream)).into_response())
}

/// <https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pushing-manifests>
pub async fn put(state: &Inner, repo: &str, reference: &ManifestRef, content_type: Option<&str>, body: Body) -> Result<Response> {
    let bytes = hyper::body::to_bytes(body)
        .await
        .map_err(|e| Error::Core(CoreError::with_message(DistributionErrorCode::Unknown, e.to_string())))?;

    if bytes.len() as u64 > MAX_MANIFEST_SIZE {
        return Err(Error::Core(CoreError::new(DistributionErrorCode::SizeInvalid)));
    }

    let mut manifest = ManifestSpec::try_from(bytes.as_ref()).map_err(|e| {
        tracing::warn!(error = %e, "rejecting malformed manifest body");
        e
    })?;

    match (&manifest.media_type, content_type) {
        (Some(_), None) => {
            tracing::warn!("manifest PUT omitted Content-Type despite declaring mediaType");
        }
        (Some(mt), Some(ct)) if mt != ct => {
            return Err(Error::Core(CoreError::new(DistributionErrorCode::ManifestInvalid)));
        }
        (None, Some(ct)) => manifest.set_media_type(ct),
        (None, None) => {
            manifest.infer_media_type()?;
        }
        _ => {}
    }

    if let ManifestRef::Digest(addressed) = reference {
        let computed = ocireg_core::Digest::of(&bytes);
        if &computed != addressed {
            return Err(Error::Core(CoreError::invalid_digest(format!(
                "addressed digest {addressed} does not match computed digest {computed}"
            ))));
        }
    }

    let media_type = manifest.media_type.clone();
    let tag = match reference {
        ManifestRef::Tag(tag) => Some(tag.as_str()),
        ManifestRef::Digest(_) => None,
    };

    let descriptor = state
        .registry
        .push_manifest(repo, tag, bytes, media_type.as_deref())
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&format!("/v2/{repo}/manifests/{reference}"))?,
    );
    headers.insert(
        header::HeaderName::from_static(crate::headers::DOCKER_CONTENT_DIGEST),
        HeaderValue::from_str(&descriptor.digest.to_string())?,
    );
    if let Some(subject) = &manifest.subject {
        headers.insert(
            header::HeaderName::from_static(OCI_SUBJECT),
            HeaderValue::from_str(&subject.digest.to_string())?,
        );
    }
    Ok((StatusCode::CREATED, headers, "").into_response())
}

pub async fn delete(state: &Inner, repo: &str, reference: &ManifestRef) -> Result<Response> {
    match reference {
        ManifestRef::Digest(digest) => state.registry.delete_manifest(repo, digest).await?,
        ManifestRef::Tag(tag) => state.registry.delete_tag(repo, tag).await?,
    };
    Ok((StatusCode::ACCEPTED, "").into_response())
}
