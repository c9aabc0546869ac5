use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;

use ocireg_core::{Descriptor, Digest, DistributionErrorCode, Error as CoreError, MEDIA_TYPE_IMAGE_INDEX};

use crate::errors::{Error, Result};
use crate::headers::OCI_FILTERS_APPLIED;
use crate::pagination::collect_page;
use crate::Inner;

#[derive(Serialize)]
struct ImageIndex {
    #[serde(rename = "schemaVersion")]
    schema_version: u8,
    #[serde(rename = "mediaType")]
    media_type: &'static str,
    manifests: Vec<Descriptor>,
}

pub async fn list(state: &Inner, repo: &str, digest: &Digest, artifact_type: Option<String>) -> Result<Response> {
    if state.config.disable_referrers_api {
        return Err(Error::Core(CoreError::new(DistributionErrorCode::Unsupported).with_http_status(404)));
    }
    let applied_filter = if state.config.disable_referrers_filtering { None } else { artifact_type };

    let paged = state.registry.referrers(repo, digest, applied_filter.as_deref()).await?;
    let (manifests, _truncated) = collect_page(paged, None).await?;

    let mut response = (
        StatusCode::OK,
        Json(ImageIndex { schema_version: 2, media_type: MEDIA_TYPE_IMAGE_INDEX, manifests }),
    )
        .into_response();

    if let Some(at) = applied_filter {
        response
            .headers_mut()
            .insert(header::HeaderName::from_static(OCI_FILTERS_APPLIED), HeaderValue::from_str(&at)?);
    }

    Ok(response)
}
