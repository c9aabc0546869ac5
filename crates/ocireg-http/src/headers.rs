//! Small header codecs used by the upload and range-read handlers.
//! Plain functions rather than `headers::Header` impls -- the server
//! dispatches through [`ocireg_core::parser`] rather than per-route
//! axum extractors, so there is no router-level need for typed header
//! extraction.

use http::{HeaderMap, HeaderValue};

use crate::errors::Error;

pub const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";
pub const OCI_CHUNK_MIN_LENGTH: &str = "oci-chunk-min-length";
pub const OCI_SUBJECT: &str = "oci-subject";
pub const OCI_FILTERS_APPLIED: &str = "oci-filters-applied";

/// An inclusive byte range, as carried by `Content-Range: <start>-<end>`
/// on PATCH and by `Range: bytes=<start>-<end>` on GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusiveRange {
    pub start: i64,
    pub end: i64,
}

impl InclusiveRange {
    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_str(&format!("{}-{}", self.start, self.end))
            .expect("formatted integers are always valid header values")
    }
}

/// Parse the distribution-spec `Content-Range: <start>-<end>` header
/// (no `bytes=` prefix, unlike the standard HTTP `Range` request
/// header).
pub fn parse_content_range(headers: &HeaderMap) -> Result<Option<InclusiveRange>, Error> {
    let Some(value) = headers.get(http::header::CONTENT_RANGE) else {
        return Ok(None);
    };
    let s = value.to_str().map_err(|_| Error::MalformedContentRange)?;
    let (start, end) = s.split_once('-').ok_or(Error::MalformedContentRange)?;
    let start: i64 = start.parse().map_err(|_| Error::MalformedContentRange)?;
    let end: i64 = end.parse().map_err(|_| Error::MalformedContentRange)?;
    Ok(Some(InclusiveRange { start, end }))
}

/// Parse the standard `Range: bytes=<start>-[<end>]` request header.
/// A missing end means "to EOF", represented as `end = -1`.
pub fn parse_range(headers: &HeaderMap) -> Result<Option<(i64, i64)>, Error> {
    let Some(value) = headers.get(http::header::RANGE) else {
        return Ok(None);
    };
    let s = value.to_str().map_err(|_| Error::MalformedRange)?;
    let spec = s.strip_prefix("bytes=").ok_or(Error::MalformedRange)?;
    let (start, end) = spec.split_once('-').ok_or(Error::MalformedRange)?;
    let start: i64 = start.parse().map_err(|_| Error::MalformedRange)?;
    let end: i64 = if end.is_empty() {
        -1
    } else {
        end.parse().map_err(|_| Error::MalformedRange)?
    };
    Ok(Some((start, end)))
}

pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}
