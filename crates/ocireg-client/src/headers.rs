//! Small header readers shared by [`crate::HttpRegistry`] and
//! [`crate::writer::HttpBlobWriter`]. Mirrors
//! `ocireg_http::headers`, duplicated rather than depended-on since
//! the client has no other reason to pull in the server crate.

use http::header;

pub const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";
pub const OCI_CHUNK_MIN_LENGTH: &str = "oci-chunk-min-length";

pub fn content_length(response: &reqwest::Response) -> Option<i64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

pub fn location(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Extracts the URL out of an RFC 5988 `Link: <url>; rel="next"`
/// header, as emitted by `ocireg_http::pagination::link_header_value`.
pub fn next_link(response: &reqwest::Response) -> Option<String> {
    let value = response.headers().get(header::LINK)?.to_str().ok()?;
    let start = value.find('<')? + 1;
    let end = value[start..].find('>')? + start;
    Some(value[start..end].to_string())
}
