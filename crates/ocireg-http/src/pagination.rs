//! Shared paging helper for the three list endpoints (`tags/list`,
//! `referrers`, `_catalog`). The contract's [`ocireg_core::Paged`]
//! stream has no notion of a total count, so truncation is detected
//! by requesting one extra item past the caller's limit and
//! discarding it if present.

use futures::StreamExt;

use ocireg_core::{DistributionErrorCode, Error, Paged};

/// Enforce `ServerConfig::max_list_page_size`: a caller-supplied
/// `n` above the configured maximum is rejected outright rather than
/// silently clamped, per "`n` above this returns `UNSUPPORTED`".
pub fn enforce_max_page_size(n: Option<i64>, max: Option<i64>) -> Result<Option<i64>, Error> {
    match (n, max) {
        (Some(n), Some(max)) if n > max => Err(Error::new(DistributionErrorCode::Unsupported)),
        _ => Ok(n),
    }
}

/// Drain `paged` up to `limit` items (`None` or negative means
/// unbounded). Returns the page plus whether more items remained.
pub async fn collect_page<T>(mut paged: Paged<T>, limit: Option<i64>) -> Result<(Vec<T>, bool), Error> {
    let cap = match limit {
        Some(n) if n >= 0 => Some(n as usize),
        _ => None,
    };

    let mut out = Vec::new();
    loop {
        if let Some(cap) = cap {
            if out.len() == cap {
                return match paged.next().await {
                    None => Ok((out, false)),
                    Some(Err(e)) => Err(e),
                    Some(Ok(_overflow)) => Ok((out, true)),
                };
            }
        }
        match paged.next().await {
            None => return Ok((out, false)),
            Some(Err(e)) => return Err(e),
            Some(Ok(item)) => out.push(item),
        }
    }
}

/// Build an RFC 5988 `Link: <url>; rel="next"` header value for a
/// truncated list response.
pub fn link_header_value(path_and_query_without_cursor: &str, n: Option<i64>, last: &str) -> String {
    let mut url = path_and_query_without_cursor.to_string();
    let sep = if url.contains('?') { '&' } else { '?' };
    url.push(sep);
    if let Some(n) = n {
        url.push_str(&format!("n={n}&"));
    }
    url.push_str(&format!("last={last}"));
    format!("<{url}>; rel=\"next\"")
}
