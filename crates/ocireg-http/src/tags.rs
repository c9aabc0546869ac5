use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;

use crate::errors::Result;
use crate::pagination::{collect_page, enforce_max_page_size, link_header_value};
use crate::Inner;

#[derive(Serialize)]
struct TagList {
    name: String,
    tags: Vec<String>,
}

pub async fn list(state: &Inner, repo: &str, n: Option<i64>, last: Option<String>) -> Result<Response> {
    enforce_max_page_size(n, state.config.max_list_page_size)?;
    let effective_limit = n.or(state.config.max_list_page_size);

    let paged = state.registry.tags(repo, last.as_deref()).await?;
    let (tags, truncated) = collect_page(paged, effective_limit).await?;

    let mut response = (
        StatusCode::OK,
        Json(TagList { name: repo.to_string(), tags: tags.clone() }),
    )
        .into_response();

    if truncated && !state.config.omit_link_header_from_responses {
        if let Some(last_tag) = tags.last() {
            let value = link_header_value(&format!("/v2/{repo}/tags/list"), effective_limit, last_tag);
            response.headers_mut().insert(header::LINK, HeaderValue::from_str(&value)?);
        }
    }

    Ok(response)
}
