//! Maps distribution-spec HTTP requests to a tagged value and back.
//! `construct` is the deliberate inverse of `parse` so that
//! the HTTP client can build requests with the same logic the server
//! uses to read them.

use http::Method;
use url::Url;

use crate::digest::Digest;
use crate::error::{DistributionErrorCode, Error};
use crate::name::{validate_repository_name, ManifestRef};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedRequest {
    Ping,
    BlobGet { repo: String, digest: Digest },
    BlobHead { repo: String, digest: Digest },
    BlobDelete { repo: String, digest: Digest },
    BlobStartUpload { repo: String },
    BlobUploadBlob { repo: String, digest: Digest },
    BlobMount { repo: String, digest: Digest, from: Option<String> },
    BlobUploadInfo { repo: String, id: String },
    BlobUploadChunk { repo: String, id: String },
    BlobCompleteUpload { repo: String, id: String, digest: Option<Digest> },
    ManifestGet { repo: String, reference: ManifestRef },
    ManifestHead { repo: String, reference: ManifestRef },
    ManifestPut { repo: String, reference: ManifestRef },
    ManifestDelete { repo: String, reference: ManifestRef },
    TagsList { repo: String, n: Option<i64>, last: Option<String> },
    ReferrersList { repo: String, digest: Digest, artifact_type: Option<String> },
    CatalogList { n: Option<i64>, last: Option<String> },
}

/// Base64url-encode an opaque upload id so backend tokens never leak
/// reserved URL characters; round-trips exactly.
pub fn encode_upload_id(raw: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

pub fn decode_upload_id(encoded: &str) -> Result<String, Error> {
    use base64::Engine;
    match base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(encoded.as_bytes()) {
        Ok(bytes) => String::from_utf8(bytes)
            .map_err(|_| Error::with_message(DistributionErrorCode::BlobUploadUnknown, "malformed upload id")),
        // Not every backend id needs encoding; tolerate raw ids too.
        Err(_) => Ok(encoded.to_string()),
    }
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
}

fn parse_n_last(url: &Url) -> (Option<i64>, Option<String>) {
    let n = query_param(url, "n").and_then(|s| s.parse::<i64>().ok());
    let last = query_param(url, "last");
    (n, last)
}

/// Parse `(method, url)` into a [`ParsedRequest`]. `url` may be
/// absolute or path-only; only the path and query are consulted.
pub fn parse(method: &Method, url: &str) -> Result<ParsedRequest, Error> {
    let url = Url::options()
        .base_url(Some(&Url::parse("http://placeholder.invalid").unwrap()))
        .parse(url)
        .map_err(|_| Error::name_invalid(format!("malformed URL: {url}")))?;

    let path = url.path();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() || segments[0] != "v2" {
        return Err(Error::name_invalid("not a distribution-spec path"));
    }

    if segments.len() == 1 {
        return match *method {
            Method::GET => Ok(ParsedRequest::Ping),
            _ => Err(Error::unsupported()),
        };
    }

    if segments.len() == 2 && segments[1] == "_catalog" {
        return match *method {
            Method::GET => {
                let (n, last) = parse_n_last(&url);
                Ok(ParsedRequest::CatalogList { n, last })
            }
            _ => Err(Error::unsupported()),
        };
    }

    // Find the last occurrence of a known API keyword to split the
    // repository name (which may itself contain slashes) from the
    // rest of the path.
    let kw_idx = segments
        .iter()
        .rposition(|s| matches!(*s, "blobs" | "manifests" | "tags" | "referrers"))
        .ok_or_else(|| Error::name_invalid("unrecognized distribution-spec path"))?;

    if kw_idx == 0 {
        return Err(Error::name_invalid("missing repository name"));
    }

    let repo = segments[1..kw_idx].join("/");
    validate_repository_name(&repo)?;
    let keyword = segments[kw_idx];
    let rest = &segments[kw_idx + 1..];

    match keyword {
        "blobs" => parse_blobs(method, &repo, rest, &url),
        "manifests" => parse_manifests(method, &repo, rest),
        "tags" => parse_tags(method, &repo, rest, &url),
        "referrers" => parse_referrers(method, &repo, rest, &url),
        _ => unreachable!(),
    }
}

fn parse_blobs(method: &Method, repo: &str, rest: &[&str], url: &Url) -> Result<ParsedRequest, Error> {
    match rest {
        [digest] if *digest != "uploads" => {
            let digest = Digest::try_from(*digest)?;
            match *method {
                Method::GET => Ok(ParsedRequest::BlobGet { repo: repo.to_string(), digest }),
                Method::HEAD => Ok(ParsedRequest::BlobHead { repo: repo.to_string(), digest }),
                Method::DELETE => Ok(ParsedRequest::BlobDelete { repo: repo.to_string(), digest }),
                _ => Err(Error::unsupported()),
            }
        }
        ["uploads"] | ["uploads", ""] => {
            if *method != Method::POST {
                return Err(Error::unsupported());
            }
            let digest = query_param(url, "digest");
            let mount = query_param(url, "mount");
            let from = query_param(url, "from");
            if let Some(mount_digest) = mount {
                let digest = Digest::try_from(mount_digest.as_str())?;
                return Ok(ParsedRequest::BlobMount { repo: repo.to_string(), digest, from });
            }
            match digest {
                Some(d) => {
                    let digest = Digest::try_from(d.as_str())?;
                    Ok(ParsedRequest::BlobUploadBlob { repo: repo.to_string(), digest })
                }
                None => Ok(ParsedRequest::BlobStartUpload { repo: repo.to_string() }),
            }
        }
        ["uploads", id] => {
            let id = decode_upload_id(id)?;
            match *method {
                Method::GET => Ok(ParsedRequest::BlobUploadInfo { repo: repo.to_string(), id }),
                Method::PATCH => Ok(ParsedRequest::BlobUploadChunk { repo: repo.to_string(), id }),
                Method::PUT => {
                    let digest = query_param(url, "digest")
                        .map(|d| Digest::try_from(d.as_str()))
                        .transpose()?;
                    Ok(ParsedRequest::BlobCompleteUpload { repo: repo.to_string(), id, digest })
                }
                _ => Err(Error::unsupported()),
            }
        }
        _ => Err(Error::name_invalid("malformed blob path")),
    }
}

fn parse_manifests(method: &Method, repo: &str, rest: &[&str]) -> Result<ParsedRequest, Error> {
    let [reference] = rest else {
        return Err(Error::name_invalid("malformed manifest path"));
    };
    let reference: ManifestRef = reference.parse()?;
    match *method {
        Method::GET => Ok(ParsedRequest::ManifestGet { repo: repo.to_string(), reference }),
        Method::HEAD => Ok(ParsedRequest::ManifestHead { repo: repo.to_string(), reference }),
        Method::PUT => Ok(ParsedRequest::ManifestPut { repo: repo.to_string(), reference }),
        Method::DELETE => Ok(ParsedRequest::ManifestDelete { repo: repo.to_string(), reference }),
        _ => Err(Error::unsupported()),
    }
}

fn parse_tags(method: &Method, repo: &str, rest: &[&str], url: &Url) -> Result<ParsedRequest, Error> {
    if rest != ["list"] || *method != Method::GET {
        return Err(Error::name_invalid("malformed tags path"));
    }
    let (n, last) = parse_n_last(url);
    Ok(ParsedRequest::TagsList { repo: repo.to_string(), n, last })
}

fn parse_referrers(method: &Method, repo: &str, rest: &[&str], url: &Url) -> Result<ParsedRequest, Error> {
    let [digest] = rest else {
        return Err(Error::name_invalid("malformed referrers path"));
    };
    if *method != Method::GET {
        return Err(Error::unsupported());
    }
    let digest = Digest::try_from(*digest)?;
    let artifact_type = query_param(url, "artifactType");
    Ok(ParsedRequest::ReferrersList { repo: repo.to_string(), digest, artifact_type })
}

/// Build `(method, path-and-query)` for a parsed request; the inverse
/// of [`parse`] up to query-parameter ordering.
pub fn construct(req: &ParsedRequest) -> (Method, String) {
    match req {
        ParsedRequest::Ping => (Method::GET, "/v2/".to_string()),
        ParsedRequest::BlobGet { repo, digest } => (Method::GET, format!("/v2/{repo}/blobs/{digest}")),
        ParsedRequest::BlobHead { repo, digest } => (Method::HEAD, format!("/v2/{repo}/blobs/{digest}")),
        ParsedRequest::BlobDelete { repo, digest } => (Method::DELETE, format!("/v2/{repo}/blobs/{digest}")),
        ParsedRequest::BlobStartUpload { repo } => (Method::POST, format!("/v2/{repo}/blobs/uploads/")),
        ParsedRequest::BlobUploadBlob { repo, digest } => {
            (Method::POST, format!("/v2/{repo}/blobs/uploads/?digest={digest}"))
        }
        ParsedRequest::BlobMount { repo, digest, from } => {
            let mut url = format!("/v2/{repo}/blobs/uploads/?mount={digest}");
            if let Some(from) = from {
                url.push_str(&format!("&from={from}"));
            }
            (Method::POST, url)
        }
        ParsedRequest::BlobUploadInfo { repo, id } => {
            (Method::GET, format!("/v2/{repo}/blobs/uploads/{}", encode_upload_id(id)))
        }
        ParsedRequest::BlobUploadChunk { repo, id } => {
            (Method::PATCH, format!("/v2/{repo}/blobs/uploads/{}", encode_upload_id(id)))
        }
        ParsedRequest::BlobCompleteUpload { repo, id, digest } => {
            let mut url = format!("/v2/{repo}/blobs/uploads/{}", encode_upload_id(id));
            if let Some(digest) = digest {
                url.push_str(&format!("?digest={digest}"));
            }
            (Method::PUT, url)
        }
        ParsedRequest::ManifestGet { repo, reference } => (Method::GET, format!("/v2/{repo}/manifests/{reference}")),
        ParsedRequest::ManifestHead { repo, reference } => (Method::HEAD, format!("/v2/{repo}/manifests/{reference}")),
        ParsedRequest::ManifestPut { repo, reference } => (Method::PUT, format!("/v2/{repo}/manifests/{reference}")),
        ParsedRequest::ManifestDelete { repo, reference } => {
            (Method::DELETE, format!("/v2/{repo}/manifests/{reference}"))
        }
        ParsedRequest::TagsList { repo, n, last } => {
            let mut url = format!("/v2/{repo}/tags/list");
            push_n_last(&mut url, *n, last.as_deref());
            (Method::GET, url)
        }
        ParsedRequest::ReferrersList { repo, digest, artifact_type } => {
            let mut url = format!("/v2/{repo}/referrers/{digest}");
            if let Some(at) = artifact_type {
                url.push_str(&format!("?artifactType={at}"));
            }
            (Method::GET, url)
        }
        ParsedRequest::CatalogList { n, last } => {
            let mut url = "/v2/_catalog".to_string();
            push_n_last(&mut url, *n, last.as_deref());
            (Method::GET, url)
        }
    }
}

fn push_n_last(url: &mut String, n: Option<i64>, last: Option<&str>) {
    let mut first = true;
    if let Some(n) = n {
        url.push_str(if first { "?" } else { "&" });
        url.push_str(&format!("n={n}"));
        first = false;
    }
    if let Some(last) = last {
        url.push_str(if first { "?" } else { "&" });
        url.push_str(&format!("last={last}"));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ping_round_trips() {
        let parsed = parse(&Method::GET, "/v2/").unwrap();
        assert_eq!(parsed, ParsedRequest::Ping);
        let (m, u) = construct(&parsed);
        assert_eq!((m, u.as_str()), (Method::GET, "/v2/"));
    }

    #[test]
    fn blob_get_round_trips_with_nested_repo() {
        let url = "/v2/foo/bar/blobs/sha256:aabb";
        let parsed = parse(&Method::GET, url).unwrap();
        assert_eq!(
            parsed,
            ParsedRequest::BlobGet {
                repo: "foo/bar".to_string(),
                digest: Digest::try_from("sha256:aabb").unwrap(),
            }
        );
        let (m, u) = construct(&parsed);
        assert_eq!((m, u.as_str()), (Method::GET, url));
    }

    #[test]
    fn start_upload_requires_post() {
        assert!(parse(&Method::GET, "/v2/foo/blobs/uploads/").is_err());
    }

    #[test]
    fn mount_falls_back_without_from() {
        let parsed = parse(&Method::POST, "/v2/foo/blobs/uploads/?mount=sha256:aabb").unwrap();
        assert_eq!(
            parsed,
            ParsedRequest::BlobMount {
                repo: "foo".to_string(),
                digest: Digest::try_from("sha256:aabb").unwrap(),
                from: None,
            }
        );
    }

    #[test]
    fn manifest_tag_round_trips() {
        let url = "/v2/foo/manifests/latest";
        let parsed = parse(&Method::GET, url).unwrap();
        let (_, u) = construct(&parsed);
        assert_eq!(u, url);
    }

    #[test]
    fn rejects_invalid_repository_name() {
        assert!(parse(&Method::GET, "/v2/Invalid--Repo/blobs/sha256:aabb").is_err());
    }

    #[test]
    fn rejects_bad_digest() {
        assert!(parse(&Method::GET, "/v2/okrepo/blobs/sha256:not-hex").is_err());
    }

    #[test]
    fn tags_list_keeps_query_params() {
        let url = "/v2/foo/tags/list?n=10&last=abc";
        let parsed = parse(&Method::GET, url).unwrap();
        assert_eq!(
            parsed,
            ParsedRequest::TagsList { repo: "foo".to_string(), n: Some(10), last: Some("abc".to_string()) }
        );
    }
}
