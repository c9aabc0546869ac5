//! Auth-scope derivation and the token hook an external
//! authorizer plugs into. Mirrors the `Token`/`auth()` pattern in
//! `ocilot::client::SimpleRegistryClient`, generalized so the token
//! can depend on the scope a given request needs.

use reqwest::RequestBuilder;

use ocireg_core::parser::ParsedRequest;
use ocireg_core::registry::AuthScope;

/// A bearer or basic credential to attach to an outgoing request.
#[derive(Clone, Debug)]
pub enum Token {
    Bearer(String),
    Basic { username: String, password: String },
}

/// Supplies a [`Token`] for a request given the [`AuthScope`](s) it
/// requires. Implement this to talk to a token server, a credential
/// helper, or (for tests) a fixed value.
pub trait AuthProvider: Send + Sync + std::fmt::Debug {
    fn token(&self, scopes: &[AuthScope]) -> Option<Token>;
}

/// An [`AuthProvider`] that always returns the same token regardless
/// of scope -- the common case of a single set of registry-wide
/// credentials.
#[derive(Clone, Debug)]
pub struct StaticToken(pub Token);

impl AuthProvider for StaticToken {
    fn token(&self, _scopes: &[AuthScope]) -> Option<Token> {
        Some(self.0.clone())
    }
}

pub(crate) fn apply(request: RequestBuilder, provider: Option<&dyn AuthProvider>, scopes: &[AuthScope]) -> RequestBuilder {
    let Some(provider) = provider else {
        return request;
    };
    match provider.token(scopes) {
        Some(Token::Bearer(t)) => request.bearer_auth(t),
        Some(Token::Basic { username, password }) => request.basic_auth(username, Some(password)),
        None => request,
    }
}

/// The OCI auth scope(s) a parsed request requires.
pub fn scope_for(req: &ParsedRequest) -> Vec<AuthScope> {
    match req {
        ParsedRequest::Ping => vec![],
        ParsedRequest::BlobGet { repo, .. }
        | ParsedRequest::BlobHead { repo, .. }
        | ParsedRequest::ManifestGet { repo, .. }
        | ParsedRequest::ManifestHead { repo, .. }
        | ParsedRequest::TagsList { repo, .. }
        | ParsedRequest::ReferrersList { repo, .. } => vec![AuthScope::RepositoryPull(repo.clone())],

        ParsedRequest::BlobStartUpload { repo }
        | ParsedRequest::BlobUploadBlob { repo, .. }
        | ParsedRequest::BlobUploadInfo { repo, .. }
        | ParsedRequest::BlobUploadChunk { repo, .. }
        | ParsedRequest::BlobCompleteUpload { repo, .. }
        | ParsedRequest::ManifestPut { repo, .. } => vec![AuthScope::RepositoryPush(repo.clone())],

        ParsedRequest::BlobMount { repo, from, .. } => match from {
            Some(from) => AuthScope::mount(from, repo),
            None => vec![AuthScope::RepositoryPush(repo.clone())],
        },

        ParsedRequest::BlobDelete { repo, .. } | ParsedRequest::ManifestDelete { repo, .. } => {
            vec![AuthScope::RepositoryDelete(repo.clone())]
        }

        ParsedRequest::CatalogList { .. } => vec![AuthScope::Catalog],
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ocireg_core::Digest;
    use rstest::rstest;

    #[rstest]
    #[case(ParsedRequest::Ping, vec![])]
    #[case(ParsedRequest::CatalogList { n: None, last: None }, vec![AuthScope::Catalog])]
    #[case(
        ParsedRequest::BlobGet { repo: "foo".into(), digest: Digest::of(b"x") },
        vec![AuthScope::RepositoryPull("foo".into())]
    )]
    #[case(
        ParsedRequest::BlobDelete { repo: "foo".into(), digest: Digest::of(b"x") },
        vec![AuthScope::RepositoryDelete("foo".into())]
    )]
    #[case(
        ParsedRequest::BlobMount { repo: "to".into(), digest: Digest::of(b"x"), from: Some("from".into()) },
        AuthScope::mount("from", "to")
    )]
    fn derives_expected_scope(#[case] req: ParsedRequest, #[case] expected: Vec<AuthScope>) {
        assert_eq!(scope_for(&req), expected);
    }
}
