use once_cell::sync::Lazy;
use regex::Regex;

use crate::digest::Digest;
use crate::error::{DistributionErrorCode, Error};

static REPOSITORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+([._-][a-z0-9]+)*(/[a-z0-9]+([._-][a-z0-9]+)*)*$").unwrap()
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]{0,127}$").unwrap());

pub fn validate_repository_name(name: &str) -> Result<(), Error> {
    if REPOSITORY_RE.is_match(name) {
        Ok(())
    } else {
        Err(Error::name_invalid(format!("invalid repository name: {name}")))
    }
}

pub fn validate_tag_name(name: &str) -> Result<(), Error> {
    if TAG_RE.is_match(name) {
        Ok(())
    } else {
        Err(Error::with_message(
            DistributionErrorCode::ManifestInvalid,
            format!("invalid tag name: {name}"),
        ))
    }
}

/// The `<reference>` portion of `/v2/<name>/manifests/<reference>`:
/// either a digest or a tag, never anything else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestRef {
    Digest(Digest),
    Tag(String),
}

impl std::str::FromStr for ManifestRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(digest) = Digest::try_from(s) {
            return Ok(Self::Digest(digest));
        }
        validate_tag_name(s)?;
        Ok(Self::Tag(s.to_string()))
    }
}

impl std::fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestRef::Digest(d) => write!(f, "{d}"),
            ManifestRef::Tag(t) => write!(f, "{t}"),
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::simple("library", true)]
    #[case::nested("foo/bar", true)]
    #[case::deeply_nested("foo/bar/baz-qux.1", true)]
    #[case::uppercase("Foo", false)]
    #[case::leading_slash("/foo", false)]
    #[case::double_slash("foo//bar", false)]
    fn repository_names(#[case] input: &str, #[case] expect_ok: bool) {
        assert_eq!(validate_repository_name(input).is_ok(), expect_ok);
    }

    #[rstest]
    #[case::simple("v1", true)]
    #[case::with_dots("1.0.0", true)]
    #[case::leading_dot(".v1", false)]
    #[case::leading_dash("-v1", false)]
    fn tag_names(#[case] input: &str, #[case] expect_ok: bool) {
        assert_eq!(validate_tag_name(input).is_ok(), expect_ok);
    }

    #[test]
    fn manifest_ref_prefers_digest() {
        let r: ManifestRef = "sha256:aabb".parse().unwrap();
        assert_eq!(r, ManifestRef::Digest(Digest::try_from("sha256:aabb").unwrap()));
    }

    #[test]
    fn manifest_ref_falls_back_to_tag() {
        let r: ManifestRef = "latest".parse().unwrap();
        assert_eq!(r, ManifestRef::Tag("latest".to_string()));
    }
}
