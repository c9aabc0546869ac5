use digest::{Digest as _, DynDigest};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};

use crate::error::Error;

/// A content address of the form `<algorithm>:<hex>`.
///
/// Self-validating on construction; two digests are equal iff their
/// string forms are byte-equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: Algorithm,
    encoded: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Algorithm {
    Sha256,
    Sha512,
}

impl Algorithm {
    fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
        }
    }
}

impl TryFrom<&str> for Digest {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let i = s.find(':').ok_or_else(|| Error::invalid_digest(s.to_string()))?;
        let algo = s
            .get(..i)
            .ok_or_else(|| Error::invalid_digest(s.to_string()))?;
        let encoded = match s.get(i + 1..) {
            Some(e) if !e.is_empty() && e.bytes().all(|b| b.is_ascii_hexdigit()) => e,
            _ => return Err(Error::invalid_digest(s.to_string())),
        };
        let algorithm = match algo {
            "sha256" => Algorithm::Sha256,
            "sha512" => Algorithm::Sha512,
            other => return Err(Error::unsupported_digest_algorithm(other.to_string())),
        };
        Ok(Self {
            algorithm,
            encoded: encoded.to_lowercase(),
        })
    }
}

impl TryFrom<String> for Digest {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Digest::try_from(s.as_str())
    }
}

impl Digest {
    /// Compute the canonical (sha256) digest of a byte slice.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        digest::Digest::update(&mut hasher, bytes);
        let out = hasher.finalize();
        Self {
            algorithm: Algorithm::Sha256,
            encoded: format!("{:x}", out),
        }
    }

    pub fn algorithm(&self) -> &str {
        self.algorithm.as_str()
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn digester(&self) -> Digester {
        match self.algorithm {
            Algorithm::Sha256 => Digester::new(Box::new(Sha256::new())),
            Algorithm::Sha512 => Digester::new(Box::new(Sha512::new())),
        }
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.encoded)
    }
}

impl From<&Digest> for String {
    fn from(d: &Digest) -> String {
        d.to_string()
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> String {
        d.to_string()
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Incremental digest calculator used by both the upload-validation
/// path and the download-verification path.
pub struct Digester {
    digester: Box<dyn DynDigest + Send>,
    bytes: u64,
}

impl Digester {
    pub fn new(digester: Box<dyn DynDigest + Send>) -> Self {
        Self { digester, bytes: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digester.update(data);
        self.bytes += data.len() as u64;
    }

    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Finalize and compare against an expected digest's encoded hex.
    pub fn matches(self, expected: &Digest) -> bool {
        let out = self.digester.finalize();
        let encoded = hex_encode(&out);
        encoded == expected.encoded
    }
}

impl Default for Digester {
    fn default() -> Self {
        Self::new(Box::new(Sha256::new()))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{:02x}", b).expect("writing to a String cannot fail");
    }
    s
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::sha256("sha256:aabb", true)]
    #[case::sha512("sha512:aabb", true)]
    #[case::unsupported_algo("sha666:aabb", false)]
    #[case::no_colon("sha256aabb", false)]
    #[case::empty_encoded("sha256:", false)]
    #[case::empty_algo(":aabb", false)]
    #[case::non_hex("sha256:zzzz", false)]
    fn validate_try_from(#[case] input: &str, #[case] expect_ok: bool) {
        let actual = Digest::try_from(input);
        assert_eq!(actual.is_ok(), expect_ok, "input: {input}, actual: {actual:?}");
    }

    #[test]
    fn of_matches_known_hash() {
        let d = Digest::of(b"hello world");
        assert_eq!(
            d.to_string(),
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn digester_matches_expected() {
        let expected = Digest::of(b"hello world");
        let mut digester = expected.digester();
        digester.update(b"hello ");
        digester.update(b"world");
        assert!(digester.matches(&expected));
    }
}
