use serde::{Deserialize, Serialize};
use thiserror;

pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of OCI distribution-spec error codes.
///
/// <https://github.com/opencontainers/distribution-spec/blob/main/spec.md#error-codes>
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionErrorCode {
    #[serde(rename = "BLOB_UNKNOWN")]
    BlobUnknown,
    #[serde(rename = "BLOB_UPLOAD_INVALID")]
    BlobUploadInvalid,
    #[serde(rename = "BLOB_UPLOAD_UNKNOWN")]
    BlobUploadUnknown,
    #[serde(rename = "DIGEST_INVALID")]
    DigestInvalid,
    #[serde(rename = "MANIFEST_BLOB_UNKNOWN")]
    ManifestBlobUnknown,
    #[serde(rename = "MANIFEST_INVALID")]
    ManifestInvalid,
    #[serde(rename = "MANIFEST_UNKNOWN")]
    ManifestUnknown,
    #[serde(rename = "NAME_INVALID")]
    NameInvalid,
    #[serde(rename = "NAME_UNKNOWN")]
    NameUnknown,
    #[serde(rename = "SIZE_INVALID")]
    SizeInvalid,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "DENIED")]
    Denied,
    #[serde(rename = "UNSUPPORTED")]
    Unsupported,
    #[serde(rename = "TOOMANYREQUESTS")]
    TooManyRequests,
    #[serde(rename = "RANGE_INVALID")]
    RangeInvalid,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl DistributionErrorCode {
    /// The HTTP status this code maps to absent an explicit override.
    pub fn default_http_status(&self) -> u16 {
        match self {
            Self::BlobUnknown => 404,
            Self::BlobUploadInvalid => 416,
            Self::BlobUploadUnknown => 404,
            Self::DigestInvalid => 400,
            Self::ManifestBlobUnknown => 404,
            Self::ManifestInvalid => 400,
            Self::ManifestUnknown => 404,
            Self::NameInvalid => 400,
            Self::NameUnknown => 404,
            Self::SizeInvalid => 400,
            Self::Unauthorized => 401,
            Self::Denied => 403,
            Self::Unsupported => 400,
            Self::TooManyRequests => 429,
            Self::RangeInvalid => 416,
            Self::Unknown => 500,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::BlobUnknown => "blob unknown to registry",
            Self::BlobUploadInvalid => "blob upload invalid",
            Self::BlobUploadUnknown => "blob upload unknown to registry",
            Self::DigestInvalid => "provided digest did not match uploaded content",
            Self::ManifestBlobUnknown => {
                "manifest references a manifest or blob unknown to registry"
            }
            Self::ManifestInvalid => "manifest invalid",
            Self::ManifestUnknown => "manifest unknown to registry",
            Self::NameInvalid => "invalid repository name",
            Self::NameUnknown => "repository name not known to registry",
            Self::SizeInvalid => "provided length did not match content length",
            Self::Unauthorized => "authentication required",
            Self::Denied => "requested access to the resource is denied",
            Self::Unsupported => "the operation is unsupported",
            Self::TooManyRequests => "too many requests",
            Self::RangeInvalid => "requested range not satisfiable",
            Self::Unknown => "unknown error",
        }
    }
}

/// A coded, wire-ready registry error.
///
/// Errors carry the closed-set code, a human message, optional
/// detail, and (rarely) an explicit HTTP status override. Wrapping
/// preserves the innermost code: when one `Error` wraps another via
/// `source`, the outermost explicit code wins.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{}: {message}", code.default_message())]
pub struct Error {
    pub code: DistributionErrorCode,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub http_status: Option<u16>,
}

impl Error {
    pub fn new(code: DistributionErrorCode) -> Self {
        Self {
            message: code.default_message().to_string(),
            code,
            detail: None,
            http_status: None,
        }
    }

    pub fn with_message(code: DistributionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            http_status: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn http_status(&self) -> u16 {
        self.http_status.unwrap_or_else(|| self.code.default_http_status())
    }

    pub fn unsupported() -> Self {
        Self::new(DistributionErrorCode::Unsupported)
    }

    pub fn invalid_digest(s: impl Into<String>) -> Self {
        Self::with_message(DistributionErrorCode::DigestInvalid, s.into())
    }

    pub fn unsupported_digest_algorithm(s: impl Into<String>) -> Self {
        Self::with_message(DistributionErrorCode::DigestInvalid, format!("unsupported digest algorithm: {}", s.into()))
    }

    pub fn name_invalid(s: impl Into<String>) -> Self {
        Self::with_message(DistributionErrorCode::NameInvalid, s.into())
    }

    pub fn name_unknown() -> Self {
        Self::new(DistributionErrorCode::NameUnknown)
    }

    pub fn is_code(&self, code: DistributionErrorCode) -> bool {
        self.code == code
    }
}

/// The `{"errors":[...]}` envelope exchanged over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub errors: Vec<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: DistributionErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl From<&Error> for ErrorEnvelope {
    fn from(e: &Error) -> Self {
        ErrorEnvelope {
            errors: vec![ErrorInfo {
                code: e.code,
                message: e.message.clone(),
                detail: e.detail.clone(),
            }],
        }
    }
}

impl From<ErrorEnvelope> for Error {
    fn from(mut env: ErrorEnvelope) -> Self {
        if env.errors.is_empty() {
            return Error::new(DistributionErrorCode::Unknown);
        }
        let info = env.errors.remove(0);
        Error {
            code: info.code,
            message: info.message,
            detail: info.detail,
            http_status: None,
        }
    }
}
