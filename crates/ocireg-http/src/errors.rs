use axum::response::{IntoResponse, Response};
use http::StatusCode;

use ocireg_core::{DistributionErrorCode, Error as CoreError, ErrorEnvelope};

pub type Result<T> = std::result::Result<T, Error>;

/// HTTP-framing errors layered on top of the shared [`CoreError`]
/// taxonomy. Everything that is really about the registry contract
/// arrives as a `CoreError`; this enum only covers malformed HTTP
/// framing that never reaches the contract at all.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("invalid header value")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("invalid header name")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("malformed content-range header")]
    MalformedContentRange,

    #[error("malformed range header")]
    MalformedRange,
}

impl Error {
    fn as_core(&self) -> CoreError {
        match self {
            Error::Core(e) => e.clone(),
            Error::InvalidHeaderValue(_) | Error::InvalidHeaderName(_) => {
                CoreError::with_message(DistributionErrorCode::Unknown, self.to_string())
            }
            Error::MissingHeader(_) => {
                CoreError::with_message(DistributionErrorCode::SizeInvalid, self.to_string())
            }
            Error::MalformedContentRange | Error::MalformedRange => {
                CoreError::with_message(DistributionErrorCode::RangeInvalid, self.to_string())
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        render_error(&self.as_core())
    }
}

/// Render a [`CoreError`] as the wire JSON envelope at its
/// (possibly overridden) HTTP status.
pub fn render_error(e: &CoreError) -> Response {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let envelope: ErrorEnvelope = e.into();
    (status, axum::Json(envelope)).into_response()
}
