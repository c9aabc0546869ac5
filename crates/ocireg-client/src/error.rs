use ocireg_core::{DistributionErrorCode, Error as CoreError};

pub type Result<T> = std::result::Result<T, Error>;

/// Transport-level errors layered on top of the shared [`CoreError`]
/// taxonomy. A failed HTTP response is never one of these -- it's
/// decoded straight into a `CoreError` by [`crate::check_status`] so
/// the caller sees the same taxonomy the server speaks.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed URL: {0}")]
    Url(String),
}

impl From<Error> for CoreError {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(c) => c,
            Error::Request(msg) => CoreError::with_message(DistributionErrorCode::Unknown, msg),
            Error::Url(msg) => CoreError::name_invalid(msg),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Url(e.to_string())
    }
}
