use ocireg_core::{DistributionErrorCode, Error as CoreError};

pub type Result<T> = std::result::Result<T, Error>;

/// `ocireg-compose`'s own error type, scoped to this crate's layer per
/// the workspace's per-crate error convention. The filters never
/// invent new failure modes of their own; the unifier adds the two
/// genuinely new ones a two-backend composite can hit that a single
/// backend cannot.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Exactly one side of a unified write succeeded; no rollback is
    /// attempted.
    #[error("unifier write asymmetry: {0}")]
    WriteAsymmetry(String),

    /// Both sides resolved a tag to different digests.
    #[error("unifier tag conflict: {repo}:{tag} resolves to {left} on one side and {right} on the other")]
    TagConflict { repo: String, tag: String, left: String, right: String },
}

impl From<Error> for CoreError {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(c) => c,
            Error::WriteAsymmetry(msg) => {
                CoreError::with_message(DistributionErrorCode::Unknown, msg).with_http_status(500)
            }
            Error::TagConflict { .. } => {
                CoreError::with_message(DistributionErrorCode::Unknown, e.to_string()).with_http_status(409)
            }
        }
    }
}
