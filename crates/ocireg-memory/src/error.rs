use ocireg_core::Error as CoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// `ocireg-memory`'s own error type, scoped to this crate's layer per
/// the workspace's per-crate error convention. In practice every
/// failure this backend produces already has a precise distribution-spec
/// code, so this wraps [`CoreError`] rather than inventing a parallel
/// vocabulary.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<Error> for CoreError {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(c) => c,
        }
    }
}
