pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    LayerBuilderError(String),

    #[error("{0}")]
    ImageBuilderError(String),

    #[error("{0}")]
    IndexBuilderError(String),

    #[error(transparent)]
    Core(#[from] ocireg_core::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("assertion failed: {0}")]
    Assertion(String),
}
