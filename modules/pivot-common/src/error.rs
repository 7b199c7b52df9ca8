use thiserror::Error;

#[derive(Error, Debug)]
pub enum PivotError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid status transition: {from} -> {to}")]
    StatusRegression { from: String, to: String },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
