use thiserror::Error;

/// Top-level error type for the Lanscope inventory types.
#[derive(Error, Debug)]
pub enum LanscopeError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
