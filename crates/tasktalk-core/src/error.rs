use thiserror::Error;

/// Top-level error type for Tasktalk.
///
/// Subsystem crates define their own error enums and convert into this one
/// at crate boundaries, so `?` works across the workspace.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TasktalkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Upstream call timed out after {0} seconds")]
    Timeout(u64),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Search error: {0}")]
    Search(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for TasktalkError {
    fn from(err: toml::de::Error) -> Self {
        TasktalkError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TasktalkError {
    fn from(err: toml::ser::Error) -> Self {
        TasktalkError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TasktalkError {
    fn from(err: serde_json::Error) -> Self {
        TasktalkError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Tasktalk operations.
pub type Result<T> = std::result::Result<T, TasktalkError>;
