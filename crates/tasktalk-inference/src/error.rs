use tasktalk_core::error::TasktalkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Model server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Model server returned no embeddings")]
    EmptyEmbedding,

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
}

impl From<InferenceError> for TasktalkError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Timeout(secs) => TasktalkError::Timeout(secs),
            InferenceError::Status { status: 429, .. } => TasktalkError::RateLimited,
            other => TasktalkError::Upstream(other.to_string()),
        }
    }
}
