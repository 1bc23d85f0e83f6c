//! Model-server clients for Tasktalk.
//!
//! [`OllamaClient`] backs both the model classification tier
//! ([`tasktalk_dialog::CompletionService`]) and the retriever's embeddings
//! ([`tasktalk_retrieval::EmbeddingService`]).

pub mod error;
pub mod ollama;

pub use error::InferenceError;
pub use ollama::OllamaClient;
