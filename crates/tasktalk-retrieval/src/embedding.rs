//! Embedding service trait and the built-in hashed bag-of-words embedder.
//!
//! - `EmbeddingService` is implemented by real providers (see the inference
//!   crate's Ollama client).
//! - `MockEmbedding` hashes tokens into a fixed number of buckets, so texts
//!   sharing words land close together. Good enough for tests and for running
//!   without a model server.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;

use tasktalk_core::error::TasktalkError;

/// Service for generating text embeddings.
///
/// Providers may produce any width; the retriever never assumes a fixed
/// dimension and mismatched vectors simply score zero.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, TasktalkError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// A blanket implementation covers every `EmbeddingService`, so callers can
/// hold an `Arc<dyn DynEmbeddingService>` without generics.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, TasktalkError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, TasktalkError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

/// Split text into lowercase alphanumeric tokens.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// MockEmbedding - feature-hashed bag of words
// ---------------------------------------------------------------------------

/// Deterministic embedder that hashes each token into one of `dimensions`
/// buckets with a hashed sign, then L2-normalizes.
///
/// Identical token multisets produce identical vectors, and cosine similarity
/// tracks word overlap.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl MockEmbedding {
    pub const DEFAULT_DIMENSIONS: usize = 1024;

    pub fn new() -> Self {
        Self::with_dimensions(Self::DEFAULT_DIMENSIONS)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            result[bucket] += sign;
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }
        result
    }
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, TasktalkError> {
        if tokenize(text).is_empty() {
            return Err(TasktalkError::Embedding(
                "Cannot embed text without any words".to_string(),
            ));
        }
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cosine_similarity;

    #[tokio::test]
    async fn test_mock_embedding_default_dimension() {
        let service = MockEmbedding::new();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 1024);
    }

    #[tokio::test]
    async fn test_mock_embedding_other_dimensions() {
        for dims in [768, 1536] {
            let service = MockEmbedding::with_dimensions(dims);
            let vec = service.embed("hello world").await.unwrap();
            assert_eq!(vec.len(), dims);
            assert_eq!(EmbeddingService::dimensions(&service), dims);
        }
    }

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_ignores_case_and_punctuation() {
        let service = MockEmbedding::new();
        let v1 = service.embed("How do I create a task?").await.unwrap();
        let v2 = service.embed("how do i create a task").await.unwrap();
        assert!((cosine_similarity(&v1, &v2) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embedding_overlap_ranks_higher() {
        let service = MockEmbedding::new();
        let query = service.embed("create a task for tomorrow").await.unwrap();
        let close = service.embed("create a task").await.unwrap();
        let far = service.embed("weather in hanoi").await.unwrap();
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn test_mock_embedding_is_unit_length() {
        let service = MockEmbedding::new();
        let vec = service.embed("normalize me please").await.unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embedding_rejects_blank_text() {
        let service = MockEmbedding::new();
        assert!(service.embed("").await.is_err());
        assert!(service.embed("  ?! ").await.is_err());
    }

    #[tokio::test]
    async fn test_dyn_embedding_service_dispatch() {
        let service: Box<dyn DynEmbeddingService> = Box::new(MockEmbedding::with_dimensions(64));
        let vec = service.embed_boxed("boxed call").await.unwrap();
        assert_eq!(vec.len(), 64);
        assert_eq!(service.dimensions(), 64);
    }

    #[test]
    fn test_tokenize_unicode() {
        assert_eq!(tokenize("Tạo công-việc!"), vec!["tạo", "công", "việc"]);
    }
}
