//! Vector store abstraction and the in-memory brute-force implementation.
//!
//! The in-memory store is O(n) per query, which is fine for the curated help
//! corpus it usually holds. A hosted index plugs in behind [`VectorStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use tasktalk_core::error::TasktalkError;

/// A single hit returned from a vector query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine similarity score.
    pub score: f32,
    pub metadata: Value,
}

/// Equality filter over top-level metadata keys. Every pair must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    equals: BTreeMap<String, Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, metadata: &Value) -> bool {
        self.equals
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

/// Similarity index over embedded documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector stored under `id`.
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: Value)
        -> Result<(), TasktalkError>;

    /// Return up to `top_k` matches sorted by descending similarity.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>, TasktalkError>;

    /// Remove the given ids. Returns how many existed.
    async fn delete(&self, ids: &[String]) -> Result<usize, TasktalkError>;
}

#[derive(Debug, Clone)]
struct VectorEntry {
    vector: Vec<f32>,
    metadata: Value,
}

/// In-memory vector store using brute-force cosine similarity.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    entries: Arc<RwLock<HashMap<String, VectorEntry>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: Value,
    ) -> Result<(), TasktalkError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| TasktalkError::Search(format!("Lock poisoned: {}", e)))?;
        entries.insert(id.to_string(), VectorEntry { vector, metadata });
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>, TasktalkError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| TasktalkError::Search(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<VectorMatch> = entries
            .iter()
            .filter(|(_, entry)| filter.map_or(true, |f| f.matches(&entry.metadata)))
            .map(|(id, entry)| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(vector, &entry.vector),
                metadata: entry.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, TasktalkError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| TasktalkError::Search(format!("Lock poisoned: {}", e)))?;
        Ok(ids.iter().filter(|id| entries.remove(*id).is_some()).count())
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot / (mag_a * mag_b)) as f32
}
