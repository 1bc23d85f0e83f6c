//! Tasktalk retrieval crate - embeddings, vector store, curated knowledge,
//! short-term turn memory and the context retriever.
//!
//! Everything here is best effort: the retriever degrades to the knowledge
//! cache and finally to an empty context rather than failing a request.

pub mod embedding;
pub mod knowledge;
pub mod memory;
pub mod retriever;
pub mod store;

pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding};
pub use knowledge::{KnowledgeCache, KnowledgeEntry, KnowledgeHit};
pub use memory::{InMemoryTurnMemory, TurnMemory};
pub use retriever::{
    ContextRetriever, DecliningAnalysis, DocumentSource, RagContext, RetrievedDocument,
    RetrieverSettings,
};
pub use store::{InMemoryVectorStore, MetadataFilter, VectorMatch, VectorStore};
