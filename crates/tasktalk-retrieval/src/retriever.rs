//! Context retriever: the retrieval-augmented half of each turn.
//!
//! Given a message it embeds the text, queries the vector store for related
//! help content, falls back to the curated knowledge cache, and renders the
//! most recent turns of the conversation. Failures never reach the caller;
//! the worst case is an empty context with quality 0.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, warn};

use tasktalk_core::config::RetrievalConfig;
use tasktalk_core::error::TasktalkError;
use tasktalk_core::lexicon::{self, BARE_NEGATIVES, OFFER_MARKERS, REFUSAL_PHRASES};
use tasktalk_core::{ConversationTurn, Role};

use crate::embedding::DynEmbeddingService;
use crate::knowledge::{KnowledgeCache, APPROX_MATCH_THRESHOLD};
use crate::memory::TurnMemory;
use crate::store::{MetadataFilter, VectorMatch, VectorStore};

#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub top_k: usize,
    pub min_similarity: f32,
    /// Applied separately to the document search and the memory read.
    pub timeout: Duration,
    pub context_turns: usize,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrieverSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_similarity: config.min_similarity,
            timeout: Duration::from_secs(config.timeout_secs),
            context_turns: config.context_turns,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    VectorStore,
    KnowledgeCache,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    pub similarity: f32,
    pub source: DocumentSource,
    pub metadata: Value,
}

impl RetrievedDocument {
    fn from_match(hit: VectorMatch) -> Self {
        let content = hit
            .metadata
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            id: hit.id,
            content,
            similarity: hit.score,
            source: DocumentSource::VectorStore,
            metadata: hit.metadata,
        }
    }
}

/// Decline signals found in the rendered conversation context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecliningAnalysis {
    pub has_decline: bool,
    pub matched_phrase: Option<String>,
    /// The decline was a bare negative answering an assistant offer.
    pub follows_offer: bool,
}

impl DecliningAnalysis {
    /// Scan `role: content` lines for a decline in the latest user line.
    pub fn scan(context: &str) -> Self {
        let lines: Vec<(&str, &str)> = context
            .lines()
            .filter_map(|line| line.split_once(": "))
            .collect();

        let Some(last_user) = lines.iter().rposition(|(role, _)| *role == "user") else {
            return Self::default();
        };
        let content = lines[last_user].1;
        if lexicon::is_question(content) {
            return Self::default();
        }
        if lexicon::is_exactly(content, REFUSAL_PHRASES) {
            return Self {
                has_decline: true,
                matched_phrase: Some(lexicon::normalize(content)),
                follows_offer: false,
            };
        }
        let prior_offer = last_user > 0
            && lines[last_user - 1].0 == "assistant"
            && lexicon::contains_any(lines[last_user - 1].1, OFFER_MARKERS);
        if prior_offer && lexicon::is_exactly(content, BARE_NEGATIVES) {
            return Self {
                has_decline: true,
                matched_phrase: Some(lexicon::normalize(content)),
                follows_offer: true,
            };
        }
        Self::default()
    }
}

/// Everything retrieved for one message. Built fresh per request.
#[derive(Debug, Clone)]
pub struct RagContext {
    pub relevant_documents: Vec<RetrievedDocument>,
    pub conversation_context: String,
    pub recent_turns: Vec<ConversationTurn>,
    pub declining_analysis: DecliningAnalysis,
    pub user_message: String,
    /// Mean similarity of `relevant_documents`, 0 when there are none.
    pub context_quality: f32,
    pub retrieval_time: Duration,
}

impl RagContext {
    pub fn empty(user_message: &str) -> Self {
        Self {
            relevant_documents: Vec::new(),
            conversation_context: String::new(),
            recent_turns: Vec::new(),
            declining_analysis: DecliningAnalysis::default(),
            user_message: user_message.to_string(),
            context_quality: 0.0,
            retrieval_time: Duration::ZERO,
        }
    }

    /// Content of the highest-ranked document.
    pub fn best_answer(&self) -> Option<&str> {
        self.relevant_documents
            .first()
            .map(|d| d.content.as_str())
            .filter(|c| !c.is_empty())
    }
}

/// Render turns as `role: content` lines, oldest first.
pub fn render_turns(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| {
            let role = match t.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("{}: {}", role, t.content.replace('\n', " "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ContextRetriever {
    embedder: Arc<dyn DynEmbeddingService>,
    store: Arc<dyn VectorStore>,
    knowledge: Arc<KnowledgeCache>,
    memory: Arc<dyn TurnMemory>,
    settings: RetrieverSettings,
}

impl ContextRetriever {
    pub fn new(
        embedder: Arc<dyn DynEmbeddingService>,
        store: Arc<dyn VectorStore>,
        knowledge: Arc<KnowledgeCache>,
        memory: Arc<dyn TurnMemory>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            knowledge,
            memory,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrieverSettings {
        &self.settings
    }

    /// Embed and store one document. `content` is returned on retrieval.
    pub async fn index_document(
        &self,
        id: &str,
        text: &str,
        content: &str,
        mut metadata: Value,
    ) -> Result<(), TasktalkError> {
        let vector = self.embedder.embed_boxed(text).await?;
        if let Some(map) = metadata.as_object_mut() {
            map.insert("content".to_string(), Value::String(content.to_string()));
        } else {
            metadata = json!({ "content": content });
        }
        self.store.upsert(id, vector, metadata).await
    }

    /// Index every knowledge cache entry by its question.
    pub async fn index_knowledge(&self) -> Result<usize, TasktalkError> {
        let mut indexed = 0;
        for entry in self.knowledge.entries() {
            let metadata = json!({
                "question": entry.question,
                "locale": entry.locale.to_string(),
                "source": "knowledge",
            });
            self.index_document(&entry.id, &entry.question, &entry.answer, metadata)
                .await?;
            indexed += 1;
        }
        debug!(indexed, "Knowledge entries indexed");
        Ok(indexed)
    }

    pub async fn retrieve_context(
        &self,
        message: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> RagContext {
        self.retrieve_context_filtered(message, conversation_id, user_id, None)
            .await
    }

    pub async fn retrieve_context_filtered(
        &self,
        message: &str,
        conversation_id: &str,
        user_id: &str,
        filter: Option<&MetadataFilter>,
    ) -> RagContext {
        let started = Instant::now();
        let mut context = match self.try_retrieve(message, conversation_id, filter).await {
            Ok(context) => context,
            Err(e) => {
                warn!(
                    conversation_id,
                    user_id,
                    error = %e,
                    "Context retrieval failed, continuing without context"
                );
                RagContext::empty(message)
            }
        };
        context.retrieval_time = started.elapsed();
        debug!(
            conversation_id,
            user_id,
            documents = context.relevant_documents.len(),
            quality = context.context_quality,
            elapsed_ms = context.retrieval_time.as_millis() as u64,
            "Context retrieved"
        );
        context
    }

    async fn try_retrieve(
        &self,
        message: &str,
        conversation_id: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<RagContext, TasktalkError> {
        let documents = match self.search_documents(message, filter).await {
            Ok(docs) if !docs.is_empty() => docs,
            Ok(_) => self.knowledge_fallback(message),
            Err(e) => {
                warn!(conversation_id, error = %e, "Vector search failed, using knowledge cache");
                self.knowledge_fallback(message)
            }
        };

        let recent_turns = timeout(
            self.settings.timeout,
            self.memory.recent(conversation_id, self.settings.context_turns),
        )
        .await
        .map_err(|_| TasktalkError::Timeout(self.settings.timeout.as_secs()))??;

        let conversation_context = render_turns(&recent_turns);
        let declining_analysis = DecliningAnalysis::scan(&conversation_context);
        let context_quality = if documents.is_empty() {
            0.0
        } else {
            documents.iter().map(|d| d.similarity).sum::<f32>() / documents.len() as f32
        };

        Ok(RagContext {
            relevant_documents: documents,
            conversation_context,
            recent_turns,
            declining_analysis,
            user_message: message.to_string(),
            context_quality,
            retrieval_time: Duration::ZERO,
        })
    }

    async fn search_documents(
        &self,
        message: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedDocument>, TasktalkError> {
        let search = async {
            let vector = self.embedder.embed_boxed(message).await?;
            self.store.query(&vector, self.settings.top_k, filter).await
        };
        let matches = timeout(self.settings.timeout, search)
            .await
            .map_err(|_| TasktalkError::Timeout(self.settings.timeout.as_secs()))??;

        Ok(matches
            .into_iter()
            .filter(|m| m.score >= self.settings.min_similarity)
            .map(RetrievedDocument::from_match)
            .collect())
    }

    fn knowledge_fallback(&self, message: &str) -> Vec<RetrievedDocument> {
        self.knowledge
            .search(message, self.settings.top_k, APPROX_MATCH_THRESHOLD)
            .into_iter()
            .map(|hit| RetrievedDocument {
                id: hit.entry.id.clone(),
                content: hit.entry.answer.clone(),
                similarity: hit.score,
                source: DocumentSource::KnowledgeCache,
                metadata: json!({
                    "question": hit.entry.question,
                    "locale": hit.entry.locale.to_string(),
                }),
            })
            .collect()
    }
}
