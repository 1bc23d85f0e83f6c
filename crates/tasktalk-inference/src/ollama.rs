//! Ollama HTTP client.
//!
//! Completions go through `/api/chat` with `format: "json"`, so the reply is
//! a single JSON object ready for the classifier's parser. Embeddings use
//! `/api/embed`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tasktalk_core::config::InferenceConfig;
use tasktalk_core::error::TasktalkError;
use tasktalk_dialog::CompletionService;
use tasktalk_retrieval::EmbeddingService;

use crate::error::InferenceError;

/// Completions slower than this are logged.
const SLOW_COMPLETION_MS: u64 = 10_000;

pub struct OllamaClient {
    client: Client,
    base_url: String,
    gen_model: String,
    embed_model: String,
    dimensions: usize,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        gen_model: impl Into<String>,
        embed_model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Client(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let gen_model = gen_model.into();
        let embed_model = embed_model.into();
        info!(
            "Initializing Ollama client: url={}, gen={}, embed={}",
            base_url, gen_model, embed_model
        );
        Ok(Self {
            client,
            base_url,
            gen_model,
            embed_model,
            dimensions,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// `dimensions` is the embedding width the configured model produces.
    pub fn from_config(config: &InferenceConfig, dimensions: usize) -> Result<Self, InferenceError> {
        Self::new(
            config.base_url.clone(),
            config.gen_model.clone(),
            config.embed_model.clone(),
            dimensions,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single-turn chat completion constrained to JSON output.
    pub async fn chat_json(&self, prompt: &str) -> Result<String, InferenceError> {
        let start = Instant::now();
        let request = ChatRequest {
            model: self.gen_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            format: Some(serde_json::Value::String("json".to_string())),
            think: Some(false),
        };

        let response: ChatResponse = self.post("/api/chat", &request).await?;
        let content = response.message.content;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            model = %self.gen_model,
            response_len = content.len(),
            duration_ms = elapsed,
            "Completion finished"
        );
        if elapsed > SLOW_COMPLETION_MS {
            warn!(duration_ms = elapsed, prompt_len = prompt.len(), slow = true, "Slow completion");
        }
        Ok(content)
    }

    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let request = EmbeddingRequest {
            model: self.embed_model.clone(),
            input: vec![text.to_string()],
        };
        let response: EmbeddingResponse = self.post("/api/embed", &request).await?;
        response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(InferenceError::EmptyEmbedding)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, InferenceError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(self.timeout_secs)
                } else {
                    InferenceError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, TasktalkError> {
        Ok(self.chat_json(prompt).await?)
    }

    fn model_name(&self) -> &str {
        &self.gen_model
    }
}

impl EmbeddingService for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, TasktalkError> {
        self.embed_text(text).await.map_err(|e| match e {
            InferenceError::Timeout(secs) => TasktalkError::Timeout(secs),
            other => TasktalkError::Embedding(other.to_string()),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    /// Suppresses reasoning output on models that support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "llama3.1:8b".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "classify".to_string(),
            }],
            stream: false,
            format: Some(serde_json::Value::String("json".to_string())),
            think: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["format"], "json");
        assert_eq!(json["stream"], false);
        assert!(json.get("think").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_from_config_trims_trailing_slash() {
        let config = InferenceConfig {
            base_url: "http://localhost:11434/".to_string(),
            ..InferenceConfig::default()
        };
        let client = OllamaClient::from_config(&config, 1024).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(EmbeddingService::dimensions(&client), 1024);
        assert_eq!(client.model_name(), "llama3.1:8b");
    }
}
