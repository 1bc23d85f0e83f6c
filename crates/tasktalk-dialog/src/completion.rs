use async_trait::async_trait;

use tasktalk_core::error::TasktalkError;

/// Text-completion backend used by the model classification tier.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete `prompt`, expecting a single JSON object in the reply.
    async fn complete(&self, prompt: &str) -> Result<String, TasktalkError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}
