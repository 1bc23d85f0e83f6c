use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TasktalkError};
use crate::types::Locale;

/// Top-level configuration for the assistant.
///
/// Loaded from `~/.tasktalk/config.toml` by default. Every section falls back
/// to its defaults when absent, so a partial file is always valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasktalkConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
}

impl TasktalkConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TasktalkConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist, cannot be parsed, or fails validation.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.min_similarity) {
            return Err(TasktalkError::Config(format!(
                "retrieval.min_similarity must be within 0.0..=1.0, got {}",
                r.min_similarity
            )));
        }
        if r.top_k == 0 {
            return Err(TasktalkError::Config(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if r.embedding_dimensions == 0 {
            return Err(TasktalkError::Config(
                "retrieval.embedding_dimensions must be non-zero".to_string(),
            ));
        }
        if self.classifier.history_window == 0 {
            return Err(TasktalkError::Config(
                "classifier.history_window must be at least 1".to_string(),
            ));
        }
        if self.chat.max_message_length == 0 {
            return Err(TasktalkError::Config(
                "chat.max_message_length must be non-zero".to_string(),
            ));
        }
        if self.state.sweep_interval_secs == 0 {
            return Err(TasktalkError::Config(
                "state.sweep_interval_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Locale used when a message gives no hint of its language.
    pub default_locale: Locale,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_locale: Locale::En,
        }
    }
}

/// Intent classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Try the language-model tier before the rule tier.
    pub use_model: bool,
    /// Number of recent turns included in the model prompt.
    pub history_window: usize,
    pub model_timeout_secs: u64,
    /// Shared permit budget for completion calls.
    pub max_completions_per_minute: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            use_model: true,
            history_window: 20,
            model_timeout_secs: 30,
            max_completions_per_minute: 30,
        }
    }
}

/// Context retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Hits scoring below this cosine similarity are discarded.
    pub min_similarity: f32,
    pub timeout_secs: u64,
    /// Recent turns rendered into the conversation context string.
    pub context_turns: usize,
    /// Vector width expected from the embedding provider.
    pub embedding_dimensions: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.7,
            timeout_secs: 10,
            context_turns: 10,
            embedding_dimensions: 1024,
        }
    }
}

/// Conversation state lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Idle time after which an unfinished flow is dropped.
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Idle time after which a pending confirmation is dropped.
    pub confirmation_timeout_secs: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 3600,
            sweep_interval_secs: 300,
            confirmation_timeout_secs: 300,
        }
    }
}

/// Chat front-end settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Messages longer than this (in characters) are refused.
    pub max_message_length: usize,
    /// Turns retained per conversation in short-term memory.
    pub memory_turns: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: 2000,
            memory_turns: 50,
        }
    }
}

/// Ollama-compatible inference endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    /// Model used for chat completions.
    pub gen_model: String,
    /// Model used for embeddings.
    pub embed_model: String,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            gen_model: "llama3.1:8b".to_string(),
            embed_model: "mxbai-embed-large".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Content moderation applied before the orchestrator sees a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Case-insensitive substrings that cause a message to be refused.
    pub blocked_terms: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = TasktalkConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.default_locale, Locale::En);
        assert!(config.classifier.use_model);
        assert_eq!(config.classifier.history_window, 20);
        assert_eq!(config.classifier.model_timeout_secs, 30);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.min_similarity - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.embedding_dimensions, 1024);
        assert_eq!(config.state.idle_ttl_secs, 3600);
        assert_eq!(config.state.confirmation_timeout_secs, 300);
        assert_eq!(config.chat.max_message_length, 2000);
        assert!(config.moderation.blocked_terms.is_empty());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"
default_locale = "vi"

[classifier]
use_model = false
history_window = 8
max_completions_per_minute = 5

[retrieval]
top_k = 3
min_similarity = 0.8
embedding_dimensions = 768

[moderation]
blocked_terms = ["forbidden"]
"#;
        let file = create_temp_config(content);
        let config = TasktalkConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.default_locale, Locale::Vi);
        assert!(!config.classifier.use_model);
        assert_eq!(config.classifier.history_window, 8);
        assert_eq!(config.classifier.max_completions_per_minute, 5);
        // Unspecified keys in a present section still default
        assert_eq!(config.classifier.model_timeout_secs, 30);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.embedding_dimensions, 768);
        assert_eq!(config.moderation.blocked_terms, vec!["forbidden"]);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[state]
idle_ttl_secs = 60
"#;
        let file = create_temp_config(content);
        let config = TasktalkConfig::load(file.path()).unwrap();
        assert_eq!(config.state.idle_ttl_secs, 60);
        assert_eq!(config.state.sweep_interval_secs, 300);
        assert_eq!(config.chat.memory_turns, 50);
        assert_eq!(config.inference.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_load_rejects_out_of_range_similarity() {
        let content = r#"
[retrieval]
min_similarity = 1.5
"#;
        let file = create_temp_config(content);
        let err = TasktalkConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, TasktalkError::Config(_)));
        assert!(err.to_string().contains("min_similarity"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = TasktalkConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = TasktalkConfig::default();
        config.classifier.history_window = 0;
        assert!(config.validate().is_err());

        let mut config = TasktalkConfig::default();
        config.state.sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = TasktalkConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.retrieval.top_k, 5);
    }

    #[test]
    fn test_load_or_default_invalid_values() {
        let file = create_temp_config("[chat]\nmax_message_length = 0\n");
        let config = TasktalkConfig::load_or_default(file.path());
        assert_eq!(config.chat.max_message_length, 2000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = TasktalkConfig::default();
        config.general.default_locale = Locale::Vi;
        config.moderation.blocked_terms = vec!["spam".to_string()];
        config.save(&path).unwrap();

        let reloaded = TasktalkConfig::load(&path).unwrap();
        assert_eq!(reloaded.general.default_locale, Locale::Vi);
        assert_eq!(reloaded.moderation.blocked_terms, vec!["spam"]);
        assert_eq!(reloaded.state.idle_ttl_secs, config.state.idle_ttl_secs);
    }
}
