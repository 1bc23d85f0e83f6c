//! Content moderation applied before a message reaches the orchestrator.

use async_trait::async_trait;
use serde::Serialize;

use tasktalk_core::config::ModerationConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModerationVerdict {
    pub safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ModerationVerdict {
    pub fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait ModerationFilter: Send + Sync {
    async fn check(&self, content: &str) -> ModerationVerdict;
}

/// Refuses messages containing any configured term, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct KeywordModeration {
    blocked_terms: Vec<String>,
}

impl KeywordModeration {
    pub fn new(blocked_terms: Vec<String>) -> Self {
        Self {
            blocked_terms: blocked_terms
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ModerationConfig) -> Self {
        Self::new(config.blocked_terms.clone())
    }
}

#[async_trait]
impl ModerationFilter for KeywordModeration {
    async fn check(&self, content: &str) -> ModerationVerdict {
        let lowered = content.to_lowercase();
        match self.blocked_terms.iter().find(|t| lowered.contains(t.as_str())) {
            Some(term) => ModerationVerdict::blocked(format!("contains blocked term '{}'", term)),
            None => ModerationVerdict::safe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_moderation_blocks_case_insensitively() {
        let filter = KeywordModeration::new(vec!["Forbidden".to_string(), "  ".to_string()]);
        let verdict = filter.check("this is FORBIDDEN content").await;
        assert!(!verdict.safe);
        assert_eq!(
            verdict.reason.as_deref(),
            Some("contains blocked term 'forbidden'")
        );
        assert_eq!(filter.check("create task write report").await, ModerationVerdict::safe());
    }

    #[tokio::test]
    async fn test_empty_config_allows_everything() {
        let filter = KeywordModeration::from_config(&ModerationConfig::default());
        assert!(filter.check("anything at all").await.safe);
    }
}
