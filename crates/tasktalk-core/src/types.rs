use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Time
// =============================================================================

/// Unix timestamp in seconds (UTC).
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// Seconds elapsed since this timestamp, clamped at zero.
    pub fn elapsed_secs(&self) -> u64 {
        (Timestamp::now().0 - self.0).max(0) as u64
    }

    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Language a message is written in. Drives vocabulary and reply templates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Vi,
}

impl Locale {
    /// Guess the locale from the script of `text`.
    ///
    /// Vietnamese is recognised by its distinctive letters (đ, ư, ơ, ă, â, ê,
    /// ô) and the precomposed tone-marked vowels in U+1EA0..=U+1EF9. Anything
    /// else yields `fallback`.
    pub fn detect(text: &str, fallback: Locale) -> Locale {
        let vietnamese = text.chars().any(|c| {
            matches!(
                c,
                'đ' | 'Đ' | 'ư' | 'Ư' | 'ơ' | 'Ơ' | 'ă' | 'Ă' | 'â' | 'Â' | 'ê' | 'Ê' | 'ô' | 'Ô'
            ) || ('\u{1EA0}'..='\u{1EF9}').contains(&c)
        });
        if vietnamese {
            Locale::Vi
        } else {
            fallback
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::En => write!(f, "en"),
            Locale::Vi => write!(f, "vi"),
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Locale::En),
            "vi" | "vietnamese" => Ok(Locale::Vi),
            other => Err(format!("Unknown locale: {}", other)),
        }
    }
}

/// Kind of multi-turn flow a conversation can be in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    CreateTask,
    UpdateTask,
    DeleteTask,
    ListTasks,
    GeneralChat,
}

impl FlowType {
    /// Whether the flow collects parameters over several turns.
    pub fn is_multi_turn(&self) -> bool {
        matches!(
            self,
            FlowType::CreateTask | FlowType::UpdateTask | FlowType::DeleteTask
        )
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowType::CreateTask => write!(f, "create_task"),
            FlowType::UpdateTask => write!(f, "update_task"),
            FlowType::DeleteTask => write!(f, "delete_task"),
            FlowType::ListTasks => write!(f, "list_tasks"),
            FlowType::GeneralChat => write!(f, "general_chat"),
        }
    }
}

impl FromStr for FlowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_task" => Ok(FlowType::CreateTask),
            "update_task" => Ok(FlowType::UpdateTask),
            "delete_task" => Ok(FlowType::DeleteTask),
            "list_tasks" => Ok(FlowType::ListTasks),
            "general_chat" => Ok(FlowType::GeneralChat),
            other => Err(format!("Unknown flow type: {}", other)),
        }
    }
}

/// Speaker of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

// =============================================================================
// Conversation records
// =============================================================================

/// One recorded message. Never mutated after it is appended to memory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: Timestamp,
    /// Intent label attached by the classifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Retrieval similarity when the turn came from the vector store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Timestamp::now(),
            intent: None,
            similarity: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = Some(similarity);
        self
    }
}
