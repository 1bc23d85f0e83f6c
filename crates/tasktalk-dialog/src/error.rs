//! Error types for the dialog engine.

use crate::types::ActionKind;
use tasktalk_core::error::TasktalkError;

/// Errors from a single intent-classification strategy.
///
/// None of these reach the user: the classifier moves on to the next
/// strategy when one fails.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("Completion service failed: {0}")]
    Upstream(String),
    #[error("Completion call timed out after {0} seconds")]
    Timeout(u64),
    #[error("Completion permits exhausted")]
    RateLimited,
    #[error("Model output rejected: {0}")]
    Parse(String),
}

impl From<TasktalkError> for IntentError {
    fn from(err: TasktalkError) -> Self {
        match err {
            TasktalkError::Timeout(secs) => IntentError::Timeout(secs),
            TasktalkError::RateLimited => IntentError::RateLimited,
            other => IntentError::Upstream(other.to_string()),
        }
    }
}

/// Errors from slot bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    #[error("No active flow for conversation {0}")]
    NoActiveFlow(String),
    #[error("No extractor for slot '{slot}' of {action}")]
    UnsupportedSlot { slot: String, action: ActionKind },
}

/// Errors from the task backend and the action executor.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Task not found: {0}")]
    NotFound(String),
    #[error("Invalid task parameters: {0}")]
    InvalidParameters(String),
    #[error("Action is not executable: {0}")]
    NotExecutable(ActionKind),
    #[error("Task backend error: {0}")]
    Backend(String),
}

impl ToolError {
    /// Failures worth one more attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_error_display() {
        assert_eq!(
            IntentError::Upstream("503".to_string()).to_string(),
            "Completion service failed: 503"
        );
        assert_eq!(
            IntentError::Timeout(30).to_string(),
            "Completion call timed out after 30 seconds"
        );
        assert_eq!(
            IntentError::RateLimited.to_string(),
            "Completion permits exhausted"
        );
        assert_eq!(
            IntentError::Parse("no JSON object".to_string()).to_string(),
            "Model output rejected: no JSON object"
        );
    }

    #[test]
    fn test_intent_error_from_core_error() {
        assert!(matches!(
            IntentError::from(TasktalkError::Timeout(5)),
            IntentError::Timeout(5)
        ));
        assert!(matches!(
            IntentError::from(TasktalkError::RateLimited),
            IntentError::RateLimited
        ));
        let err = IntentError::from(TasktalkError::Upstream("connection reset".to_string()));
        assert!(matches!(err, IntentError::Upstream(_)));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_slot_error_display() {
        assert_eq!(
            SlotError::NoActiveFlow("c1".to_string()).to_string(),
            "No active flow for conversation c1"
        );
        let err = SlotError::UnsupportedSlot {
            slot: "color".to_string(),
            action: ActionKind::CreateTask,
        };
        assert_eq!(err.to_string(), "No extractor for slot 'color' of CREATE_TASK");
    }

    #[test]
    fn test_tool_error_display() {
        assert_eq!(
            ToolError::NotFound("42".to_string()).to_string(),
            "Task not found: 42"
        );
        assert_eq!(
            ToolError::NotExecutable(ActionKind::None).to_string(),
            "Action is not executable: NONE"
        );
        assert_eq!(
            ToolError::InvalidParameters("title is blank".to_string()).to_string(),
            "Invalid task parameters: title is blank"
        );
    }
}
