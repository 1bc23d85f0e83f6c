//! Error types for the conversational front.

use tasktalk_core::error::TasktalkError;
use tasktalk_dialog::{SlotError, ToolError};

/// Internal failures while handling a message.
///
/// The orchestrator turns every one of these into an apology reply; they
/// never reach the caller of `handle_message`.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("slot error: {0}")]
    Slot(#[from] SlotError),
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("memory error: {0}")]
    Memory(String),
    #[error("audit error: {0}")]
    Audit(String),
}

impl From<TasktalkError> for ChatError {
    fn from(err: TasktalkError) -> Self {
        ChatError::Memory(err.to_string())
    }
}
