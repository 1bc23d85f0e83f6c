//! Dialog engine for Tasktalk.
//!
//! Classifies each message against the active conversation flow, collects
//! missing task parameters over several turns, detects refusals, guards
//! implicit commands behind a two-step confirmation, and executes finished
//! commands against the task backend.

pub mod completion;
pub mod confirmation;
pub mod declining;
pub mod error;
pub mod intent;
pub mod limiter;
pub mod prompts;
pub mod slots;
pub mod state;
pub mod tools;
pub mod types;

pub use completion::CompletionService;
pub use confirmation::{enforce_anti_drift, ConfirmationController, ConfirmationOutcome};
pub use declining::{DeclineKind, DeclineVerdict, DecliningDetector};
pub use error::{IntentError, SlotError, ToolError};
pub use intent::{
    ActiveFlow, ClassificationInput, IntentClassifier, IntentStrategy, ModelIntentStrategy,
    RuleBasedStrategy,
};
pub use limiter::CompletionRateLimiter;
pub use slots::SlotFillingEngine;
pub use state::{ConversationState, ConversationStateStore};
pub use tools::{
    ActionExecutor, ExecutionOutcome, InMemoryTaskBackend, NewTask, TaskFilter, TaskRecord,
    TaskStatistics, TaskTools, TaskUpdate, ToolInvocation, ToolOutput,
};
pub use types::{
    slot, ActionKind, ClassifierTier, ContextAnalysis, ContextIntent, ConversationFlow,
    IntentResult, IntentType, Priority, SlotFillingResult, TaskStatus,
};
