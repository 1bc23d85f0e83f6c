//! Conversational front of Tasktalk.
//!
//! The [`ConversationOrchestrator`] sequences decline detection, pending
//! confirmations, context retrieval, intent classification, slot filling and
//! task execution for every message, and always answers with a
//! conversational reply.

pub mod audit;
pub mod error;
pub mod moderation;
pub mod orchestrator;
pub mod response;
pub mod sweeper;

pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use error::ChatError;
pub use moderation::{KeywordModeration, ModerationFilter, ModerationVerdict};
pub use orchestrator::{ChatReply, ConversationOrchestrator, OrchestratorSettings};
pub use response::ResponseComposer;
pub use sweeper::{StateSweeper, SweepStats};
