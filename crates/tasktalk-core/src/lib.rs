//! Shared foundation for the Tasktalk workspace: configuration, the
//! top-level error type, conversation primitives and vocabulary.

pub mod config;
pub mod error;
pub mod lexicon;
pub mod types;

pub use config::TasktalkConfig;
pub use error::{Result, TasktalkError};
pub use types::*;
