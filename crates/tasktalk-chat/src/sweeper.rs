//! Periodic removal of idle conversation states, expired confirmations and
//! idle turn memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info};

use tasktalk_core::config::StateConfig;
use tasktalk_dialog::{ConfirmationController, ConversationStateStore};
use tasktalk_retrieval::InMemoryTurnMemory;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub states: usize,
    pub confirmations: usize,
    pub memories: usize,
}

impl SweepStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Background sweeper. Runs until [`StateSweeper::shutdown`] is called.
pub struct StateSweeper {
    states: Arc<ConversationStateStore>,
    confirmations: Arc<ConfirmationController>,
    memory: Option<Arc<InMemoryTurnMemory>>,
    idle_ttl: Duration,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl StateSweeper {
    pub fn new(
        states: Arc<ConversationStateStore>,
        confirmations: Arc<ConfirmationController>,
        idle_ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            states,
            confirmations,
            memory: None,
            idle_ttl,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn from_config(
        states: Arc<ConversationStateStore>,
        confirmations: Arc<ConfirmationController>,
        config: &StateConfig,
    ) -> Self {
        Self::new(
            states,
            confirmations,
            Duration::from_secs(config.idle_ttl_secs),
            Duration::from_secs(config.sweep_interval_secs),
        )
    }

    /// Also evict turn memory of conversations idle past the same TTL.
    pub fn with_turn_memory(mut self, memory: Arc<InMemoryTurnMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn sweep_once(&self) -> SweepStats {
        let stats = SweepStats {
            states: self.states.sweep_expired(self.idle_ttl).len(),
            confirmations: self.confirmations.sweep_expired().len(),
            memories: self
                .memory
                .as_ref()
                .map_or(0, |m| m.sweep_idle(self.idle_ttl).len()),
        };
        if !stats.is_empty() {
            info!(
                states = stats.states,
                confirmations = stats.confirmations,
                memories = stats.memories,
                "Swept idle conversations"
            );
        }
        stats
    }

    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.interval);
        debug!(interval_secs = self.interval.as_secs(), "State sweeper started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_once();
                }
                _ = self.shutdown.notified() => {
                    debug!("State sweeper stopped");
                    return;
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
