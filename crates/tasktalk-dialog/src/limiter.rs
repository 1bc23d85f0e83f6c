//! Permit limiter for completion-service calls.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

const WINDOW: Duration = Duration::from_secs(60);

/// Token bucket refilled once per minute, shared by every model call.
///
/// When no permit is available the call is skipped and the classifier uses
/// its rule-based strategy instead.
#[derive(Debug)]
pub struct CompletionRateLimiter {
    max_per_minute: u32,
    tokens: Mutex<(u32, Instant)>,
}

impl CompletionRateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            tokens: Mutex::new((max_per_minute, Instant::now())),
        }
    }

    /// Take one permit. Returns `false` when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut state) = self.tokens.lock() else {
            warn!("Completion limiter lock poisoned, denying permit");
            return false;
        };
        if state.1.elapsed() >= WINDOW {
            state.0 = self.max_per_minute;
            state.1 = Instant::now();
        }
        if state.0 > 0 {
            state.0 -= 1;
            true
        } else {
            false
        }
    }

    /// Permits left in the current window.
    pub fn remaining(&self) -> u32 {
        self.tokens
            .lock()
            .map(|state| {
                if state.1.elapsed() >= WINDOW {
                    self.max_per_minute
                } else {
                    state.0
                }
            })
            .unwrap_or(0)
    }
}
