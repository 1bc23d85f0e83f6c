//! Two-step confirmation for commands detected without an explicit trigger,
//! and the anti-drift guard that keeps off-topic turns inside the active flow.
//!
//! ```text
//! begin ──> STEP_1  "create it, or just asking?"
//!             │ just asking ──────────────> capability answer, cleared
//!             │ yes + title known ────────> confirmed
//!             │ yes ──> STEP_2 "what should it be called?"
//!             │                │ usable title ──> confirmed
//!             │                │ otherwise ─────> re-ask STEP_2
//!             │ anything else ──> re-ask STEP_1
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use tasktalk_core::lexicon::{self, AFFIRMATIVES, BARE_NEGATIVES, REFUSAL_PHRASES};
use tasktalk_core::{Locale, Timestamp};

use crate::intent::{patterns, ActiveFlow};
use crate::prompts;
use crate::slots::clean_title;
use crate::types::{slot, ActionKind, ContextAnalysis, ContextIntent};

const JUST_ASKING: &[&str] = &[
    "just asking",
    "only asking",
    "just wondering",
    "i was asking",
    "i was just asking",
    "chỉ hỏi",
    "hỏi thôi",
    "hỏi chơi",
];

/// Leading words that accept the offer even with more text after them.
const ACCEPT_LEADS: &[&str] = &["yes", "yeah", "yep", "sure", "ok", "okay", "có", "ừ"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationStep {
    Step1,
    Step2,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingConfirmation {
    pub action: ActionKind,
    pub step: ConfirmationStep,
    /// Slots found in the original message; `title` may be missing.
    pub candidate_slots: BTreeMap<String, String>,
    pub locale: Locale,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    /// Nothing pending; handle the message normally.
    NotPending,
    /// The user was only asking. Pending confirmation cleared.
    CapabilityAnswer(String),
    /// STEP_2: ask for the missing parameter.
    AskParameter(String),
    /// Unclear answer; the same step is asked again.
    Reask(String),
    /// Refused. Pending confirmation cleared.
    Cancelled,
    /// Execute `action` with `slots`. Pending confirmation cleared.
    Confirmed {
        action: ActionKind,
        slots: BTreeMap<String, String>,
    },
}

pub struct ConfirmationController {
    pending: DashMap<String, PendingConfirmation>,
    ttl: Duration,
}

impl ConfirmationController {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Register an implicit command and return the STEP_1 question.
    pub fn begin(
        &self,
        conversation_id: &str,
        action: ActionKind,
        candidate_slots: BTreeMap<String, String>,
        locale: Locale,
    ) -> String {
        let question =
            prompts::confirmation_offer(candidate_slots.get(slot::TITLE).map(String::as_str), locale);
        self.pending.insert(
            conversation_id.to_string(),
            PendingConfirmation {
                action,
                step: ConfirmationStep::Step1,
                candidate_slots,
                locale,
                created_at: Timestamp::now(),
            },
        );
        debug!(conversation_id, %action, "Confirmation requested");
        question
    }

    pub fn handle_reply(&self, conversation_id: &str, message: &str) -> ConfirmationOutcome {
        let Some(pending) = self.pending.get(conversation_id).map(|p| p.clone()) else {
            return ConfirmationOutcome::NotPending;
        };
        if pending.created_at.elapsed_secs() > self.ttl.as_secs() {
            self.pending.remove(conversation_id);
            debug!(conversation_id, "Pending confirmation expired");
            return ConfirmationOutcome::NotPending;
        }

        if lexicon::is_exactly(message, REFUSAL_PHRASES)
            || lexicon::is_exactly(message, BARE_NEGATIVES)
        {
            self.pending.remove(conversation_id);
            return ConfirmationOutcome::Cancelled;
        }

        match pending.step {
            ConfirmationStep::Step1 => self.step_one(conversation_id, message, pending),
            ConfirmationStep::Step2 => self.step_two(conversation_id, message, pending),
        }
    }

    fn step_one(
        &self,
        conversation_id: &str,
        message: &str,
        pending: PendingConfirmation,
    ) -> ConfirmationOutcome {
        let locale = pending.locale;
        if lexicon::contains_any(message, JUST_ASKING) || lexicon::is_question(message) {
            self.pending.remove(conversation_id);
            return ConfirmationOutcome::CapabilityAnswer(prompts::capability_answer(locale));
        }
        if accepts(message) {
            if pending.candidate_slots.contains_key(slot::TITLE) {
                self.pending.remove(conversation_id);
                return ConfirmationOutcome::Confirmed {
                    action: pending.action,
                    slots: pending.candidate_slots,
                };
            }
            if let Some(mut p) = self.pending.get_mut(conversation_id) {
                p.step = ConfirmationStep::Step2;
            }
            return ConfirmationOutcome::AskParameter(prompts::confirmation_title_question(locale));
        }
        ConfirmationOutcome::Reask(prompts::confirmation_reask(locale))
    }

    fn step_two(
        &self,
        conversation_id: &str,
        message: &str,
        pending: PendingConfirmation,
    ) -> ConfirmationOutcome {
        match clean_title(message) {
            Some(title) => {
                self.pending.remove(conversation_id);
                let mut slots = pending.candidate_slots;
                slots.insert(slot::TITLE.to_string(), title);
                ConfirmationOutcome::Confirmed {
                    action: pending.action,
                    slots,
                }
            }
            None => ConfirmationOutcome::Reask(prompts::slot_question(slot::TITLE, pending.locale)),
        }
    }

    pub fn is_pending(&self, conversation_id: &str) -> bool {
        self.pending.contains_key(conversation_id)
    }

    pub fn get(&self, conversation_id: &str) -> Option<PendingConfirmation> {
        self.pending.get(conversation_id).map(|p| p.clone())
    }

    pub fn cancel(&self, conversation_id: &str) -> bool {
        self.pending.remove(conversation_id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop confirmations older than the configured timeout.
    pub fn sweep_expired(&self) -> Vec<String> {
        let mut removed = Vec::new();
        let ttl = self.ttl.as_secs();
        self.pending.retain(|id, p| {
            let keep = p.created_at.elapsed_secs() <= ttl;
            if !keep {
                removed.push(id.clone());
            }
            keep
        });
        removed
    }
}

/// Whether a STEP_1 answer accepts the offer.
fn accepts(message: &str) -> bool {
    if lexicon::is_exactly(message, AFFIRMATIVES) {
        return true;
    }
    let norm = lexicon::normalize(message);
    let first = norm
        .split(|c: char| c.is_whitespace() || c == ',')
        .next()
        .unwrap_or_default();
    ACCEPT_LEADS.contains(&first) || patterns::explicit_create(message).is_some()
}

/// Keep an off-topic or small-talk turn inside the active task flow.
///
/// Applied to every analysis regardless of the tier that produced it.
pub fn enforce_anti_drift(mut analysis: ContextAnalysis, active: Option<&ActiveFlow>) -> ContextAnalysis {
    let Some(active) = active.filter(|a| a.flow.is_task_flow()) else {
        return analysis;
    };
    match analysis.intent_type {
        ContextIntent::Offtopic | ContextIntent::SmallTalk => {
            if analysis.current_flow != active.flow {
                debug!(
                    from = %analysis.current_flow,
                    to = %active.flow,
                    "Anti-drift restored active flow"
                );
            }
            analysis.current_flow = active.flow;
            analysis.should_continue_flow = true;
            analysis.next_expected_input = active.waiting_for.clone();
        }
        ContextIntent::FieldInput | ContextIntent::Confirmation
            if !analysis.current_flow.is_task_flow() =>
        {
            analysis.current_flow = active.flow;
            analysis.should_continue_flow = true;
        }
        _ => {}
    }
    analysis
}
