//! Slot-filling engine.
//!
//! Drives a multi-turn flow from the state store: seeds slots from the
//! classifier, asks for the first missing prompted slot, extracts the
//! awaited value from each answer, and reports completion. A filled or
//! skipped slot is never asked again within the same flow.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use chrono::{Local, NaiveDate};
use regex::Regex;
use tracing::{debug, warn};

use tasktalk_core::lexicon::{self, AFFIRMATIVES, BARE_NEGATIVES, REFUSAL_PHRASES, SKIP_PHRASES};
use tasktalk_core::Locale;

use crate::error::SlotError;
use crate::intent::{patterns, time_parser};
use crate::prompts;
use crate::state::{ConversationState, ConversationStateStore, STEP_STARTED};
use crate::types::{slot, IntentResult, Priority, SlotFillingResult, TaskStatus};

const MAX_TITLE_CHARS: usize = 200;

static TASK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:#|\b)(\d{1,9})\b").expect("Invalid task id regex"));

static VALUE_LEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:change\s+it|set\s+it|make\s+it)\s+)?(?:to|thành|là|as)\s+")
        .expect("Invalid value regex")
});

// =============================================================================
// Extractors
// =============================================================================

/// Usable task title, or `None` for yes/no answers, skips, questions and
/// blank input.
pub fn clean_title(text: &str) -> Option<String> {
    let trimmed = text
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”'))
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | ',' | ';'))
        .trim();
    if trimmed.chars().count() < 2 || trimmed.chars().count() > MAX_TITLE_CHARS {
        return None;
    }
    let rejected = [AFFIRMATIVES, BARE_NEGATIVES, REFUSAL_PHRASES, SKIP_PHRASES]
        .iter()
        .any(|phrases| lexicon::is_exactly(trimmed, phrases));
    if rejected || lexicon::is_question(trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn extract_priority(text: &str) -> Option<Priority> {
    text.parse::<Priority>()
        .ok()
        .or_else(|| patterns::find_priority(text).map(|m| m.priority))
}

/// Deadline as an ISO date string.
pub fn extract_deadline(text: &str, today: NaiveDate) -> Option<String> {
    if let Ok(date) = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    time_parser::parse_deadline(text, today).map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn extract_task_id(text: &str) -> Option<String> {
    TASK_ID.captures(text).map(|c| c[1].to_string())
}

/// Canonical update field named anywhere in `text`.
pub fn extract_field(text: &str) -> Option<&'static str> {
    let norm = lexicon::normalize(text);
    if let Some(field) = patterns::canonical_field(&norm) {
        return Some(field);
    }
    let words: Vec<&str> = norm.split_whitespace().collect();
    words
        .windows(2)
        .find_map(|pair| patterns::canonical_field(&pair.join(" ")))
        .or_else(|| words.iter().find_map(|w| patterns::canonical_field(w)))
}

/// New value for `field`, normalized the way the backend stores it.
pub fn extract_value(text: &str, field: Option<&str>, today: NaiveDate) -> Option<String> {
    let stripped = VALUE_LEAD.replace(text, "");
    let stripped = stripped.trim();
    match field {
        Some("priority") => extract_priority(stripped).map(|p| p.to_string()),
        Some("deadline") => extract_deadline(stripped, today),
        Some("status") => lexicon::normalize(stripped)
            .parse::<TaskStatus>()
            .ok()
            .map(|s| s.to_string()),
        _ => clean_title(stripped),
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct SlotFillingEngine {
    store: Arc<ConversationStateStore>,
    today: Option<NaiveDate>,
}

impl SlotFillingEngine {
    pub fn new(store: Arc<ConversationStateStore>) -> Self {
        Self { store, today: None }
    }

    /// Pin the date relative deadlines resolve against.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn store(&self) -> &Arc<ConversationStateStore> {
        &self.store
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Fill `needs_more_info` and `follow_up_question` for a fresh intent.
    pub fn evaluate(&self, intent: &IntentResult, locale: Locale) -> IntentResult {
        let mut result = intent.clone();
        let missing = intent
            .action
            .prompted_slots()
            .iter()
            .find(|name| intent.slot(name).map_or(true, |v| v.trim().is_empty()));
        result.needs_more_info = missing.is_some();
        result.follow_up_question = missing.map(|name| prompts::slot_question(name, locale));
        result
    }

    /// Open a flow for `intent`, discarding any flow already in progress.
    pub fn start_slot_filling(
        &self,
        intent: &IntentResult,
        conversation_id: &str,
        locale: Locale,
    ) -> Result<SlotFillingResult, SlotError> {
        let action = intent.action;
        self.store.clear(conversation_id);
        self.store
            .create_or_update(conversation_id, action.flow_type(), STEP_STARTED);
        self.store
            .set_pending_action(conversation_id, action, locale)?;

        let state = self.current(conversation_id)?;
        let seeded = self.merge_classifier_slots(&state, intent)?;
        debug!(conversation_id, %action, seeded = seeded.len(), "Slot filling started");
        self.advance(conversation_id, None)
    }

    /// Apply one user answer to the active flow.
    pub fn continue_slot_filling(
        &self,
        conversation_id: &str,
        message: &str,
        intent: Option<&IntentResult>,
    ) -> Result<SlotFillingResult, SlotError> {
        let state = self.current(conversation_id)?;
        let filled_now = match intent {
            Some(intent) => self.merge_classifier_slots(&state, intent)?,
            None => BTreeSet::new(),
        };

        let mut rejected = None;
        if let Some(waiting) = state.waiting_for.as_deref() {
            // Classifier output wins; the raw answer only feeds the awaited slot.
            if filled_now.is_empty() {
                if state.pending_action.is_optional(waiting)
                    && lexicon::is_exactly(message, SKIP_PHRASES)
                {
                    debug!(conversation_id, slot = waiting, "Optional slot skipped");
                    self.store.mark_skipped(conversation_id, waiting)?;
                } else {
                    let state = self.current(conversation_id)?;
                    match self.extract(waiting, message, &state) {
                        Ok(Some(value)) => self.store.update_slot(conversation_id, waiting, &value)?,
                        Ok(None) => rejected = Some(waiting.to_string()),
                        Err(e) => {
                            warn!(conversation_id, error = %e, "Slot extraction unavailable");
                            rejected = Some(waiting.to_string());
                        }
                    }
                }
            }
        }

        // Optional slots are asked once; an unusable answer leaves them empty.
        if let Some(name) = rejected.as_deref() {
            if state.pending_action.is_optional(name) {
                self.store.mark_skipped(conversation_id, name)?;
                rejected = None;
            }
        }
        self.store.touch(conversation_id);
        self.advance(conversation_id, rejected.as_deref())
    }

    /// Execute now: complete if required slots are present, otherwise ask for
    /// the first missing required slot.
    pub fn confirm(&self, conversation_id: &str) -> Result<SlotFillingResult, SlotError> {
        let state = self.current(conversation_id)?;
        let action = state.pending_action;
        let missing = action
            .required_slots()
            .iter()
            .find(|name| !state.has_slot(name))
            .copied();
        match missing {
            None => Ok(self.complete(conversation_id, state)),
            Some(name) => {
                self.store.set_waiting_for(conversation_id, Some(name))?;
                Ok(SlotFillingResult {
                    is_complete: false,
                    next_question: Some(prompts::slot_question(name, state.locale)),
                    current_slots: state.collected_slots,
                    action,
                })
            }
        }
    }

    /// Question for the slot currently awaited, if any.
    pub fn pending_question(&self, conversation_id: &str) -> Option<String> {
        let state = self.store.get(conversation_id)?;
        let waiting = state.waiting_for.as_deref()?;
        Some(prompts::slot_question(waiting, state.locale))
    }

    fn current(&self, conversation_id: &str) -> Result<ConversationState, SlotError> {
        self.store
            .get(conversation_id)
            .ok_or_else(|| SlotError::NoActiveFlow(conversation_id.to_string()))
    }

    /// Store every classifier slot the action accepts and the extractors
    /// validate. Returns the names stored.
    fn merge_classifier_slots(
        &self,
        state: &ConversationState,
        intent: &IntentResult,
    ) -> Result<BTreeSet<String>, SlotError> {
        let mut stored = BTreeSet::new();
        for (name, value) in &intent.slots {
            if !state.pending_action.accepts_slot(name) {
                continue;
            }
            match self.extract(name, value, &self.current(&state.conversation_id)?) {
                Ok(Some(clean)) => {
                    self.store
                        .update_slot(&state.conversation_id, name, &clean)?;
                    stored.insert(name.clone());
                }
                Ok(None) => debug!(slot = %name, "Classifier slot rejected by extractor"),
                Err(e) => warn!(error = %e, "Classifier slot dropped"),
            }
        }
        Ok(stored)
    }

    fn extract(
        &self,
        slot_name: &str,
        text: &str,
        state: &ConversationState,
    ) -> Result<Option<String>, SlotError> {
        let value = match slot_name {
            slot::TITLE => clean_title(text),
            slot::DESCRIPTION => Some(text.trim().to_string()).filter(|d| !d.is_empty()),
            slot::PRIORITY => extract_priority(text).map(|p| p.to_string()),
            slot::DEADLINE => extract_deadline(text, self.today()),
            slot::TASK_ID => extract_task_id(text),
            slot::FIELD => extract_field(text).map(str::to_string),
            slot::VALUE => extract_value(text, state.slot(slot::FIELD), self.today()),
            other => {
                return Err(SlotError::UnsupportedSlot {
                    slot: other.to_string(),
                    action: state.pending_action,
                })
            }
        };
        Ok(value)
    }

    fn advance(
        &self,
        conversation_id: &str,
        rejected: Option<&str>,
    ) -> Result<SlotFillingResult, SlotError> {
        let state = self.current(conversation_id)?;
        let action = state.pending_action;
        let next = action
            .prompted_slots()
            .iter()
            .find(|name| !state.has_slot(name) && !state.skipped_slots.contains(**name))
            .copied();

        let Some(name) = next else {
            return Ok(self.complete(conversation_id, state));
        };
        self.store.set_waiting_for(conversation_id, Some(name))?;
        let question = if rejected == Some(name) {
            prompts::invalid_answer(name, state.locale)
        } else {
            prompts::slot_question(name, state.locale)
        };
        Ok(SlotFillingResult {
            is_complete: false,
            next_question: Some(question),
            current_slots: state.collected_slots,
            action,
        })
    }

    fn complete(&self, conversation_id: &str, state: ConversationState) -> SlotFillingResult {
        self.store.clear(conversation_id);
        debug!(
            conversation_id,
            action = %state.pending_action,
            slots = state.collected_slots.len(),
            "Slot filling complete"
        );
        SlotFillingResult {
            is_complete: true,
            next_question: None,
            current_slots: state.collected_slots,
            action: state.pending_action,
        }
    }
}
