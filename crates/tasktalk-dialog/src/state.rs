//! Conversation state store.
//!
//! Holds the in-progress multi-turn flow for each conversation. A state only
//! exists while a flow is incomplete: it is removed when the flow completes,
//! is cancelled, or sits idle past the TTL.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use tasktalk_core::{FlowType, Locale, Timestamp};

use crate::error::SlotError;
use crate::types::{slot, ActionKind};

/// Step label used while nothing specific is awaited.
pub const STEP_STARTED: &str = "STARTED";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub flow_type: FlowType,
    /// Free-form label such as `COLLECTING_PRIORITY`.
    pub current_step: String,
    pub collected_slots: BTreeMap<String, String>,
    /// Slot the next user message is expected to answer.
    pub waiting_for: Option<String>,
    pub pending_action: ActionKind,
    /// Optional slots the user chose to leave empty.
    pub skipped_slots: BTreeSet<String>,
    pub locale: Locale,
    pub step_count: u32,
    pub created_at: Timestamp,
    pub last_updated_at: Timestamp,
}

impl ConversationState {
    fn new(conversation_id: &str, flow_type: FlowType, step: &str) -> Self {
        let now = Timestamp::now();
        Self {
            conversation_id: conversation_id.to_string(),
            flow_type,
            current_step: step.to_string(),
            collected_slots: BTreeMap::new(),
            waiting_for: None,
            pending_action: ActionKind::from_flow_type(flow_type),
            skipped_slots: BTreeSet::new(),
            locale: Locale::default(),
            step_count: 0,
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn slot(&self, key: &str) -> Option<&str> {
        self.collected_slots.get(key).map(String::as_str)
    }

    /// A slot counts as filled once it holds a non-blank value.
    pub fn has_slot(&self, key: &str) -> bool {
        self.slot(key).is_some_and(|v| !v.trim().is_empty())
    }

    pub fn filled_slot_count(&self) -> usize {
        self.collected_slots
            .values()
            .filter(|v| !v.trim().is_empty())
            .count()
    }
}

/// Required-slot rules per flow type.
pub fn flow_is_complete(flow_type: FlowType, slots: &BTreeMap<String, String>) -> bool {
    let filled = |key: &str| slots.get(key).is_some_and(|v| !v.trim().is_empty());
    match flow_type {
        FlowType::CreateTask => filled(slot::TITLE),
        FlowType::UpdateTask => filled(slot::TASK_ID) && filled(slot::FIELD) && filled(slot::VALUE),
        FlowType::DeleteTask => filled(slot::TASK_ID),
        FlowType::ListTasks | FlowType::GeneralChat => true,
    }
}

/// Concurrent map of conversation id to in-progress flow.
#[derive(Debug, Default)]
pub struct ConversationStateStore {
    states: DashMap<String, ConversationState>,
}

impl ConversationStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation_id: &str) -> Option<ConversationState> {
        self.states.get(conversation_id).map(|s| s.clone())
    }

    /// Start a flow or move an existing one to `step`.
    ///
    /// Switching to a different flow type discards the previous flow's slots.
    pub fn create_or_update(
        &self,
        conversation_id: &str,
        flow_type: FlowType,
        step: &str,
    ) -> ConversationState {
        match self.states.entry(conversation_id.to_string()) {
            Entry::Vacant(vacant) => vacant
                .insert(ConversationState::new(conversation_id, flow_type, step))
                .clone(),
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                if state.flow_type != flow_type {
                    debug!(
                        conversation_id,
                        from = %state.flow_type,
                        to = %flow_type,
                        "Replacing conversation flow"
                    );
                    *state = ConversationState::new(conversation_id, flow_type, step);
                } else {
                    state.current_step = step.to_string();
                    state.step_count += 1;
                    state.last_updated_at = Timestamp::now();
                }
                state.clone()
            }
        }
    }

    pub fn update_slot(
        &self,
        conversation_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), SlotError> {
        let mut state = self
            .states
            .get_mut(conversation_id)
            .ok_or_else(|| SlotError::NoActiveFlow(conversation_id.to_string()))?;
        state
            .collected_slots
            .insert(key.to_string(), value.trim().to_string());
        state.skipped_slots.remove(key);
        state.last_updated_at = Timestamp::now();
        Ok(())
    }

    pub fn get_slot(&self, conversation_id: &str, key: &str) -> Option<String> {
        self.states
            .get(conversation_id)
            .and_then(|s| s.collected_slots.get(key).cloned())
    }

    /// Whether the conversation's flow has every slot `flow_type` requires.
    /// A missing state is never complete.
    pub fn is_complete(&self, conversation_id: &str, flow_type: FlowType) -> bool {
        self.states
            .get(conversation_id)
            .is_some_and(|s| flow_is_complete(flow_type, &s.collected_slots))
    }

    pub fn set_waiting_for(
        &self,
        conversation_id: &str,
        slot_name: Option<&str>,
    ) -> Result<(), SlotError> {
        let mut state = self
            .states
            .get_mut(conversation_id)
            .ok_or_else(|| SlotError::NoActiveFlow(conversation_id.to_string()))?;
        state.waiting_for = slot_name.map(str::to_string);
        state.current_step = match slot_name {
            Some(name) => format!("COLLECTING_{}", name.to_ascii_uppercase()),
            None => STEP_STARTED.to_string(),
        };
        state.last_updated_at = Timestamp::now();
        Ok(())
    }

    pub fn set_pending_action(
        &self,
        conversation_id: &str,
        action: ActionKind,
        locale: Locale,
    ) -> Result<(), SlotError> {
        let mut state = self
            .states
            .get_mut(conversation_id)
            .ok_or_else(|| SlotError::NoActiveFlow(conversation_id.to_string()))?;
        state.pending_action = action;
        state.locale = locale;
        Ok(())
    }

    pub fn mark_skipped(&self, conversation_id: &str, slot_name: &str) -> Result<(), SlotError> {
        let mut state = self
            .states
            .get_mut(conversation_id)
            .ok_or_else(|| SlotError::NoActiveFlow(conversation_id.to_string()))?;
        state.skipped_slots.insert(slot_name.to_string());
        state.last_updated_at = Timestamp::now();
        Ok(())
    }

    /// Refresh the idle clock without changing the flow.
    pub fn touch(&self, conversation_id: &str) {
        if let Some(mut state) = self.states.get_mut(conversation_id) {
            state.last_updated_at = Timestamp::now();
        }
    }

    /// Remove the conversation's state. Returns whether one existed.
    pub fn clear(&self, conversation_id: &str) -> bool {
        self.states.remove(conversation_id).is_some()
    }

    /// Remove every state idle for longer than `max_idle`.
    pub fn sweep_expired(&self, max_idle: Duration) -> Vec<String> {
        let cutoff = Timestamp::now().plus_secs(-(max_idle.as_secs() as i64));
        self.sweep_idle_before(cutoff)
    }

    /// Remove every state last updated strictly before `cutoff`.
    pub fn sweep_idle_before(&self, cutoff: Timestamp) -> Vec<String> {
        let mut removed = Vec::new();
        self.states.retain(|id, state| {
            let keep = state.last_updated_at >= cutoff;
            if !keep {
                removed.push(id.clone());
            }
            keep
        });
        if !removed.is_empty() {
            debug!(count = removed.len(), "Swept idle conversation states");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_create_and_get() {
        let store = ConversationStateStore::new();
        assert!(store.get("c1").is_none());

        let state = store.create_or_update("c1", FlowType::CreateTask, STEP_STARTED);
        assert_eq!(state.flow_type, FlowType::CreateTask);
        assert_eq!(state.pending_action, ActionKind::CreateTask);
        assert_eq!(state.step_count, 0);
        assert_eq!(store.get("c1").unwrap(), state);
    }

    #[test]
    fn test_update_same_flow_keeps_slots() {
        let store = ConversationStateStore::new();
        store.create_or_update("c1", FlowType::CreateTask, STEP_STARTED);
        store.update_slot("c1", "title", "write report").unwrap();

        let state = store.create_or_update("c1", FlowType::CreateTask, "COLLECTING_PRIORITY");
        assert_eq!(state.slot("title"), Some("write report"));
        assert_eq!(state.current_step, "COLLECTING_PRIORITY");
        assert_eq!(state.step_count, 1);
    }

    #[test]
    fn test_switching_flow_resets_slots() {
        let store = ConversationStateStore::new();
        store.create_or_update("c1", FlowType::CreateTask, STEP_STARTED);
        store.update_slot("c1", "title", "write report").unwrap();

        let state = store.create_or_update("c1", FlowType::DeleteTask, STEP_STARTED);
        assert!(state.collected_slots.is_empty());
        assert_eq!(state.pending_action, ActionKind::DeleteTask);
    }

    #[test]
    fn test_update_slot_without_state_fails() {
        let store = ConversationStateStore::new();
        let err = store.update_slot("missing", "title", "x").unwrap_err();
        assert!(matches!(err, SlotError::NoActiveFlow(_)));
    }

    #[test]
    fn test_get_slot_trims_value() {
        let store = ConversationStateStore::new();
        store.create_or_update("c1", FlowType::CreateTask, STEP_STARTED);
        store.update_slot("c1", "title", "  buy milk ").unwrap();
        assert_eq!(store.get_slot("c1", "title").as_deref(), Some("buy milk"));
        assert!(store.get_slot("c1", "deadline").is_none());
    }

    #[test]
    fn test_create_task_completeness_gate() {
        let store = ConversationStateStore::new();
        assert!(!store.is_complete("c1", FlowType::CreateTask));

        store.create_or_update("c1", FlowType::CreateTask, STEP_STARTED);
        store.update_slot("c1", "priority", "HIGH").unwrap();
        store.update_slot("c1", "deadline", "2026-10-20").unwrap();
        assert!(!store.is_complete("c1", FlowType::CreateTask));

        store.update_slot("c1", "title", "   ").unwrap();
        assert!(!store.is_complete("c1", FlowType::CreateTask));

        store.update_slot("c1", "title", "write report").unwrap();
        assert!(store.is_complete("c1", FlowType::CreateTask));
    }

    #[test]
    fn test_update_and_delete_completeness() {
        let store = ConversationStateStore::new();
        store.create_or_update("u", FlowType::UpdateTask, STEP_STARTED);
        store.update_slot("u", "task_id", "3").unwrap();
        store.update_slot("u", "field", "priority").unwrap();
        assert!(!store.is_complete("u", FlowType::UpdateTask));
        store.update_slot("u", "value", "LOW").unwrap();
        assert!(store.is_complete("u", FlowType::UpdateTask));

        store.create_or_update("d", FlowType::DeleteTask, STEP_STARTED);
        assert!(!store.is_complete("d", FlowType::DeleteTask));
        store.update_slot("d", "task_id", "7").unwrap();
        assert!(store.is_complete("d", FlowType::DeleteTask));
    }

    #[test]
    fn test_list_and_chat_flows_always_complete() {
        let slots = BTreeMap::new();
        assert!(flow_is_complete(FlowType::ListTasks, &slots));
        assert!(flow_is_complete(FlowType::GeneralChat, &slots));
    }

    #[test]
    fn test_waiting_for_sets_step_label() {
        let store = ConversationStateStore::new();
        store.create_or_update("c1", FlowType::CreateTask, STEP_STARTED);
        store.set_waiting_for("c1", Some("deadline")).unwrap();
        let state = store.get("c1").unwrap();
        assert_eq!(state.waiting_for.as_deref(), Some("deadline"));
        assert_eq!(state.current_step, "COLLECTING_DEADLINE");

        store.set_waiting_for("c1", None).unwrap();
        assert_eq!(store.get("c1").unwrap().current_step, STEP_STARTED);
    }

    #[test]
    fn test_skip_then_fill_unmarks() {
        let store = ConversationStateStore::new();
        store.create_or_update("c1", FlowType::CreateTask, STEP_STARTED);
        store.mark_skipped("c1", "deadline").unwrap();
        assert!(store.get("c1").unwrap().skipped_slots.contains("deadline"));

        store.update_slot("c1", "deadline", "2026-11-01").unwrap();
        assert!(!store.get("c1").unwrap().skipped_slots.contains("deadline"));
    }

    #[test]
    fn test_clear() {
        let store = ConversationStateStore::new();
        store.create_or_update("c1", FlowType::CreateTask, STEP_STARTED);
        assert!(store.clear("c1"));
        assert!(!store.clear("c1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_idle_states() {
        let store = ConversationStateStore::new();
        store.create_or_update("old", FlowType::CreateTask, STEP_STARTED);
        store.create_or_update("fresh", FlowType::CreateTask, STEP_STARTED);
        store
            .states
            .get_mut("old")
            .unwrap()
            .last_updated_at = Timestamp::now().plus_secs(-7200);

        let removed = store.sweep_expired(Duration::from_secs(3600));
        assert_eq!(removed, vec!["old".to_string()]);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn test_sweep_idle_before_future_cutoff_removes_all() {
        let store = ConversationStateStore::new();
        store.create_or_update("a", FlowType::CreateTask, STEP_STARTED);
        store.create_or_update("b", FlowType::DeleteTask, STEP_STARTED);
        let mut removed = store.sweep_idle_before(Timestamp::now().plus_secs(10));
        removed.sort();
        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_concurrent_access_different_conversations() {
        let store = Arc::new(ConversationStateStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("conv-{}", i);
                    store.create_or_update(&id, FlowType::CreateTask, STEP_STARTED);
                    store.update_slot(&id, "title", &format!("task {}", i)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 8);
        assert_eq!(store.get_slot("conv-3", "title").as_deref(), Some("task 3"));
    }
}
