//! Projection of a fine-grained [`ContextAnalysis`] onto the coarse
//! [`IntentResult`] the orchestrator dispatches on.

use std::collections::BTreeMap;

use crate::types::{
    slot, ActionKind, ContextAnalysis, ContextIntent, ConversationFlow, IntentResult, IntentType,
};

/// Metadata key prefix for secondary slots found alongside the main field.
pub(crate) const SLOT_PREFIX: &str = "slot.";

pub fn map_context_to_intent_type(analysis: &ContextAnalysis) -> IntentType {
    match analysis.intent_type {
        ContextIntent::Offtopic | ContextIntent::SmallTalk => IntentType::Chitchat,
        ContextIntent::Clarification => IntentType::Query,
        ContextIntent::TaskCreation | ContextIntent::FieldInput | ContextIntent::Confirmation => {
            match analysis.current_flow {
                ConversationFlow::TaskQuery => IntentType::Query,
                ConversationFlow::Idle if analysis.intent_type != ContextIntent::TaskCreation => {
                    IntentType::Chitchat
                }
                _ => IntentType::Command,
            }
        }
    }
}

pub fn map_context_to_action(analysis: &ContextAnalysis) -> ActionKind {
    match analysis.current_flow {
        ConversationFlow::TaskCreation => ActionKind::CreateTask,
        ConversationFlow::TaskUpdate => ActionKind::UpdateTask,
        ConversationFlow::TaskDeletion => ActionKind::DeleteTask,
        ConversationFlow::TaskQuery | ConversationFlow::Idle => query_action(analysis),
    }
}

fn query_action(analysis: &ContextAnalysis) -> ActionKind {
    match analysis.query_target() {
        Some("statistics") => ActionKind::GetStatistics,
        Some("tasks") => ActionKind::GetTasks,
        _ => ActionKind::None,
    }
}

pub fn to_intent_result(analysis: &ContextAnalysis) -> IntentResult {
    let intent_type = map_context_to_intent_type(analysis);
    let action = match intent_type {
        IntentType::Chitchat => ActionKind::None,
        _ => map_context_to_action(analysis),
    };

    let mut slots = BTreeMap::new();
    if matches!(
        analysis.intent_type,
        ContextIntent::TaskCreation | ContextIntent::FieldInput
    ) {
        if let (Some(field), Some(value)) = (&analysis.field_mapping, &analysis.extracted_value) {
            if field != slot::ADDITIONAL_INFO && !value.trim().is_empty() {
                slots.insert(field.clone(), value.trim().to_string());
            }
        }
        for (key, value) in &analysis.metadata {
            if let Some(name) = key.strip_prefix(SLOT_PREFIX) {
                slots.entry(name.to_string()).or_insert_with(|| value.clone());
            }
        }
    }

    let needs_more_info = action
        .required_slots()
        .iter()
        .any(|required| !slots.contains_key(*required));

    IntentResult {
        intent_type,
        action,
        confidence: analysis.confidence,
        slots,
        needs_more_info,
        follow_up_question: None,
    }
}
