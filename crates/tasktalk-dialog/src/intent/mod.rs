//! Two-tier intent classification.
//!
//! Each message is classified against the active flow by an ordered list of
//! [`IntentStrategy`] implementations: the language-model tier first when
//! configured, then the rule-based tier, which never fails. Whatever tier
//! answers, the result passes through the anti-drift guard before it is
//! returned.

mod mapping;
mod model;
mod parse;
pub mod patterns;
mod rules;
pub mod time_parser;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use tasktalk_core::{ConversationTurn, FlowType, Locale, Role};
use tasktalk_retrieval::RagContext;

use crate::confirmation::enforce_anti_drift;
use crate::error::IntentError;
use crate::state::ConversationState;
use crate::types::{
    ClassifierTier, ContextAnalysis, ContextIntent, ConversationFlow, IntentResult,
};

pub use mapping::{map_context_to_action, map_context_to_intent_type, to_intent_result};
pub use model::{ModelIntentStrategy, MODEL_CONFIDENCE_FLOOR};
pub use parse::{extract_json_object, parse_model_output};
pub use rules::{RuleBasedStrategy, FALLBACK_CONFIDENCE_CAP};

/// Number of history turns copied into `relevant_history`.
const RELEVANT_HISTORY_TURNS: usize = 3;

// =============================================================================
// Input
// =============================================================================

/// Snapshot of the flow a message is classified against.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFlow {
    pub flow: ConversationFlow,
    pub flow_type: FlowType,
    pub waiting_for: Option<String>,
    pub filled_slots: BTreeMap<String, String>,
}

impl ActiveFlow {
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            flow: ConversationFlow::from_flow_type(state.flow_type),
            flow_type: state.flow_type,
            waiting_for: state.waiting_for.clone(),
            filled_slots: state.collected_slots.clone(),
        }
    }

    pub fn filled_count(&self) -> usize {
        self.filled_slots
            .values()
            .filter(|v| !v.trim().is_empty())
            .count()
    }
}

/// Intent label stored on an assistant turn that asks for a slot.
pub fn question_label(flow_type: FlowType, slot_name: &str) -> String {
    format!("ask:{}:{}", flow_type, slot_name)
}

/// Inverse of [`question_label`].
pub fn parse_question_label(label: &str) -> Option<(FlowType, String)> {
    let mut parts = label.splitn(3, ':');
    if parts.next()? != "ask" {
        return None;
    }
    let flow_type = parts.next()?.parse().ok()?;
    let slot_name = parts.next().filter(|s| !s.is_empty())?;
    Some((flow_type, slot_name.to_string()))
}

/// Everything a strategy may look at for one message.
#[derive(Debug, Clone)]
pub struct ClassificationInput {
    pub message: String,
    /// Prior turns, oldest first, excluding the message itself.
    pub history: Vec<ConversationTurn>,
    pub active_flow: Option<ActiveFlow>,
    pub locale: Locale,
    /// Best retrieved help answer, if any.
    pub knowledge_hint: Option<String>,
}

impl ClassificationInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            active_flow: None,
            locale: Locale::default(),
            knowledge_hint: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_active_flow(mut self, active_flow: Option<ActiveFlow>) -> Self {
        self.active_flow = active_flow;
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_knowledge_hint(mut self, hint: Option<String>) -> Self {
        self.knowledge_hint = hint;
        self
    }

    /// Build from a retrieved context and the current state snapshot.
    pub fn from_context(
        context: &RagContext,
        state: Option<&ConversationState>,
        locale: Locale,
    ) -> Self {
        let mut history = context.recent_turns.clone();
        // The retriever sees the message after it was recorded.
        if history
            .last()
            .is_some_and(|t| t.role == Role::User && t.content == context.user_message)
        {
            history.pop();
        }
        Self::new(context.user_message.clone())
            .with_history(history)
            .with_active_flow(state.map(ActiveFlow::from_state))
            .with_locale(locale)
            .with_knowledge_hint(context.best_answer().map(str::to_string))
    }

    /// The state snapshot, or the flow implied by the last assistant question
    /// when no snapshot was supplied.
    pub fn effective_flow(&self) -> Option<ActiveFlow> {
        if self.active_flow.is_some() {
            return self.active_flow.clone();
        }
        let last_assistant = self.history.iter().rev().find(|t| t.role == Role::Assistant)?;
        let (flow_type, slot_name) = parse_question_label(last_assistant.intent.as_deref()?)?;
        Some(ActiveFlow {
            flow: ConversationFlow::from_flow_type(flow_type),
            flow_type,
            waiting_for: Some(slot_name),
            filled_slots: BTreeMap::new(),
        })
    }

    fn relevant_history(&self) -> Vec<String> {
        let skip = self.history.len().saturating_sub(RELEVANT_HISTORY_TURNS);
        self.history
            .iter()
            .skip(skip)
            .map(|t| t.content.clone())
            .collect()
    }
}

// =============================================================================
// Strategy selection
// =============================================================================

/// One classification tier.
#[async_trait]
pub trait IntentStrategy: Send + Sync {
    fn tier(&self) -> ClassifierTier;

    async fn classify(&self, input: &ClassificationInput) -> Result<ContextAnalysis, IntentError>;
}

/// Tries each strategy in order and applies the anti-drift guard.
pub struct IntentClassifier {
    strategies: Vec<Arc<dyn IntentStrategy>>,
}

impl IntentClassifier {
    pub fn new(strategies: Vec<Arc<dyn IntentStrategy>>) -> Self {
        Self { strategies }
    }

    /// Rule-based tier only.
    pub fn rule_based() -> Self {
        Self::new(vec![Arc::new(RuleBasedStrategy::new())])
    }

    /// Model tier first, rule-based tier behind it.
    pub fn with_model(model: Arc<dyn IntentStrategy>) -> Self {
        Self::new(vec![model, Arc::new(RuleBasedStrategy::new())])
    }

    pub fn tiers(&self) -> Vec<ClassifierTier> {
        self.strategies.iter().map(|s| s.tier()).collect()
    }

    pub async fn analyze(&self, input: &ClassificationInput) -> ContextAnalysis {
        for strategy in &self.strategies {
            match strategy.classify(input).await {
                Ok(mut analysis) => {
                    if analysis.relevant_history.is_empty() {
                        analysis.relevant_history = input.relevant_history();
                    }
                    let analysis = enforce_anti_drift(analysis, input.active_flow.as_ref());
                    debug!(
                        tier = %analysis.tier,
                        flow = %analysis.current_flow,
                        intent = %analysis.intent_type,
                        confidence = analysis.confidence,
                        "Message classified"
                    );
                    return analysis;
                }
                Err(e) => {
                    warn!(tier = %strategy.tier(), error = %e, "Classifier tier failed, trying next");
                }
            }
        }
        // Unreachable with the rule tier present.
        ContextAnalysis::new(
            ConversationFlow::Idle,
            ContextIntent::SmallTalk,
            0.0,
            ClassifierTier::Fallback,
        )
    }

    /// Analysis plus its coarse [`IntentResult`] projection.
    pub async fn classify(&self, input: &ClassificationInput) -> (ContextAnalysis, IntentResult) {
        let analysis = self.analyze(input).await;
        let result = to_intent_result(&analysis);
        (analysis, result)
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::rule_based()
    }
}
