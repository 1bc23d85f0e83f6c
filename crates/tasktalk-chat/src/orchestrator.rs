//! Per-message pipeline.
//!
//! ```text
//! message ─> validate ─> decline? ─> pending confirmation? ─> retrieve
//!         ─> classify (+ anti-drift) ─> resume flow | query | chitchat | command
//!         ─> memory + audit
//! ```
//!
//! `handle_message` never fails: internal errors become an apology reply.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use tasktalk_core::{ConversationTurn, Locale, Role, TasktalkConfig};
use tasktalk_dialog::intent::question_label;
use tasktalk_dialog::prompts;
use tasktalk_dialog::{
    ActionExecutor, ActionKind, ClassificationInput, ConfirmationController, ConfirmationOutcome,
    ContextAnalysis, ContextIntent, ConversationState, ConversationStateStore, DeclineVerdict,
    DecliningDetector,
    IntentClassifier, IntentResult, IntentType, SlotFillingEngine, SlotFillingResult,
    ToolInvocation,
};
use tasktalk_retrieval::{ContextRetriever, RagContext, TurnMemory};

use crate::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::error::ChatError;
use crate::response::ResponseComposer;

/// Intent label for assistant turns that ask for a confirmation.
const CONFIRMATION_LABEL: &str = "confirmation";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Longest accepted message, in characters.
    pub max_message_length: usize,
    /// Recent turns handed to the classifier.
    pub history_window: usize,
    pub default_locale: Locale,
    /// Lifetime of the confirmation controller built by
    /// [`ConversationOrchestrator::new`].
    pub confirmation_timeout: Duration,
}

impl From<&TasktalkConfig> for OrchestratorSettings {
    fn from(config: &TasktalkConfig) -> Self {
        Self {
            max_message_length: config.chat.max_message_length,
            history_window: config.classifier.history_window,
            default_locale: config.general.default_locale,
            confirmation_timeout: Duration::from_secs(config.state.confirmation_timeout_secs),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&TasktalkConfig::default())
    }
}

/// Answer to one user message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub intent: Option<IntentResult>,
    pub tool_invocations: Vec<ToolInvocation>,
    pub declined: bool,
    pub context_quality: f32,
}

/// What one message produced, before it is recorded.
#[derive(Debug, Default)]
struct TurnOutcome {
    reply: String,
    intent: Option<IntentResult>,
    invocations: Vec<ToolInvocation>,
    declined: bool,
    /// Intent label stored on the assistant turn.
    label: Option<String>,
}

impl TurnOutcome {
    fn reply(reply: String) -> Self {
        Self {
            reply,
            ..Default::default()
        }
    }

    fn declined(reply: String) -> Self {
        Self {
            reply,
            declined: true,
            ..Default::default()
        }
    }

    fn with_intent(mut self, intent: IntentResult) -> Self {
        self.intent = Some(intent);
        self
    }

    fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

pub struct ConversationOrchestrator {
    retriever: Arc<ContextRetriever>,
    memory: Arc<dyn TurnMemory>,
    classifier: IntentClassifier,
    slots: SlotFillingEngine,
    confirmations: Arc<ConfirmationController>,
    decliner: DecliningDetector,
    executor: ActionExecutor,
    audit: Arc<dyn AuditSink>,
    composer: ResponseComposer,
    settings: OrchestratorSettings,
}

impl ConversationOrchestrator {
    /// Orchestrator with a fresh state store, its own confirmation
    /// controller and a tracing audit sink.
    pub fn new(
        retriever: Arc<ContextRetriever>,
        memory: Arc<dyn TurnMemory>,
        classifier: IntentClassifier,
        executor: ActionExecutor,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            retriever,
            memory,
            classifier,
            slots: SlotFillingEngine::new(Arc::new(ConversationStateStore::new())),
            confirmations: Arc::new(ConfirmationController::new(settings.confirmation_timeout)),
            decliner: DecliningDetector::new(),
            executor,
            audit: Arc::new(TracingAuditSink),
            composer: ResponseComposer::default(),
            settings,
        }
    }

    pub fn with_slot_engine(mut self, slots: SlotFillingEngine) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_confirmations(mut self, confirmations: Arc<ConfirmationController>) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn state_store(&self) -> &Arc<ConversationStateStore> {
        self.slots.store()
    }

    pub fn confirmations(&self) -> &Arc<ConfirmationController> {
        &self.confirmations
    }

    pub fn active_state(&self, conversation_id: &str) -> Option<ConversationState> {
        self.slots.store().get(conversation_id)
    }

    // =========================================================================
    // Entry point
    // =========================================================================

    pub async fn handle_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        message: &str,
    ) -> ChatReply {
        let started = Instant::now();
        let state = self.slots.store().get(conversation_id);
        let fallback_locale = state
            .as_ref()
            .map(|s| s.locale)
            .or_else(|| self.confirmations.get(conversation_id).map(|p| p.locale))
            .unwrap_or(self.settings.default_locale);
        let locale = Locale::detect(message, fallback_locale);

        let message = message.trim();
        if message.is_empty() {
            return simple_reply(self.composer.empty_message(locale));
        }
        let max = self.settings.max_message_length;
        if message.chars().count() > max {
            debug!(conversation_id, max, "Message rejected as too long");
            return simple_reply(self.composer.message_too_long(max, locale));
        }

        let history = match self
            .memory
            .recent(conversation_id, self.settings.history_window)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                warn!(conversation_id, error = %e, "History unavailable");
                Vec::new()
            }
        };
        if let Err(e) = self
            .memory
            .append(conversation_id, ConversationTurn::user(message))
            .await
        {
            warn!(conversation_id, error = %e, "Failed to record user turn");
        }

        let mut context_quality = 0.0;
        let outcome = match self
            .process(
                conversation_id,
                user_id,
                message,
                locale,
                state,
                &history,
                &mut context_quality,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(conversation_id, error = %e, "Message handling failed");
                TurnOutcome::reply(self.composer.apology(locale))
            }
        };

        self.record(conversation_id, user_id, message, &outcome).await;
        debug!(
            conversation_id,
            action = %outcome.intent.as_ref().map_or(ActionKind::None, |i| i.action),
            declined = outcome.declined,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Message handled"
        );

        ChatReply {
            reply: outcome.reply,
            intent: outcome.intent,
            tool_invocations: outcome.invocations,
            declined: outcome.declined,
            context_quality,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn process(
        &self,
        conversation_id: &str,
        user_id: &str,
        message: &str,
        locale: Locale,
        state: Option<ConversationState>,
        history: &[ConversationTurn],
        context_quality: &mut f32,
    ) -> Result<TurnOutcome, ChatError> {
        let confirmation_pending = self.confirmations.is_pending(conversation_id);
        let flow_pending = state.is_some() || confirmation_pending;

        // Refusals win over everything else.
        let previous_assistant = history
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.content.as_str());
        if let Some(verdict) = self.decliner.detect(message, previous_assistant, flow_pending, locale) {
            return Ok(self.decline(conversation_id, verdict));
        }

        if confirmation_pending {
            match self.confirmations.handle_reply(conversation_id, message) {
                ConfirmationOutcome::NotPending => {}
                ConfirmationOutcome::CapabilityAnswer(text) => return Ok(TurnOutcome::reply(text)),
                ConfirmationOutcome::AskParameter(question)
                | ConfirmationOutcome::Reask(question) => {
                    return Ok(TurnOutcome::reply(question).labelled(CONFIRMATION_LABEL))
                }
                ConfirmationOutcome::Cancelled => {
                    return Ok(TurnOutcome::declined(prompts::task_declined(locale)))
                }
                ConfirmationOutcome::Confirmed { action, slots } => {
                    info!(conversation_id, %action, "Implicit command confirmed");
                    let intent = IntentResult {
                        intent_type: IntentType::Command,
                        action,
                        confidence: 1.0,
                        slots,
                        needs_more_info: false,
                        follow_up_question: None,
                    };
                    return Ok(self.execute(user_id, intent, locale).await);
                }
            }
        }

        let context = self
            .retriever
            .retrieve_context(message, conversation_id, user_id)
            .await;
        *context_quality = context.context_quality;

        // The retrieved context may hold an offer the classifier history
        // window did not reach.
        let retrieved = &context.declining_analysis;
        if let Some(verdict) = self.decliner.from_analysis(retrieved, flow_pending, locale) {
            return Ok(self.decline(conversation_id, verdict));
        }

        let input = ClassificationInput::from_context(&context, state.as_ref(), locale)
            .with_history(history.to_vec());
        let (analysis, intent) = self.classifier.classify(&input).await;
        debug!(
            conversation_id,
            tier = %analysis.tier,
            flow = %analysis.current_flow,
            intent = %analysis.intent_type,
            action = %intent.action,
            "Dispatching"
        );

        match state.filter(|s| s.flow_type.is_multi_turn()) {
            Some(state) => {
                self.resume_flow(
                    conversation_id,
                    user_id,
                    message,
                    locale,
                    &state,
                    &analysis,
                    intent,
                    &context,
                )
                .await
            }
            None => {
                self.dispatch(conversation_id, user_id, locale, &analysis, intent, &context)
                    .await
            }
        }
    }

    fn decline(&self, conversation_id: &str, verdict: DeclineVerdict) -> TurnOutcome {
        self.slots.store().clear(conversation_id);
        self.confirmations.cancel(conversation_id);
        info!(
            conversation_id,
            kind = ?verdict.kind,
            phrase = %verdict.matched_phrase,
            "User declined"
        );
        TurnOutcome::declined(verdict.response)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    async fn resume_flow(
        &self,
        conversation_id: &str,
        user_id: &str,
        message: &str,
        locale: Locale,
        state: &ConversationState,
        analysis: &ContextAnalysis,
        intent: IntentResult,
        context: &RagContext,
    ) -> Result<TurnOutcome, ChatError> {
        match analysis.intent_type {
            // A new command replaces the flow in progress.
            ContextIntent::TaskCreation => {
                self.dispatch(conversation_id, user_id, locale, analysis, intent, context)
                    .await
            }
            ContextIntent::FieldInput => {
                let result =
                    self.slots
                        .continue_slot_filling(conversation_id, message, Some(&intent))?;
                Ok(self.after_slot_step(conversation_id, user_id, result, intent, locale).await)
            }
            ContextIntent::Confirmation => {
                let result = self.slots.confirm(conversation_id)?;
                Ok(self.after_slot_step(conversation_id, user_id, result, intent, locale).await)
            }
            ContextIntent::Offtopic | ContextIntent::SmallTalk | ContextIntent::Clarification => {
                let mut outcome = self.answer(user_id, locale, analysis, context).await;
                let reminder = self.slots.pending_question(conversation_id);
                outcome.reply =
                    self.composer
                        .with_reminder(&outcome.reply, reminder.as_deref(), locale);
                if let Some(waiting) = state.waiting_for.as_deref() {
                    outcome.label = Some(question_label(state.flow_type, waiting));
                }
                self.slots.store().touch(conversation_id);
                debug!(conversation_id, flow = %state.flow_type, "Flow kept through interruption");
                Ok(outcome.with_intent(intent))
            }
        }
    }

    async fn dispatch(
        &self,
        conversation_id: &str,
        user_id: &str,
        locale: Locale,
        analysis: &ContextAnalysis,
        intent: IntentResult,
        context: &RagContext,
    ) -> Result<TurnOutcome, ChatError> {
        match intent.intent_type {
            IntentType::Query | IntentType::Chitchat => {
                Ok(self.answer(user_id, locale, analysis, context).await.with_intent(intent))
            }
            IntentType::Command if intent.action == ActionKind::None => {
                Ok(self.answer(user_id, locale, analysis, context).await.with_intent(intent))
            }
            IntentType::Command if analysis.is_implicit() => {
                let question = self.confirmations.begin(
                    conversation_id,
                    intent.action,
                    intent.slots.clone(),
                    locale,
                );
                Ok(TurnOutcome::reply(question)
                    .with_intent(intent)
                    .labelled(CONFIRMATION_LABEL))
            }
            IntentType::Command => {
                let evaluated = self.slots.evaluate(&intent, locale);
                let result = self
                    .slots
                    .start_slot_filling(&evaluated, conversation_id, locale)?;
                Ok(self
                    .after_slot_step(conversation_id, user_id, result, evaluated, locale)
                    .await)
            }
        }
    }

    /// Execute a finished flow or ask its next question.
    async fn after_slot_step(
        &self,
        conversation_id: &str,
        user_id: &str,
        result: SlotFillingResult,
        intent: IntentResult,
        locale: Locale,
    ) -> TurnOutcome {
        let mut intent = IntentResult {
            action: result.action,
            slots: result.current_slots,
            ..intent
        };
        if result.is_complete {
            intent.needs_more_info = false;
            intent.follow_up_question = None;
            return self.execute(user_id, intent, locale).await;
        }

        intent.needs_more_info = true;
        intent.follow_up_question = result.next_question.clone();
        let label = self
            .slots
            .store()
            .get(conversation_id)
            .and_then(|s| s.waiting_for.map(|w| question_label(s.flow_type, &w)));
        let mut outcome = TurnOutcome::reply(
            result
                .next_question
                .unwrap_or_else(|| prompts::general_help(locale)),
        )
        .with_intent(intent);
        outcome.label = label;
        outcome
    }

    /// Reply to a query, small talk or an off-topic question.
    async fn answer(
        &self,
        user_id: &str,
        locale: Locale,
        analysis: &ContextAnalysis,
        context: &RagContext,
    ) -> TurnOutcome {
        let lookup = match analysis.query_target() {
            Some("tasks") => Some(ActionKind::GetTasks),
            Some("statistics") => Some(ActionKind::GetStatistics),
            _ => None,
        };
        if let Some(action) = lookup {
            let outcome = self.executor.execute(user_id, action, &BTreeMap::new()).await;
            return TurnOutcome {
                reply: self.composer.tool_result(&outcome.output, locale),
                invocations: vec![outcome.invocation],
                label: Some(action.to_string()),
                ..Default::default()
            };
        }
        let small_talk = analysis.metadata.get("small_talk").map(String::as_str);
        TurnOutcome::reply(self.composer.conversational(small_talk, context, locale))
    }

    async fn execute(&self, user_id: &str, intent: IntentResult, locale: Locale) -> TurnOutcome {
        let outcome = self
            .executor
            .execute(user_id, intent.action, &intent.slots)
            .await;
        TurnOutcome {
            reply: self.composer.tool_result(&outcome.output, locale),
            label: Some(intent.action.to_string()),
            intent: Some(intent),
            invocations: vec![outcome.invocation],
            declined: false,
        }
    }

    // =========================================================================
    // Recording
    // =========================================================================

    async fn record(
        &self,
        conversation_id: &str,
        user_id: &str,
        message: &str,
        outcome: &TurnOutcome,
    ) {
        let mut turn = ConversationTurn::assistant(outcome.reply.clone());
        if let Some(label) = &outcome.label {
            turn = turn.with_intent(label.clone());
        }
        if let Err(e) = self.memory.append(conversation_id, turn).await {
            warn!(conversation_id, error = %e, "Failed to record assistant turn");
        }

        let user_intent = outcome.intent.as_ref().map(|i| i.intent_type.to_string());
        let records = [
            AuditRecord::new(conversation_id, user_id, Role::User, message).with_intent(user_intent),
            AuditRecord::new(conversation_id, user_id, Role::Assistant, &outcome.reply)
                .with_intent(outcome.label.clone()),
        ];
        for record in records {
            if let Err(e) = self.audit.record(record).await {
                warn!(conversation_id, error = %e, "Audit write failed");
            }
        }
    }
}

fn simple_reply(reply: String) -> ChatReply {
    ChatReply {
        reply,
        intent: None,
        tool_invocations: Vec::new(),
        declined: false,
        context_quality: 0.0,
    }
}
