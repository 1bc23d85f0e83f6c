//! Language-model classification tier.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

use tasktalk_core::config::ClassifierConfig;
use tasktalk_core::Role;

use super::parse::parse_model_output;
use super::{ClassificationInput, IntentStrategy};
use crate::completion::CompletionService;
use crate::error::IntentError;
use crate::limiter::CompletionRateLimiter;
use crate::types::{ClassifierTier, ContextAnalysis};

/// Lowest confidence reported for a successfully parsed model answer.
pub const MODEL_CONFIDENCE_FLOOR: f32 = 0.75;

const INSTRUCTIONS: &str = r#"You classify messages for a task-management assistant.
Decide how the CURRENT MESSAGE relates to the active flow.

Respond with exactly one JSON object and nothing else:
{"current_flow": "TASK_CREATION" | "TASK_UPDATE" | "TASK_DELETION" | "TASK_QUERY" | "IDLE",
 "intent_type": "TASK_CREATION" | "FIELD_INPUT" | "OFFTOPIC" | "SMALL_TALK" | "CLARIFICATION" | "CONFIRMATION",
 "field_mapping": "title" | "description" | "priority" | "deadline" | "task_id" | "field" | "value" | "additional_info" | null,
 "extracted_value": string or null,
 "confidence": number between 0 and 1,
 "should_continue_flow": boolean,
 "next_expected_input": string or null,
 "explicit_trigger": boolean,
 "query": "tasks" | "statistics" | null}

Rules:
- While a flow is active, an answer to the awaited field is FIELD_INPUT for that field.
- While a flow is active, unrelated questions are OFFTOPIC and the flow continues.
- "yes", "ok", "create it now" with at least one filled field is CONFIRMATION.
- A request that is implied rather than stated ("I need to call the bank") is TASK_CREATION with explicit_trigger false.
- Priorities are HIGH, MEDIUM or LOW. Deadlines are YYYY-MM-DD."#;

pub struct ModelIntentStrategy {
    completion: Arc<dyn CompletionService>,
    limiter: Arc<CompletionRateLimiter>,
    history_window: usize,
    timeout: Duration,
}

impl ModelIntentStrategy {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        limiter: Arc<CompletionRateLimiter>,
        history_window: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            completion,
            limiter,
            history_window,
            timeout,
        }
    }

    pub fn from_config(completion: Arc<dyn CompletionService>, config: &ClassifierConfig) -> Self {
        Self::new(
            completion,
            Arc::new(CompletionRateLimiter::new(config.max_completions_per_minute)),
            config.history_window,
            Duration::from_secs(config.model_timeout_secs),
        )
    }

    pub fn build_prompt(&self, input: &ClassificationInput) -> String {
        let mut prompt = String::from(INSTRUCTIONS);
        prompt.push_str("\n\n");

        match &input.active_flow {
            Some(active) => {
                let filled = active
                    .filled_slots
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(
                    prompt,
                    "Active flow: {} (waiting for: {}; filled: {})",
                    active.flow,
                    active.waiting_for.as_deref().unwrap_or("nothing"),
                    if filled.is_empty() { "none" } else { &filled }
                );
            }
            None => prompt.push_str("Active flow: none\n"),
        }

        if let Some(hint) = &input.knowledge_hint {
            let _ = writeln!(prompt, "Related help: {}", hint);
        }

        let skip = input.history.len().saturating_sub(self.history_window);
        if input.history.len() > skip {
            prompt.push_str("Recent conversation (oldest first):\n");
            for turn in input.history.iter().skip(skip) {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                let _ = writeln!(prompt, "{}: {}", role, turn.content.replace('\n', " "));
            }
        }

        let _ = write!(prompt, "\nCURRENT MESSAGE: {:?}\n", input.message);
        prompt
    }
}

#[async_trait]
impl IntentStrategy for ModelIntentStrategy {
    fn tier(&self) -> ClassifierTier {
        ClassifierTier::Model
    }

    async fn classify(&self, input: &ClassificationInput) -> Result<ContextAnalysis, IntentError> {
        if !self.limiter.try_acquire() {
            return Err(IntentError::RateLimited);
        }
        let prompt = self.build_prompt(input);
        let reply = timeout(self.timeout, self.completion.complete(&prompt))
            .await
            .map_err(|_| IntentError::Timeout(self.timeout.as_secs()))??;
        debug!(
            model = self.completion.model_name(),
            reply_len = reply.len(),
            "Model classification reply"
        );
        parse_model_output(&reply)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tasktalk_core::error::TasktalkError;
    use tasktalk_core::{ConversationTurn, FlowType};

    use super::*;
    use crate::intent::ActiveFlow;
    use crate::types::{ContextIntent, ConversationFlow};

    struct ScriptedCompletion {
        reply: Result<String, String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedCompletion {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, TasktalkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(TasktalkError::Upstream)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn strategy(completion: Arc<ScriptedCompletion>, permits: u32) -> ModelIntentStrategy {
        ModelIntentStrategy::new(
            completion,
            Arc::new(CompletionRateLimiter::new(permits)),
            4,
            Duration::from_secs(2),
        )
    }

    const FIELD_REPLY: &str = r#"Here you go: {"current_flow": "TASK_CREATION", "intent_type": "FIELD_INPUT",
        "field_mapping": "priority", "extracted_value": "HIGH", "confidence": 0.95,
        "should_continue_flow": true, "next_expected_input": "deadline"}"#;

    #[tokio::test]
    async fn test_classify_parses_reply() {
        let completion = Arc::new(ScriptedCompletion::replying(FIELD_REPLY));
        let s = strategy(completion.clone(), 5);
        let a = s.classify(&ClassificationInput::new("high")).await.unwrap();
        assert_eq!(a.intent_type, ContextIntent::FieldInput);
        assert_eq!(a.tier, ClassifierTier::Model);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_skips_call() {
        let completion = Arc::new(ScriptedCompletion::replying(FIELD_REPLY));
        let s = strategy(completion.clone(), 0);
        let err = s.classify(&ClassificationInput::new("high")).await.unwrap_err();
        assert!(matches!(err, IntentError::RateLimited));
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upstream_error_maps_to_intent_error() {
        let completion = Arc::new(ScriptedCompletion {
            reply: Err("503".to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let err = strategy(completion, 5)
            .classify(&ClassificationInput::new("high"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntentError::Upstream(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_model_times_out() {
        let completion = Arc::new(ScriptedCompletion {
            reply: Ok(FIELD_REPLY.to_string()),
            delay: Duration::from_secs(30),
            calls: AtomicUsize::new(0),
        });
        let err = strategy(completion, 5)
            .classify(&ClassificationInput::new("high"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntentError::Timeout(2)));
    }

    #[tokio::test]
    async fn test_garbage_reply_is_parse_error() {
        let completion = Arc::new(ScriptedCompletion::replying("I am not sure."));
        let err = strategy(completion, 5)
            .classify(&ClassificationInput::new("high"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntentError::Parse(_)));
    }

    #[test]
    fn test_prompt_includes_flow_and_window() {
        let completion = Arc::new(ScriptedCompletion::replying(FIELD_REPLY));
        let s = strategy(completion, 5);
        let history = (0..6)
            .map(|i| ConversationTurn::user(format!("turn {}", i)))
            .collect();
        let input = ClassificationInput::new("HIGH")
            .with_history(history)
            .with_active_flow(Some(ActiveFlow {
                flow: ConversationFlow::TaskCreation,
                flow_type: FlowType::CreateTask,
                waiting_for: Some("priority".to_string()),
                filled_slots: BTreeMap::from([("title".to_string(), "write report".to_string())]),
            }));
        let prompt = s.build_prompt(&input);

        assert!(prompt.contains("Active flow: TASK_CREATION (waiting for: priority; filled: title=write report)"));
        assert!(!prompt.contains("turn 1"));
        assert!(prompt.contains("turn 2"));
        assert!(prompt.contains("turn 5"));
        assert!(prompt.contains("CURRENT MESSAGE: \"HIGH\""));
    }
}
