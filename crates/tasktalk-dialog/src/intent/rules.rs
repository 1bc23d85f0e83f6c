//! Rule-based classification tier.
//!
//! Ordered pattern rules; the first that applies wins. This tier never
//! fails and its confidence never exceeds [`FALLBACK_CONFIDENCE_CAP`].

use async_trait::async_trait;
use chrono::{Local, NaiveDate};

use tasktalk_core::lexicon::{self, AFFIRMATIVES};

use super::mapping::SLOT_PREFIX;
use super::patterns::{self, TitleParts};
use super::time_parser;
use super::{ActiveFlow, ClassificationInput, IntentStrategy};
use crate::error::IntentError;
use crate::types::{slot, ClassifierTier, ContextAnalysis, ContextIntent, ConversationFlow};

pub const FALLBACK_CONFIDENCE_CAP: f32 = 0.70;

const EXPLICIT: f32 = 0.70;
const EXPLICIT_BARE: f32 = 0.65;
const PRIORITY_INPUT: f32 = 0.65;
const DATE_INPUT: f32 = 0.65;
const CONFIRMATION: f32 = 0.65;
const QUERY: f32 = 0.60;
const OFFTOPIC: f32 = 0.55;
const IMPLICIT: f32 = 0.50;
const CATCH_ALL: f32 = 0.40;
const SMALL_TALK: f32 = 0.30;

#[derive(Debug, Clone, Default)]
pub struct RuleBasedStrategy {
    today: Option<NaiveDate>,
}

impl RuleBasedStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the date relative deadlines resolve against.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn analyze(&self, input: &ClassificationInput) -> ContextAnalysis {
        let message = input.message.trim();
        let active = input
            .effective_flow()
            .filter(|a| a.flow.is_task_flow());

        let mut analysis = self
            .explicit_command(message)
            .or_else(|| active.as_ref().map(|a| self.in_flow(message, a)))
            .or_else(|| query(message))
            .or_else(|| self.implicit(message))
            .unwrap_or_else(|| small_talk(message));
        analysis.confidence = analysis.confidence.min(FALLBACK_CONFIDENCE_CAP);
        analysis
    }

    // -------------------------------------------------------------------------
    // Explicit triggers
    // -------------------------------------------------------------------------

    fn explicit_command(&self, message: &str) -> Option<ContextAnalysis> {
        if let Some(id) = patterns::explicit_delete(message) {
            let mut a = command(ConversationFlow::TaskDeletion, id.is_some());
            if let Some(id) = id {
                a = a.with_field(slot::TASK_ID, id);
            }
            return Some(a);
        }

        if let Some(cmd) = patterns::explicit_update(message) {
            let mut a = command(ConversationFlow::TaskUpdate, cmd.task_id.is_some());
            if let Some(id) = cmd.task_id {
                a = a.with_field(slot::TASK_ID, id);
            }
            if let Some(field) = cmd.field {
                a = a.with_metadata(&format!("{}{}", SLOT_PREFIX, slot::FIELD), field);
            }
            if let Some(value) = cmd.value {
                a = a.with_metadata(&format!("{}{}", SLOT_PREFIX, slot::VALUE), value);
            }
            return Some(a);
        }

        if let Some(rest) = patterns::explicit_create(message) {
            return Some(self.creation(rest, "explicit", EXPLICIT, EXPLICIT_BARE));
        }
        None
    }

    fn creation(&self, rest: String, trigger: &str, titled: f32, bare: f32) -> ContextAnalysis {
        let TitleParts {
            title,
            priority,
            deadline,
        } = patterns::split_title_modifiers(&rest, self.today());

        let has_title = !title.is_empty() && !lexicon::is_question(&title);
        let mut a = ContextAnalysis::new(
            ConversationFlow::TaskCreation,
            ContextIntent::TaskCreation,
            if has_title { titled } else { bare },
            ClassifierTier::Fallback,
        )
        .with_metadata("trigger", trigger);
        if has_title {
            a = a.with_field(slot::TITLE, title);
        }
        if let Some(p) = priority {
            a = a.with_metadata(&format!("{}{}", SLOT_PREFIX, slot::PRIORITY), p.to_string());
        }
        if let Some(d) = deadline {
            a = a.with_metadata(
                &format!("{}{}", SLOT_PREFIX, slot::DEADLINE),
                d.format("%Y-%m-%d").to_string(),
            );
        }
        a
    }

    // -------------------------------------------------------------------------
    // Active flow
    // -------------------------------------------------------------------------

    fn in_flow(&self, message: &str, active: &ActiveFlow) -> ContextAnalysis {
        let flow = active.flow;
        let waiting = active.waiting_for.clone();
        let field_input = |field: &str, value: String, confidence: f32| {
            ContextAnalysis::new(flow, ContextIntent::FieldInput, confidence, ClassifierTier::Fallback)
                .with_field(field, value)
                .expecting(waiting.clone())
        };

        let awaiting_value = waiting.as_deref() == Some(slot::VALUE);

        if flow == ConversationFlow::TaskCreation {
            if let Some(m) = patterns::find_priority(message).filter(|m| patterns::is_mostly(message, &m.span)) {
                return field_input(slot::PRIORITY, m.priority.to_string(), PRIORITY_INPUT);
            }
        }

        if !awaiting_value {
            if let Some(m) = time_parser::find_deadline(message, self.today())
                .filter(|m| patterns::is_mostly(message, &m.span))
            {
                return field_input(
                    slot::DEADLINE,
                    m.date.format("%Y-%m-%d").to_string(),
                    DATE_INPUT,
                );
            }

            if lexicon::is_exactly(message, AFFIRMATIVES) && active.filled_count() >= 1 {
                return ContextAnalysis::new(
                    flow,
                    ContextIntent::Confirmation,
                    CONFIRMATION,
                    ClassifierTier::Fallback,
                )
                .expecting(waiting.clone());
            }
        }

        // Free-text answers may contain "stats" or "thank you"; only a whole
        // small-talk or query phrase leaves the flow there.
        let free_text = waiting.as_deref().is_some_and(slot::is_free_text);
        let query_target = patterns::query_target(message);
        let aside = if free_text {
            patterns::is_whole_small_talk(message) || patterns::whole_query_target(message).is_some()
        } else {
            patterns::small_talk_kind(message).is_some() || query_target.is_some()
        };
        if lexicon::is_question(message) || aside {
            let mut a = ContextAnalysis::new(flow, ContextIntent::Offtopic, OFFTOPIC, ClassifierTier::Fallback)
                .expecting(waiting.clone());
            a.should_continue_flow = true;
            if let Some(target) = query_target {
                a = a.with_metadata("query", target.as_str());
            }
            return a;
        }

        let field = waiting.as_deref().unwrap_or(slot::ADDITIONAL_INFO);
        field_input(field, message.to_string(), CATCH_ALL)
    }

    fn implicit(&self, message: &str) -> Option<ContextAnalysis> {
        let rest = patterns::implicit_request(message)?;
        Some(self.creation(rest, "implicit", IMPLICIT, IMPLICIT))
    }
}

fn command(flow: ConversationFlow, has_target: bool) -> ContextAnalysis {
    ContextAnalysis::new(
        flow,
        ContextIntent::TaskCreation,
        if has_target { EXPLICIT } else { EXPLICIT_BARE },
        ClassifierTier::Fallback,
    )
    .with_metadata("trigger", "explicit")
}

fn query(message: &str) -> Option<ContextAnalysis> {
    let target = patterns::query_target(message)?;
    Some(
        ContextAnalysis::new(
            ConversationFlow::TaskQuery,
            ContextIntent::Clarification,
            QUERY,
            ClassifierTier::Fallback,
        )
        .with_metadata("query", target.as_str()),
    )
}

fn small_talk(message: &str) -> ContextAnalysis {
    let a = ContextAnalysis::new(
        ConversationFlow::Idle,
        ContextIntent::SmallTalk,
        SMALL_TALK,
        ClassifierTier::Fallback,
    );
    match patterns::small_talk_kind(message) {
        Some(kind) => a.with_metadata("small_talk", kind.as_str()),
        None => a,
    }
}

#[async_trait]
impl IntentStrategy for RuleBasedStrategy {
    fn tier(&self) -> ClassifierTier {
        ClassifierTier::Fallback
    }

    async fn classify(&self, input: &ClassificationInput) -> Result<ContextAnalysis, IntentError> {
        Ok(self.analyze(input))
    }
}
