//! Declining-intent detection.
//!
//! A standalone refusal ("cancel", "never mind", "thôi") always declines. A
//! bare negative ("no", "không") declines only when it answers an assistant
//! offer. Questions never decline, and refusal words inside a longer
//! sentence are not refusals.

use serde::Serialize;

use tasktalk_core::lexicon::{self, BARE_NEGATIVES, OFFER_MARKERS, REFUSAL_PHRASES};
use tasktalk_core::Locale;
use tasktalk_retrieval::DecliningAnalysis;

use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineKind {
    /// Abandons an in-progress flow or a pending confirmation.
    TaskDecline,
    GeneralDecline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclineVerdict {
    pub kind: DeclineKind,
    pub matched_phrase: String,
    pub response: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecliningDetector;

impl DecliningDetector {
    pub fn new() -> Self {
        Self
    }

    /// Check `message` against the assistant turn it answers.
    pub fn detect(
        &self,
        message: &str,
        previous_assistant: Option<&str>,
        flow_pending: bool,
        locale: Locale,
    ) -> Option<DeclineVerdict> {
        if lexicon::is_question(message) {
            return None;
        }
        let answers_offer =
            previous_assistant.is_some_and(|text| lexicon::contains_any(text, OFFER_MARKERS));
        let declined = lexicon::is_exactly(message, REFUSAL_PHRASES)
            || (answers_offer && lexicon::is_exactly(message, BARE_NEGATIVES));
        declined.then(|| verdict(lexicon::normalize(message), flow_pending, locale))
    }

    /// Verdict from the retriever's scan of the conversation context.
    pub fn from_analysis(
        &self,
        analysis: &DecliningAnalysis,
        flow_pending: bool,
        locale: Locale,
    ) -> Option<DeclineVerdict> {
        if !analysis.has_decline {
            return None;
        }
        let phrase = analysis.matched_phrase.clone().unwrap_or_default();
        Some(verdict(phrase, flow_pending, locale))
    }
}

fn verdict(matched_phrase: String, flow_pending: bool, locale: Locale) -> DeclineVerdict {
    let (kind, response) = if flow_pending {
        (DeclineKind::TaskDecline, prompts::task_declined(locale))
    } else {
        (DeclineKind::GeneralDecline, prompts::general_declined(locale))
    };
    DeclineVerdict {
        kind,
        matched_phrase,
        response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "It sounds like you want to add a task. Do you want me to create it, or were you just asking?";
    const SLOT_QUESTION: &str = "Which priority: HIGH, MEDIUM or LOW? (say \"skip\" to use MEDIUM)";

    #[test]
    fn test_standalone_refusal_declines() {
        let d = DecliningDetector::new();
        let v = d.detect("Cancel.", Some(SLOT_QUESTION), true, Locale::En).unwrap();
        assert_eq!(v.kind, DeclineKind::TaskDecline);
        assert_eq!(v.matched_phrase, "cancel");

        let v = d.detect("never mind", None, false, Locale::En).unwrap();
        assert_eq!(v.kind, DeclineKind::GeneralDecline);
    }

    #[test]
    fn test_refusal_inside_sentence_is_not_decline() {
        let d = DecliningDetector::new();
        assert!(d
            .detect("cancel my dentist appointment", None, false, Locale::En)
            .is_none());
        assert!(d
            .detect("stop by the post office", Some(SLOT_QUESTION), true, Locale::En)
            .is_none());
    }

    #[test]
    fn test_bare_negative_needs_offer() {
        let d = DecliningDetector::new();
        assert!(d.detect("no", Some(OFFER), true, Locale::En).is_some());
        assert!(d.detect("no", Some(SLOT_QUESTION), true, Locale::En).is_none());
        assert!(d.detect("no", None, false, Locale::En).is_none());
    }

    #[test]
    fn test_questions_never_decline() {
        let d = DecliningDetector::new();
        assert!(d.detect("no?", Some(OFFER), true, Locale::En).is_none());
        assert!(d.detect("cancel?", None, true, Locale::En).is_none());
    }

    #[test]
    fn test_vietnamese_refusals() {
        let d = DecliningDetector::new();
        let v = d.detect("thôi", None, true, Locale::Vi).unwrap();
        assert_eq!(v.response, prompts::task_declined(Locale::Vi));
        assert!(d
            .detect("không", Some("Bạn có muốn mình tạo không?"), true, Locale::Vi)
            .is_some());
        // Skip phrase, not a refusal
        assert!(d.detect("bỏ qua", Some(SLOT_QUESTION), true, Locale::Vi).is_none());
    }

    #[test]
    fn test_from_analysis() {
        let d = DecliningDetector::new();
        let analysis = DecliningAnalysis {
            has_decline: true,
            matched_phrase: Some("forget it".to_string()),
            follows_offer: false,
        };
        let v = d.from_analysis(&analysis, false, Locale::En).unwrap();
        assert_eq!(v.kind, DeclineKind::GeneralDecline);
        assert_eq!(v.matched_phrase, "forget it");
        assert!(d
            .from_analysis(&DecliningAnalysis::default(), true, Locale::En)
            .is_none());
    }
}
