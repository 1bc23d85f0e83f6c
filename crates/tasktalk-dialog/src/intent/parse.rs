//! Parsing of language-model classification replies.
//!
//! The reply must contain one JSON object with the analysis fields. Prose or
//! code fences around the object are tolerated; a missing object, a missing
//! required field or an unknown enum value is an error, never a guess.

use serde::Deserialize;
use serde_json::Value;

use super::model::MODEL_CONFIDENCE_FLOOR;
use crate::error::IntentError;
use crate::types::{slot, ClassifierTier, ContextAnalysis, ContextIntent, ConversationFlow, Priority};

const KNOWN_FIELDS: &[&str] = &[
    slot::TITLE,
    slot::DESCRIPTION,
    slot::PRIORITY,
    slot::DEADLINE,
    slot::TASK_ID,
    slot::FIELD,
    slot::VALUE,
    slot::ADDITIONAL_INFO,
];

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    current_flow: String,
    intent_type: String,
    confidence: Value,
    #[serde(default)]
    field_mapping: Option<String>,
    #[serde(default)]
    extracted_value: Option<Value>,
    #[serde(default)]
    should_continue_flow: Option<bool>,
    #[serde(default)]
    next_expected_input: Option<String>,
    #[serde(default)]
    explicit_trigger: Option<bool>,
    #[serde(default)]
    query: Option<String>,
}

/// Slice of `text` holding the first balanced JSON object.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_model_output(text: &str) -> Result<ContextAnalysis, IntentError> {
    let object = extract_json_object(text)
        .ok_or_else(|| IntentError::Parse("No JSON object in model reply".to_string()))?;
    let raw: RawAnalysis =
        serde_json::from_str(object).map_err(|e| IntentError::Parse(e.to_string()))?;

    let current_flow: ConversationFlow = raw.current_flow.parse().map_err(IntentError::Parse)?;
    let intent_type: ContextIntent = raw.intent_type.parse().map_err(IntentError::Parse)?;
    let confidence = parse_confidence(&raw.confidence)?;

    let field_mapping = non_blank(raw.field_mapping)
        .map(|f| canonical_field_name(&f))
        .transpose()?;
    let extracted_value = raw.extracted_value.and_then(value_to_string);
    let extracted_value = match (field_mapping.as_deref(), extracted_value) {
        (Some(slot::PRIORITY), Some(v)) => Some(
            v.parse::<Priority>()
                .map(|p| p.to_string())
                .unwrap_or(v),
        ),
        (_, v) => v,
    };

    let mut analysis = ContextAnalysis::new(current_flow, intent_type, confidence, ClassifierTier::Model);
    analysis.field_mapping = field_mapping;
    analysis.extracted_value = extracted_value;
    analysis.should_continue_flow = raw
        .should_continue_flow
        .unwrap_or(current_flow.is_task_flow());
    analysis.next_expected_input = non_blank(raw.next_expected_input);

    match raw.explicit_trigger {
        Some(true) => analysis = analysis.with_metadata("trigger", "explicit"),
        Some(false) if intent_type == ContextIntent::TaskCreation => {
            analysis = analysis.with_metadata("trigger", "implicit")
        }
        _ => {}
    }
    if let Some(query) = non_blank(raw.query) {
        match query.to_lowercase().as_str() {
            "tasks" | "list" | "get_tasks" => analysis = analysis.with_metadata("query", "tasks"),
            "statistics" | "stats" | "get_statistics" => {
                analysis = analysis.with_metadata("query", "statistics")
            }
            _ => {}
        }
    }
    Ok(analysis)
}

fn parse_confidence(value: &Value) -> Result<f32, IntentError> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite())
    .ok_or_else(|| IntentError::Parse(format!("Invalid confidence: {}", value)))?;
    Ok((raw as f32).clamp(0.0, 1.0).max(MODEL_CONFIDENCE_FLOOR))
}

fn canonical_field_name(field: &str) -> Result<String, IntentError> {
    let lowered = field.trim().to_lowercase().replace([' ', '-'], "_");
    let name = match lowered.as_str() {
        "taskid" | "id" => slot::TASK_ID,
        "due" | "due_date" | "duedate" => slot::DEADLINE,
        "name" => slot::TITLE,
        "additionalinfo" | "info" => slot::ADDITIONAL_INFO,
        other => KNOWN_FIELDS
            .iter()
            .find(|known| **known == other)
            .copied()
            .ok_or_else(|| IntentError::Parse(format!("Unknown field mapping: {}", field)))?,
    };
    Ok(name.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null") && !v.eq_ignore_ascii_case("none"))
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_with_prose_and_fences() {
        let text = "Sure! ```json\n{\"a\": {\"b\": \"}\"}}\n``` done";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": \"}\"}}"));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{\"unterminated\": 1"), None);
    }

    #[test]
    fn test_extract_json_object_handles_escaped_quotes() {
        let text = r#"{"value": "say \"hi\" {now}"} trailing"#;
        assert_eq!(extract_json_object(text), Some(r#"{"value": "say \"hi\" {now}"}"#));
    }

    #[test]
    fn test_parse_full_reply() {
        let reply = r#"{"current_flow": "task_creation", "intent_type": "FIELD_INPUT",
            "field_mapping": "priority", "extracted_value": "high", "confidence": 0.92,
            "should_continue_flow": true, "next_expected_input": "deadline"}"#;
        let a = parse_model_output(reply).unwrap();
        assert_eq!(a.current_flow, ConversationFlow::TaskCreation);
        assert_eq!(a.intent_type, ContextIntent::FieldInput);
        assert_eq!(a.field_mapping.as_deref(), Some("priority"));
        assert_eq!(a.extracted_value.as_deref(), Some("HIGH"));
        assert_eq!(a.next_expected_input.as_deref(), Some("deadline"));
        assert_eq!(a.tier, ClassifierTier::Model);
        assert!((a.confidence - 0.92).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_is_clamped_and_floored() {
        let low = r#"{"current_flow": "IDLE", "intent_type": "SMALL_TALK", "confidence": 0.1}"#;
        assert!((parse_model_output(low).unwrap().confidence - MODEL_CONFIDENCE_FLOOR).abs() < 1e-6);

        let high = r#"{"current_flow": "IDLE", "intent_type": "SMALL_TALK", "confidence": 7}"#;
        assert!((parse_model_output(high).unwrap().confidence - 1.0).abs() < 1e-6);

        let text = r#"{"current_flow": "IDLE", "intent_type": "SMALL_TALK", "confidence": "0.8"}"#;
        assert!((parse_model_output(text).unwrap().confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_missing_required_field_rejects() {
        let reply = r#"{"current_flow": "IDLE", "confidence": 0.9}"#;
        assert!(matches!(parse_model_output(reply), Err(IntentError::Parse(_))));
    }

    #[test]
    fn test_unknown_enum_value_rejects() {
        let reply = r#"{"current_flow": "TASK_ARCHIVE", "intent_type": "SMALL_TALK", "confidence": 0.9}"#;
        assert!(matches!(parse_model_output(reply), Err(IntentError::Parse(_))));

        let reply = r#"{"current_flow": "IDLE", "intent_type": "SMALL_TALK", "confidence": 0.9,
            "field_mapping": "colour"}"#;
        assert!(matches!(parse_model_output(reply), Err(IntentError::Parse(_))));
    }

    #[test]
    fn test_non_json_reply_rejects() {
        assert!(matches!(
            parse_model_output("I think the user wants a task."),
            Err(IntentError::Parse(_))
        ));
    }

    #[test]
    fn test_null_fields_and_numeric_values() {
        let reply = r#"{"current_flow": "TASK_DELETION", "intent_type": "FIELD_INPUT",
            "field_mapping": "taskId", "extracted_value": 12, "confidence": 0.9,
            "next_expected_input": null}"#;
        let a = parse_model_output(reply).unwrap();
        assert_eq!(a.field_mapping.as_deref(), Some("task_id"));
        assert_eq!(a.extracted_value.as_deref(), Some("12"));
        assert!(a.next_expected_input.is_none());
        assert!(a.should_continue_flow);
    }

    #[test]
    fn test_trigger_and_query_metadata() {
        let reply = r#"{"current_flow": "TASK_CREATION", "intent_type": "TASK_CREATION",
            "field_mapping": "title", "extracted_value": "call the bank", "confidence": 0.8,
            "explicit_trigger": false}"#;
        assert!(parse_model_output(reply).unwrap().is_implicit());

        let reply = r#"{"current_flow": "TASK_QUERY", "intent_type": "CLARIFICATION",
            "confidence": 0.8, "query": "stats"}"#;
        assert_eq!(parse_model_output(reply).unwrap().query_target(), Some("statistics"));
    }
}
