//! Conversational vocabulary shared by the retriever and the dialog engine.
//!
//! Phrases are stored pre-normalized (lowercase, no trailing punctuation) and
//! compared against [`normalize`]d input. English and Vietnamese entries live
//! side by side; matching never depends on the detected locale.

/// Standalone refusals. A message that is exactly one of these cancels.
pub const REFUSAL_PHRASES: &[&str] = &[
    "cancel",
    "cancel it",
    "cancel that",
    "stop",
    "stop it",
    "abort",
    "never mind",
    "nevermind",
    "forget it",
    "forget about it",
    "no thanks",
    "no thank you",
    "don't bother",
    "dont bother",
    "hủy",
    "huỷ",
    "hủy bỏ",
    "thôi",
    "thôi khỏi",
    "không cần",
    "không cần đâu",
];

/// Bare negatives. They only decline when answering an offer.
pub const BARE_NEGATIVES: &[&str] = &["no", "nope", "nah", "not really", "không", "ko"];

/// Markers of an assistant turn that offers to do something.
pub const OFFER_MARKERS: &[&str] = &[
    "would you like",
    "do you want",
    "shall i",
    "should i",
    "want me to",
    "bạn có muốn",
    "có muốn",
    "tôi có nên",
];

/// Short affirmatives and "execute now" requests.
pub const AFFIRMATIVES: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "ok",
    "okay",
    "sure",
    "confirm",
    "confirmed",
    "do it",
    "go ahead",
    "create it",
    "create it now",
    "just create it",
    "that's all",
    "thats all",
    "done",
    "có",
    "ừ",
    "đồng ý",
    "được",
    "tạo luôn",
    "tạo đi",
];

/// Answers that skip an optional slot.
pub const SKIP_PHRASES: &[&str] = &[
    "skip",
    "skip it",
    "none",
    "no deadline",
    "no due date",
    "no priority",
    "n/a",
    "bỏ qua",
    "không có",
    "khỏi",
];

const QUESTION_OPENERS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "can you", "could you", "do you",
    "does", "is", "are", "gì", "sao", "tại sao", "thế nào", "bao nhiêu", "làm sao",
];

const QUESTION_ENDINGS: &[&str] = &["không", "chưa", "gì", "sao", "nào"];

/// Lowercase, trim, collapse whitespace and drop trailing punctuation.
pub fn normalize(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ',' | ';' | '…'))
        .trim()
        .to_string()
}

/// Whether `text` is phrased as a question.
pub fn is_question(text: &str) -> bool {
    if text.trim_end().ends_with('?') {
        return true;
    }
    let norm = normalize(text);
    QUESTION_OPENERS
        .iter()
        .any(|opener| starts_with_word(&norm, opener))
        || (norm.contains(' ')
            && QUESTION_ENDINGS
                .iter()
                .any(|ending| norm.ends_with(&format!(" {}", ending))))
}

/// Whether `norm` opens with `word` as a whole word: "what's" counts for
/// "what", "whole" does not count for "who".
fn starts_with_word(norm: &str, word: &str) -> bool {
    norm.strip_prefix(word)
        .is_some_and(|rest| rest.chars().next().is_none_or(|c| !c.is_alphanumeric()))
}

/// Whether the normalized form of `text` equals one of `phrases`.
pub fn is_exactly(text: &str, phrases: &[&str]) -> bool {
    let norm = normalize(text);
    phrases.iter().any(|p| *p == norm)
}

/// Whether the normalized form of `text` contains one of `phrases`.
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    let norm = normalize(text);
    phrases.iter().any(|p| norm.contains(p))
}
