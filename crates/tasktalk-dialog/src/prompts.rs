//! User-facing phrasing, in English and Vietnamese.
//!
//! Slot questions deliberately avoid offer wording ("do you want", "should
//! I"), so a bare "no" after one of them is an answer, not a refusal.

use tasktalk_core::Locale;

use crate::types::slot;

pub fn slot_label(slot_name: &str, locale: Locale) -> &'static str {
    match (locale, slot_name) {
        (Locale::En, slot::TITLE) => "title",
        (Locale::En, slot::DESCRIPTION) => "description",
        (Locale::En, slot::PRIORITY) => "priority",
        (Locale::En, slot::DEADLINE) => "deadline",
        (Locale::En, slot::TASK_ID) => "task number",
        (Locale::En, slot::FIELD) => "field",
        (Locale::En, slot::VALUE) => "value",
        (Locale::En, _) => "detail",
        (Locale::Vi, slot::TITLE) => "tên công việc",
        (Locale::Vi, slot::DESCRIPTION) => "mô tả",
        (Locale::Vi, slot::PRIORITY) => "mức ưu tiên",
        (Locale::Vi, slot::DEADLINE) => "hạn chót",
        (Locale::Vi, slot::TASK_ID) => "số công việc",
        (Locale::Vi, slot::FIELD) => "thông tin",
        (Locale::Vi, slot::VALUE) => "giá trị",
        (Locale::Vi, _) => "thông tin",
    }
}

pub fn slot_question(slot_name: &str, locale: Locale) -> String {
    let text = match (locale, slot_name) {
        (Locale::En, slot::TITLE) => "What should the task be called?",
        (Locale::En, slot::DESCRIPTION) => "Any details to add to the description?",
        (Locale::En, slot::PRIORITY) => {
            "Which priority: HIGH, MEDIUM or LOW? (say \"skip\" to use MEDIUM)"
        }
        (Locale::En, slot::DEADLINE) => {
            "When is it due? For example \"tomorrow\", \"friday\" or YYYY-MM-DD (say \"skip\" for no deadline)"
        }
        (Locale::En, slot::TASK_ID) => "Which task? Please give me its number.",
        (Locale::En, slot::FIELD) => {
            "Which field needs changing: title, priority, deadline or status?"
        }
        (Locale::En, slot::VALUE) => "What is the new value?",
        (Locale::Vi, slot::TITLE) => "Công việc tên là gì?",
        (Locale::Vi, slot::DESCRIPTION) => "Bạn có thêm mô tả gì không?",
        (Locale::Vi, slot::PRIORITY) => {
            "Mức ưu tiên là gì: HIGH, MEDIUM hay LOW? (nói \"bỏ qua\" để dùng MEDIUM)"
        }
        (Locale::Vi, slot::DEADLINE) => {
            "Hạn chót là khi nào? Ví dụ \"ngày mai\", \"thứ sáu\" hoặc YYYY-MM-DD (nói \"bỏ qua\" nếu không có hạn)"
        }
        (Locale::Vi, slot::TASK_ID) => "Công việc nào? Cho mình số thứ tự nhé.",
        (Locale::Vi, slot::FIELD) => "Cần đổi thông tin nào: tên, ưu tiên, hạn hay trạng thái?",
        (Locale::Vi, slot::VALUE) => "Giá trị mới là gì?",
        (Locale::En, other) => return format!("Could you tell me the {}?", other),
        (Locale::Vi, other) => return format!("Cho mình biết {} nhé?", other),
    };
    text.to_string()
}

/// Re-ask after an answer that could not be used.
pub fn invalid_answer(slot_name: &str, locale: Locale) -> String {
    let label = slot_label(slot_name, locale);
    match locale {
        Locale::En => format!(
            "Sorry, that doesn't look like a valid {}. {}",
            label,
            slot_question(slot_name, locale)
        ),
        Locale::Vi => format!(
            "Xin lỗi, {} chưa hợp lệ. {}",
            label,
            slot_question(slot_name, locale)
        ),
    }
}

/// Nudge back to the pending question after an off-topic answer.
pub fn flow_reminder(question: &str, locale: Locale) -> String {
    match locale {
        Locale::En => format!("Back to your task: {}", question),
        Locale::Vi => format!("Quay lại công việc nhé: {}", question),
    }
}

// =============================================================================
// Confirmation
// =============================================================================

pub fn confirmation_offer(candidate_title: Option<&str>, locale: Locale) -> String {
    match (locale, candidate_title) {
        (Locale::En, Some(title)) => format!(
            "It sounds like you want to add a task \"{}\". Do you want me to create it, or were you just asking?",
            title
        ),
        (Locale::En, None) => "It sounds like you want to add a task. Do you want me to create it, or were you just asking?".to_string(),
        (Locale::Vi, Some(title)) => format!(
            "Có vẻ bạn muốn thêm công việc \"{}\". Bạn có muốn mình tạo không, hay bạn chỉ hỏi thôi?",
            title
        ),
        (Locale::Vi, None) => "Có vẻ bạn muốn thêm một công việc. Bạn có muốn mình tạo không, hay bạn chỉ hỏi thôi?".to_string(),
    }
}

pub fn confirmation_title_question(locale: Locale) -> String {
    match locale {
        Locale::En => "Great. What should the task be called?".to_string(),
        Locale::Vi => "Tuyệt. Công việc tên là gì?".to_string(),
    }
}

pub fn confirmation_reask(locale: Locale) -> String {
    match locale {
        Locale::En => "Just to check: should I create the task? Please answer yes or no.".to_string(),
        Locale::Vi => "Cho mình hỏi lại: bạn có muốn mình tạo công việc không? Trả lời có hoặc không nhé.".to_string(),
    }
}

pub fn capability_answer(locale: Locale) -> String {
    match locale {
        Locale::En => "No problem. I can create, update, delete and list your tasks, and show task statistics. Just tell me what you need.".to_string(),
        Locale::Vi => "Không sao. Mình có thể tạo, sửa, xóa, liệt kê công việc và thống kê cho bạn. Cần gì cứ nói nhé.".to_string(),
    }
}

// =============================================================================
// Declines and small talk
// =============================================================================

pub fn task_declined(locale: Locale) -> String {
    match locale {
        Locale::En => "Okay, I've cancelled that. Let me know if you need anything else.".to_string(),
        Locale::Vi => "Được rồi, mình đã hủy. Cần gì cứ nói nhé.".to_string(),
    }
}

pub fn general_declined(locale: Locale) -> String {
    match locale {
        Locale::En => "Okay, no problem. Let me know if you need anything else.".to_string(),
        Locale::Vi => "Được rồi, không sao. Cần gì cứ nói nhé.".to_string(),
    }
}

pub fn greeting(locale: Locale) -> String {
    match locale {
        Locale::En => "Hi! I can help you keep track of tasks. Try \"create a task to ...\".".to_string(),
        Locale::Vi => "Chào bạn! Mình giúp bạn quản lý công việc. Thử nói \"tạo công việc ...\" nhé.".to_string(),
    }
}

pub fn thanks_reply(locale: Locale) -> String {
    match locale {
        Locale::En => "You're welcome!".to_string(),
        Locale::Vi => "Không có gì!".to_string(),
    }
}

pub fn farewell(locale: Locale) -> String {
    match locale {
        Locale::En => "Goodbye! Your tasks will be here when you come back.".to_string(),
        Locale::Vi => "Tạm biệt! Công việc của bạn vẫn ở đây khi bạn quay lại.".to_string(),
    }
}

pub fn general_help(locale: Locale) -> String {
    match locale {
        Locale::En => "I'm here to help with your tasks. You can create, update, delete or list them, or ask for statistics.".to_string(),
        Locale::Vi => "Mình ở đây để giúp bạn quản lý công việc: tạo, sửa, xóa, liệt kê hoặc xem thống kê.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tasktalk_core::lexicon::{self, OFFER_MARKERS};

    use super::*;

    const ALL_SLOTS: &[&str] = &[
        slot::TITLE,
        slot::DESCRIPTION,
        slot::PRIORITY,
        slot::DEADLINE,
        slot::TASK_ID,
        slot::FIELD,
        slot::VALUE,
    ];

    #[test]
    fn test_slot_questions_are_not_offers() {
        for locale in [Locale::En, Locale::Vi] {
            for name in ALL_SLOTS {
                let q = slot_question(name, locale);
                assert!(
                    !lexicon::contains_any(&q, OFFER_MARKERS),
                    "slot question reads as an offer: {}",
                    q
                );
                let r = flow_reminder(&q, locale);
                assert!(!lexicon::contains_any(&r, OFFER_MARKERS));
            }
        }
    }

    #[test]
    fn test_confirmation_prompts_are_offers() {
        for locale in [Locale::En, Locale::Vi] {
            assert!(lexicon::contains_any(
                &confirmation_offer(Some("call the bank"), locale),
                OFFER_MARKERS
            ));
            assert!(lexicon::contains_any(&confirmation_reask(locale), OFFER_MARKERS));
        }
    }

    #[test]
    fn test_offer_mentions_candidate_and_just_asking() {
        let text = confirmation_offer(Some("call the bank"), Locale::En);
        assert!(text.contains("\"call the bank\""));
        assert!(text.contains("Do you want me to create it, or were you just asking?"));
    }

    #[test]
    fn test_invalid_answer_repeats_question() {
        let text = invalid_answer(slot::PRIORITY, Locale::En);
        assert!(text.starts_with("Sorry, that doesn't look like a valid priority."));
        assert!(text.contains("HIGH, MEDIUM or LOW"));
    }

    #[test]
    fn test_unknown_slot_question() {
        assert_eq!(slot_question("color", Locale::En), "Could you tell me the color?");
    }
}
