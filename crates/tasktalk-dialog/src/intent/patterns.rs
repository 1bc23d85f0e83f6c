//! Trigger patterns for the rule-based tier.
//!
//! All patterns are compiled once and matched case-insensitively against the
//! raw message. Vietnamese forms sit next to the English ones.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::time_parser;
use crate::types::Priority;

struct TriggerPatterns {
    create: Vec<Regex>,
    update: Vec<Regex>,
    delete: Vec<Regex>,
    statistics: Vec<Regex>,
    list: Vec<Regex>,
    implicit: Vec<Regex>,
    greeting: Vec<Regex>,
    thanks: Vec<Regex>,
    farewell: Vec<Regex>,
    /// Messages that are nothing but small talk.
    whole_small_talk: Vec<Regex>,
    whole_statistics: Vec<Regex>,
    whole_list: Vec<Regex>,
}

static TRIGGERS: LazyLock<TriggerPatterns> = LazyLock::new(|| {
    let mk = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(p).expect("Invalid trigger regex"))
            .collect()
    };

    TriggerPatterns {
        create: mk(&[
            r"(?i)^\s*(?:(?:please|pls|hey|ok|okay|i\s+want\s+to|i'd\s+like\s+to|let's|lets)\s+)*(?:create|add|make|set\s+up)\s+(?:(?:a|an|one|new|another)\s+)*(?:task|todo|to-do)\b[\s:,-]*(?:(?:to|called|named|titled|for)\s+)?(?P<rest>.*)$",
            r"(?i)^\s*new\s+(?:task|todo)\b[\s:,-]*(?P<rest>.*)$",
            r"(?i)^\s*task\s*:\s*(?P<rest>.+)$",
            r"(?i)^\s*(?:hãy\s+|giúp\s+tôi\s+)?(?:tạo|thêm)\s+(?:(?:một|1|mới)\s+)*(?:task|công\s+việc|nhiệm\s+vụ|việc)\b(?:\s+mới)?[\s:,-]*(?:(?:là|tên\s+là|để)\s+)?(?P<rest>.*)$",
        ]),
        update: mk(&[
            r"(?i)^\s*(?:please\s+)?(?:update|change|edit|modify|set|rename|mark)\s+(?:the\s+)?task\s*#?\s*(?P<id>\d+)?(?P<rest>.*)$",
            r"(?i)^\s*(?:hãy\s+)?(?:cập\s+nhật|sửa|đổi)\s+(?:task|công\s+việc)\s*#?\s*(?P<id>\d+)?(?P<rest>.*)$",
        ]),
        delete: mk(&[
            r"(?i)^\s*(?:please\s+)?(?:delete|remove|drop|erase|cancel)\s+(?:the\s+)?task\s*#?\s*(?P<id>\d+)?",
            r"(?i)^\s*(?:hãy\s+)?(?:xóa|xoá|hủy|huỷ)\s+(?:task|công\s+việc)\s*#?\s*(?P<id>\d+)?",
        ]),
        statistics: mk(&[
            r"(?i)\bhow\s+many\s+tasks\b",
            r"(?i)\b(?:task\s+)?(?:stats|statistics)\b",
            r"(?i)\b(?:summary|overview)\s+of\s+(?:my\s+)?tasks\b",
            r"(?i)\bthống\s+kê\b",
            r"(?i)\bbao\s+nhiêu\s+(?:task|công\s+việc)\b",
        ]),
        list: mk(&[
            r"(?i)\b(?:show|list|display|see|view|get)\s+(?:me\s+)?(?:all\s+)?(?:of\s+)?(?:my\s+)?(?:the\s+)?(?:tasks|todos|to-dos|task\s+list)\b",
            r"(?i)\bwhat\s+(?:are\s+)?(?:my\s+)?tasks\b",
            r"(?i)\bwhat\s+do\s+i\s+have\s+to\s+do\b",
            r"(?i)\b(?:xem|liệt\s+kê|hiển\s+thị)\s+(?:các\s+|tất\s+cả\s+)?(?:task|công\s+việc)\b",
            r"(?i)\bdanh\s+sách\s+(?:task|công\s+việc)\b",
        ]),
        implicit: mk(&[
            r"(?i)^\s*(?:i\s+)?(?:need|have|got|must|should)\s+to\s+(?P<rest>.+)$",
            r"(?i)^\s*(?:can|could|would)\s+you\s+(?:please\s+)?(?:create|add|make|set\s+up)\s+(?:(?:a|an|new)\s+)*(?:task|todo|reminder)?\s*(?:(?:to|for|called|named)\s+)?(?P<rest>.*?)\s*\??$",
            r"(?i)^\s*(?:please\s+)?remind\s+me\s+to\s+(?P<rest>.+)$",
            r"(?i)^\s*don'?t\s+let\s+me\s+forget\s+to\s+(?P<rest>.+)$",
            r"(?i)^\s*(?:tôi\s+)?(?:cần|phải)\s+(?:phải\s+)?(?P<rest>.+)$",
            r"(?i)^\s*(?:bạn\s+)?có\s+thể\s+(?:tạo|thêm)\s+(?:task|công\s+việc)\s*(?P<rest>.*?)\s*(?:không|được\s+không)?\s*\??$",
            r"(?i)^\s*nhắc\s+(?:tôi|mình)\s+(?P<rest>.+)$",
        ]),
        greeting: mk(&[
            r"(?i)^\s*(?:hi|hello|hey|yo|howdy|good\s+(?:morning|afternoon|evening))\b",
            r"(?i)^\s*how\s+are\s+you\b",
            r"(?i)^\s*(?:xin\s+chào|chào)\b",
        ]),
        thanks: mk(&[r"(?i)\b(?:thanks|thank\s+you|thx|cheers|cảm\s+ơn|cám\s+ơn)\b"]),
        farewell: mk(&[r"(?i)\b(?:bye|goodbye|see\s+you|good\s+night|tạm\s+biệt)\b"]),
        whole_small_talk: mk(&[
            r"(?i)^\s*(?:(?:ok|okay|great|cool)\s+)?(?:thanks|thank\s+you|thx|cheers|cảm\s+ơn|cám\s+ơn)(?:\s+(?:a\s+lot|so\s+much|very\s+much|again|bạn|nhé|nhiều))*\s*[.!]*\s*$",
            r"(?i)^\s*(?:(?:ok|okay)\s+)?(?:bye(?:\s+bye)?|goodbye|see\s+you(?:\s+later)?|good\s+night|tạm\s+biệt)\s*[.!]*\s*$",
            r"(?i)^\s*(?:hi|hello|hey|yo|howdy|good\s+(?:morning|afternoon|evening)|xin\s+chào|chào)(?:\s+(?:there|again|bạn))?\s*[.!]*\s*$",
            r"(?i)^\s*how\s+are\s+you(?:\s+doing)?(?:\s+today)?\s*[.!]*\s*$",
        ]),
        whole_statistics: mk(&[
            r"(?i)^\s*(?:(?:show|get)\s+(?:me\s+)?)?(?:my\s+)?(?:task\s+)?(?:stats|statistics)\s*[.!]*\s*$",
            r"(?i)^\s*thống\s+kê(?:\s+(?:task|công\s+việc))?\s*[.!]*\s*$",
        ]),
        whole_list: mk(&[
            r"(?i)^\s*(?:please\s+)?(?:show|list|display|see|view|get)\s+(?:me\s+)?(?:all\s+)?(?:of\s+)?(?:my\s+)?(?:the\s+)?(?:tasks|todos|to-dos|task\s+list)(?:\s+please)?\s*[.!]*\s*$",
            r"(?i)^\s*(?:my\s+)?(?:tasks|task\s+list)\s*[.!]*\s*$",
            r"(?i)^\s*(?:xem|liệt\s+kê|hiển\s+thị)\s+(?:các\s+|tất\s+cả\s+)?(?:task|công\s+việc)\s*[.!]*\s*$",
            r"(?i)^\s*danh\s+sách\s+(?:task|công\s+việc)\s*[.!]*\s*$",
        ]),
    }
});

struct ModifierPatterns {
    embedded_priority: Regex,
    embedded_deadline: Regex,
    update_field: Regex,
    update_value: Regex,
    mark_status: Regex,
    title_lead: Regex,
}

static MODIFIERS: LazyLock<ModifierPatterns> = LazyLock::new(|| ModifierPatterns {
    embedded_priority: Regex::new(
        r"(?i)[,;\s]*\b(?:with\s+)?(?:(?P<a>high|medium|low|urgent)\s+priority|priority\s*(?:is\s+|:\s*|=\s*)?(?P<b>high|medium|low)|ưu\s+tiên\s+(?P<c>cao|trung\s+bình|thấp))\b",
    )
    .expect("Invalid modifier regex"),
    embedded_deadline: Regex::new(
        r"(?i)[,;\s]+(?:due|by|before|until|deadline|hạn|trước)\b[\s:]*(?P<when>.+)$",
    )
    .expect("Invalid modifier regex"),
    update_field: Regex::new(
        r"(?i)\b(title|name|priority|deadline|due\s+date|due|status|description|tên|ưu\s+tiên|hạn|trạng\s+thái|mô\s+tả)\b",
    )
    .expect("Invalid modifier regex"),
    update_value: Regex::new(r"(?i)\b(?:to|thành|là)\s+(?P<value>.+)$")
        .expect("Invalid modifier regex"),
    mark_status: Regex::new(r"(?i)^\s*(?:as\s+)?(?P<value>done|completed|complete|finished|in\s+progress|todo|to\s+do|xong|hoàn\s+thành)\b")
        .expect("Invalid modifier regex"),
    title_lead: Regex::new(r"(?i)^(?:to|called|named|titled|là|tên\s+là)\s+")
        .expect("Invalid modifier regex"),
});

struct PriorityPatterns {
    low: Regex,
    high: Regex,
    medium: Regex,
}

static PRIORITY_WORDS: LazyLock<PriorityPatterns> = LazyLock::new(|| PriorityPatterns {
    // Negated forms first: "not urgent" must never read as HIGH.
    low: Regex::new(
        r"(?i)\b(?:low|lowest|minor|not\s+urgent|not\s+important|whenever|someday|thấp|không\s+gấp|không\s+quan\s+trọng)\b",
    )
    .expect("Invalid priority regex"),
    high: Regex::new(
        r"(?i)\b(?:high|highest|urgent|important|critical|asap|top|cao|gấp|khẩn(?:\s+cấp)?|quan\s+trọng)\b",
    )
    .expect("Invalid priority regex"),
    medium: Regex::new(
        r"(?i)\b(?:medium|normal|moderate|mid|average|regular|trung\s+bình|bình\s+thường)\b",
    )
    .expect("Invalid priority regex"),
});

/// Words that may surround a slot answer without changing it.
const FILLER_WORDS: &[&str] = &[
    "priority", "is", "it", "it's", "its", "make", "set", "to", "please", "the", "a", "by",
    "due", "on", "before", "until", "deadline", "date", "should", "be", "let's", "lets", "say",
    "level", "just", "maybe", "probably", "i", "think", "guess", "ưu", "tiên", "độ", "mức",
    "hạn", "vào", "trước", "nhé", "nha", "đi", "là", "chắc",
];

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCommand {
    pub task_id: Option<String>,
    pub field: Option<&'static str>,
    pub value: Option<String>,
}

/// Remainder after an explicit create trigger, possibly empty.
pub fn explicit_create(text: &str) -> Option<String> {
    capture_rest(&TRIGGERS.create, text)
}

pub fn explicit_update(text: &str) -> Option<UpdateCommand> {
    let caps = TRIGGERS.update.iter().find_map(|r| r.captures(text))?;
    let task_id = caps.name("id").map(|m| m.as_str().to_string());
    let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or_default();

    // "mark task 3 as done"
    if let Some(status) = MODIFIERS.mark_status.captures(rest) {
        return Some(UpdateCommand {
            task_id,
            field: Some("status"),
            value: Some(status["value"].to_string()),
        });
    }

    let field = MODIFIERS
        .update_field
        .captures(rest)
        .and_then(|c| canonical_field(&c[1]));
    let value = MODIFIERS
        .update_value
        .captures(rest)
        .map(|c| clean_fragment(&c["value"]))
        .filter(|v| !v.is_empty());
    Some(UpdateCommand {
        task_id,
        field,
        value,
    })
}

/// Task id after an explicit delete trigger, if the trigger matched.
pub fn explicit_delete(text: &str) -> Option<Option<String>> {
    let caps = TRIGGERS.delete.iter().find_map(|r| r.captures(text))?;
    Some(caps.name("id").map(|m| m.as_str().to_string()))
}

/// Remainder of an indirect request such as "I need to ...".
pub fn implicit_request(text: &str) -> Option<String> {
    capture_rest(&TRIGGERS.implicit, text)
}

fn capture_rest(patterns: &[Regex], text: &str) -> Option<String> {
    let caps = patterns.iter().find_map(|r| r.captures(text))?;
    Some(
        caps.name("rest")
            .map(|m| clean_fragment(m.as_str()))
            .unwrap_or_default(),
    )
}

fn clean_fragment(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ',' | ';'))
        .trim()
        .to_string()
}

/// Map an update field phrase to its canonical name.
pub fn canonical_field(text: &str) -> Option<&'static str> {
    let norm = text.trim().to_lowercase();
    let norm = norm.split_whitespace().collect::<Vec<_>>().join(" ");
    match norm.as_str() {
        "title" | "name" | "tên" | "tiêu đề" => Some("title"),
        "priority" | "ưu tiên" => Some("priority"),
        "deadline" | "due date" | "due" | "hạn" | "hạn chót" => Some("deadline"),
        "status" | "state" | "trạng thái" => Some("status"),
        "description" | "details" | "mô tả" => Some("description"),
        _ => None,
    }
}

// =============================================================================
// Queries and small talk
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTarget {
    Tasks,
    Statistics,
}

impl QueryTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryTarget::Tasks => "tasks",
            QueryTarget::Statistics => "statistics",
        }
    }
}

pub fn query_target(text: &str) -> Option<QueryTarget> {
    if TRIGGERS.statistics.iter().any(|r| r.is_match(text)) {
        Some(QueryTarget::Statistics)
    } else if TRIGGERS.list.iter().any(|r| r.is_match(text)) {
        Some(QueryTarget::Tasks)
    } else {
        None
    }
}

/// Like [`query_target`], but only when the whole message is the request.
/// "show my tasks" qualifies, "review stats report" does not.
pub fn whole_query_target(text: &str) -> Option<QueryTarget> {
    if TRIGGERS.whole_statistics.iter().any(|r| r.is_match(text)) {
        Some(QueryTarget::Statistics)
    } else if TRIGGERS.whole_list.iter().any(|r| r.is_match(text)) {
        Some(QueryTarget::Tasks)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallTalkKind {
    Greeting,
    Thanks,
    Farewell,
}

impl SmallTalkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmallTalkKind::Greeting => "greeting",
            SmallTalkKind::Thanks => "thanks",
            SmallTalkKind::Farewell => "farewell",
        }
    }
}

pub fn small_talk_kind(text: &str) -> Option<SmallTalkKind> {
    if TRIGGERS.thanks.iter().any(|r| r.is_match(text)) {
        Some(SmallTalkKind::Thanks)
    } else if TRIGGERS.farewell.iter().any(|r| r.is_match(text)) {
        Some(SmallTalkKind::Farewell)
    } else if TRIGGERS.greeting.iter().any(|r| r.is_match(text)) {
        Some(SmallTalkKind::Greeting)
    } else {
        None
    }
}

/// Whether the message is small talk and nothing else.
pub fn is_whole_small_talk(text: &str) -> bool {
    TRIGGERS.whole_small_talk.iter().any(|r| r.is_match(text))
}

// =============================================================================
// Slot values
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityMatch {
    pub priority: Priority,
    pub span: Range<usize>,
}

/// Find a priority word, including synonyms such as "urgent" or "gấp".
pub fn find_priority(text: &str) -> Option<PriorityMatch> {
    let words = &*PRIORITY_WORDS;
    [
        (&words.low, Priority::Low),
        (&words.high, Priority::High),
        (&words.medium, Priority::Medium),
    ]
    .into_iter()
    .find_map(|(regex, priority)| {
        regex.find(text).map(|m| PriorityMatch {
            priority,
            span: m.range(),
        })
    })
}

/// Whether `text` is essentially just the match at `span`, give or take a
/// filler word or two ("make it HIGH", "by friday please").
pub fn is_mostly(text: &str, span: &Range<usize>) -> bool {
    let (Some(before), Some(after)) = (text.get(..span.start), text.get(span.end..)) else {
        return false;
    };
    let leftover = format!("{} {}", before, after);
    leftover
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | ':' | ';'))
        .filter(|w| !w.is_empty())
        .filter(|w| !FILLER_WORDS.contains(&w.to_lowercase().as_str()))
        .count()
        <= 1
}

/// A create-command remainder split into title and inline modifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleParts {
    pub title: String,
    pub priority: Option<Priority>,
    pub deadline: Option<NaiveDate>,
}

/// Pull "high priority" and "due friday" style modifiers out of a title.
pub fn split_title_modifiers(remainder: &str, today: NaiveDate) -> TitleParts {
    let mut title = remainder.to_string();
    let mut parts = TitleParts::default();

    let priority = MODIFIERS.embedded_priority.captures(&title).and_then(|caps| {
        let word = ["a", "b", "c"]
            .iter()
            .find_map(|n| caps.name(n))?
            .as_str()
            .to_lowercase();
        let priority = match word.as_str() {
            "urgent" | "cao" => Priority::High,
            "thấp" => Priority::Low,
            "trung bình" => Priority::Medium,
            other => other.parse().ok()?,
        };
        Some((priority, caps.get(0)?.range()))
    });
    if let Some((priority, range)) = priority {
        parts.priority = Some(priority);
        title.replace_range(range, "");
    }

    let deadline = MODIFIERS.embedded_deadline.captures(&title).and_then(|caps| {
        let when = caps.name("when")?.as_str();
        let found = time_parser::find_deadline(when, today).filter(|m| is_mostly(when, &m.span))?;
        Some((found.date, caps.get(0)?.range()))
    });
    if let Some((date, range)) = deadline {
        parts.deadline = Some(date);
        title.replace_range(range, "");
    }

    let title = clean_fragment(&title);
    parts.title = MODIFIERS.title_lead.replace(&title, "").trim().to_string();
    parts
}
