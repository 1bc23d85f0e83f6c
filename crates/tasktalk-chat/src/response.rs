//! Reply text for executed actions, answers and failures.
//!
//! Everything is template-based; no language model is involved in wording a
//! reply.

use std::fmt::Write as _;

use tasktalk_core::Locale;
use tasktalk_dialog::prompts;
use tasktalk_dialog::{TaskRecord, TaskStatistics, ToolError, ToolOutput};
use tasktalk_retrieval::RagContext;

/// Tasks listed in full before the reply is summarized.
const DEFAULT_MAX_LISTED: usize = 10;

/// Knowledge answers below this context quality are not trusted.
const MIN_ANSWER_QUALITY: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct ResponseComposer {
    max_listed: usize,
}

impl Default for ResponseComposer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LISTED)
    }
}

impl ResponseComposer {
    pub fn new(max_listed: usize) -> Self {
        Self {
            max_listed: max_listed.max(1),
        }
    }

    // =========================================================================
    // Actions
    // =========================================================================

    pub fn tool_result(&self, output: &Result<ToolOutput, ToolError>, locale: Locale) -> String {
        match output {
            Ok(ToolOutput::Created(task)) => match locale {
                Locale::En => format!("Done! I created task #{}: {}.", task.id, describe(task, locale)),
                Locale::Vi => format!("Xong! Đã tạo công việc #{}: {}.", task.id, describe(task, locale)),
            },
            Ok(ToolOutput::Updated(task)) => match locale {
                Locale::En => format!("Updated task #{}: {}.", task.id, describe(task, locale)),
                Locale::Vi => format!("Đã cập nhật công việc #{}: {}.", task.id, describe(task, locale)),
            },
            Ok(ToolOutput::Deleted(task)) => match locale {
                Locale::En => format!("Deleted task #{} \"{}\".", task.id, task.title),
                Locale::Vi => format!("Đã xóa công việc #{} \"{}\".", task.id, task.title),
            },
            Ok(ToolOutput::Listed(tasks)) => self.task_list(tasks, locale),
            Ok(ToolOutput::Statistics(stats)) => statistics(stats, locale),
            Err(err) => tool_error(err, locale),
        }
    }

    fn task_list(&self, tasks: &[TaskRecord], locale: Locale) -> String {
        if tasks.is_empty() {
            return match locale {
                Locale::En => "You have no tasks yet.".to_string(),
                Locale::Vi => "Bạn chưa có công việc nào.".to_string(),
            };
        }
        let mut text = match locale {
            Locale::En => format!("You have {} task(s):", tasks.len()),
            Locale::Vi => format!("Bạn có {} công việc:", tasks.len()),
        };
        for task in tasks.iter().take(self.max_listed) {
            let _ = write!(text, "\n#{} {}", task.id, describe(task, locale));
        }
        let hidden = tasks.len().saturating_sub(self.max_listed);
        if hidden > 0 {
            let _ = match locale {
                Locale::En => write!(text, "\n...and {} more.", hidden),
                Locale::Vi => write!(text, "\n...và {} công việc khác.", hidden),
            };
        }
        text
    }

    // =========================================================================
    // Conversation
    // =========================================================================

    /// Answer for a message that is not a task command.
    pub fn conversational(&self, small_talk: Option<&str>, context: &RagContext, locale: Locale) -> String {
        match small_talk {
            Some("greeting") => prompts::greeting(locale),
            Some("thanks") => prompts::thanks_reply(locale),
            Some("farewell") => prompts::farewell(locale),
            _ => self.knowledge_answer(context, locale),
        }
    }

    /// Best retrieved answer, or the generic help text.
    pub fn knowledge_answer(&self, context: &RagContext, locale: Locale) -> String {
        match context.best_answer() {
            Some(answer) if context.context_quality >= MIN_ANSWER_QUALITY => answer.to_string(),
            _ => prompts::general_help(locale),
        }
    }

    /// `answer` followed by the reminder of the pending question.
    pub fn with_reminder(&self, answer: &str, pending_question: Option<&str>, locale: Locale) -> String {
        match pending_question {
            Some(question) => format!("{}\n\n{}", answer, prompts::flow_reminder(question, locale)),
            None => answer.to_string(),
        }
    }

    pub fn empty_message(&self, locale: Locale) -> String {
        match locale {
            Locale::En => "I didn't catch that. What would you like to do?".to_string(),
            Locale::Vi => "Mình chưa nghe rõ. Bạn muốn làm gì?".to_string(),
        }
    }

    pub fn message_too_long(&self, max: usize, locale: Locale) -> String {
        match locale {
            Locale::En => format!("That message is too long. Please keep it under {} characters.", max),
            Locale::Vi => format!("Tin nhắn quá dài. Vui lòng giữ dưới {} ký tự.", max),
        }
    }

    pub fn apology(&self, locale: Locale) -> String {
        match locale {
            Locale::En => "Sorry, something went wrong on my side. Please try again.".to_string(),
            Locale::Vi => "Xin lỗi, đã có lỗi xảy ra. Bạn thử lại nhé.".to_string(),
        }
    }
}

fn describe(task: &TaskRecord, locale: Locale) -> String {
    let deadline = match (task.deadline, locale) {
        (Some(d), Locale::En) => format!("due {}", d.format("%Y-%m-%d")),
        (Some(d), Locale::Vi) => format!("hạn {}", d.format("%Y-%m-%d")),
        (None, Locale::En) => "no deadline".to_string(),
        (None, Locale::Vi) => "không có hạn".to_string(),
    };
    format!("\"{}\" [{}, {}, {}]", task.title, task.priority, task.status, deadline)
}

fn statistics(stats: &TaskStatistics, locale: Locale) -> String {
    if stats.total == 0 {
        return match locale {
            Locale::En => "You have no tasks yet.".to_string(),
            Locale::Vi => "Bạn chưa có công việc nào.".to_string(),
        };
    }
    let count = |map: &std::collections::BTreeMap<String, usize>, key: &str| {
        map.get(key).copied().unwrap_or(0)
    };
    match locale {
        Locale::En => format!(
            "You have {} task(s): {} to do, {} in progress, {} done. Priority: {} high, {} medium, {} low. Overdue: {}.",
            stats.total,
            count(&stats.by_status, "TODO"),
            count(&stats.by_status, "IN_PROGRESS"),
            count(&stats.by_status, "DONE"),
            count(&stats.by_priority, "HIGH"),
            count(&stats.by_priority, "MEDIUM"),
            count(&stats.by_priority, "LOW"),
            stats.overdue
        ),
        Locale::Vi => format!(
            "Bạn có {} công việc: {} chưa làm, {} đang làm, {} đã xong. Ưu tiên: {} cao, {} trung bình, {} thấp. Quá hạn: {}.",
            stats.total,
            count(&stats.by_status, "TODO"),
            count(&stats.by_status, "IN_PROGRESS"),
            count(&stats.by_status, "DONE"),
            count(&stats.by_priority, "HIGH"),
            count(&stats.by_priority, "MEDIUM"),
            count(&stats.by_priority, "LOW"),
            stats.overdue
        ),
    }
}

fn tool_error(err: &ToolError, locale: Locale) -> String {
    match (err, locale) {
        (ToolError::NotFound(id), Locale::En) => format!("I couldn't find task #{}.", id.trim_start_matches('#')),
        (ToolError::NotFound(id), Locale::Vi) => {
            format!("Mình không tìm thấy công việc #{}.", id.trim_start_matches('#'))
        }
        (ToolError::InvalidParameters(msg), Locale::En) => format!("I couldn't do that: {}.", msg),
        (ToolError::InvalidParameters(msg), Locale::Vi) => format!("Mình không làm được: {}.", msg),
        (ToolError::NotExecutable(_), _) => prompts::general_help(locale),
        (ToolError::Backend(_), Locale::En) => {
            "Sorry, the task service is unavailable right now. Please try again shortly.".to_string()
        }
        (ToolError::Backend(_), Locale::Vi) => {
            "Xin lỗi, dịch vụ công việc đang tạm thời không khả dụng. Bạn thử lại sau nhé.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use chrono::NaiveDate;
    use serde_json::json;
    use tasktalk_core::Timestamp;
    use tasktalk_dialog::{ActionKind, Priority, TaskStatus};
    use tasktalk_retrieval::{DocumentSource, RetrievedDocument};

    use super::*;

    fn task(id: &str, title: &str) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            owner: "u1".to_string(),
            title: title.to_string(),
            description: None,
            priority: Priority::High,
            deadline: NaiveDate::from_ymd_opt(2026, 10, 16),
            status: TaskStatus::Todo,
            created_at: Timestamp(0),
            updated_at: Timestamp(0),
        }
    }

    fn context_with_answer(quality: f32) -> RagContext {
        let mut context = RagContext::empty("how do I add a task");
        context.relevant_documents.push(RetrievedDocument {
            id: "kb-1".to_string(),
            content: "Say \"create task\" followed by a title.".to_string(),
            similarity: quality,
            source: DocumentSource::KnowledgeCache,
            metadata: json!({}),
        });
        context.context_quality = quality;
        context.retrieval_time = Duration::from_millis(3);
        context
    }

    #[test]
    fn test_created_reply() {
        let text = ResponseComposer::default()
            .tool_result(&Ok(ToolOutput::Created(task("1", "write report"))), Locale::En);
        assert_eq!(
            text,
            "Done! I created task #1: \"write report\" [HIGH, TODO, due 2026-10-16]."
        );
    }

    #[test]
    fn test_list_is_truncated() {
        let tasks: Vec<_> = (1..=4).map(|i| task(&i.to_string(), "t")).collect();
        let text = ResponseComposer::new(2).tool_result(&Ok(ToolOutput::Listed(tasks)), Locale::En);
        assert!(text.starts_with("You have 4 task(s):"));
        assert!(text.contains("#2 "));
        assert!(!text.contains("#3 "));
        assert!(text.ends_with("...and 2 more."));
    }

    #[test]
    fn test_empty_list_and_statistics() {
        let composer = ResponseComposer::default();
        assert_eq!(
            composer.tool_result(&Ok(ToolOutput::Listed(vec![])), Locale::En),
            "You have no tasks yet."
        );
        assert_eq!(
            composer.tool_result(&Ok(ToolOutput::Statistics(TaskStatistics::default())), Locale::Vi),
            "Bạn chưa có công việc nào."
        );
    }

    #[test]
    fn test_statistics_reply() {
        let stats = TaskStatistics {
            total: 3,
            by_status: BTreeMap::from([("TODO".to_string(), 2), ("DONE".to_string(), 1)]),
            by_priority: BTreeMap::from([("HIGH".to_string(), 3)]),
            overdue: 1,
        };
        let text = ResponseComposer::default().tool_result(&Ok(ToolOutput::Statistics(stats)), Locale::En);
        assert!(text.contains("3 task(s): 2 to do, 0 in progress, 1 done"));
        assert!(text.ends_with("Overdue: 1."));
    }

    #[test]
    fn test_tool_errors() {
        let composer = ResponseComposer::default();
        assert_eq!(
            composer.tool_result(&Err(ToolError::NotFound("#9".to_string())), Locale::En),
            "I couldn't find task #9."
        );
        assert!(composer
            .tool_result(&Err(ToolError::Backend("down".to_string())), Locale::En)
            .contains("unavailable"));
        assert_eq!(
            composer.tool_result(&Err(ToolError::NotExecutable(ActionKind::None)), Locale::En),
            prompts::general_help(Locale::En)
        );
    }

    #[test]
    fn test_knowledge_answer_respects_quality() {
        let composer = ResponseComposer::default();
        assert_eq!(
            composer.knowledge_answer(&context_with_answer(0.9), Locale::En),
            "Say \"create task\" followed by a title."
        );
        assert_eq!(
            composer.knowledge_answer(&context_with_answer(0.2), Locale::En),
            prompts::general_help(Locale::En)
        );
    }

    #[test]
    fn test_small_talk_and_reminder() {
        let composer = ResponseComposer::default();
        let context = RagContext::empty("hi");
        assert_eq!(
            composer.conversational(Some("greeting"), &context, Locale::En),
            prompts::greeting(Locale::En)
        );
        let text = composer.with_reminder("Sunny.", Some("When is it due?"), Locale::En);
        assert_eq!(text, "Sunny.\n\nBack to your task: When is it due?");
        assert_eq!(composer.with_reminder("Sunny.", None, Locale::En), "Sunny.");
    }
}
