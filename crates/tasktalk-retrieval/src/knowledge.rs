//! Curated help entries kept in process.
//!
//! The cache answers when the vector store is unreachable or finds nothing
//! above threshold. Matching is exact on the normalized question first, then
//! approximate by token overlap.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tasktalk_core::lexicon::normalize;
use tasktalk_core::Locale;

use crate::embedding::tokenize;

/// Minimum Jaccard overlap for an approximate match.
pub const APPROX_MATCH_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub locale: Locale,
}

impl KnowledgeEntry {
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
        locale: Locale,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            answer: answer.into(),
            locale,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeHit {
    pub entry: KnowledgeEntry,
    /// 1.0 for an exact match, otherwise the token overlap ratio.
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeCache {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeCache {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        Self { entries }
    }

    /// The built-in help corpus.
    pub fn with_default_entries() -> Self {
        Self::new(default_entries())
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best single match for `query`, if any clears the threshold.
    pub fn lookup(&self, query: &str) -> Option<KnowledgeHit> {
        self.search(query, 1, APPROX_MATCH_THRESHOLD).into_iter().next()
    }

    /// Up to `limit` entries scoring at least `min_score`, best first.
    pub fn search(&self, query: &str, limit: usize, min_score: f32) -> Vec<KnowledgeHit> {
        let norm_query = normalize(query);
        if norm_query.is_empty() {
            return Vec::new();
        }
        let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();

        let mut hits: Vec<KnowledgeHit> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let score = if normalize(&entry.question) == norm_query {
                    1.0
                } else {
                    jaccard(&query_tokens, &tokenize(&entry.question).into_iter().collect())
                };
                (score >= min_score).then(|| KnowledgeHit {
                    entry: entry.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        hits
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    intersection / union
}

fn default_entries() -> Vec<KnowledgeEntry> {
    vec![
        KnowledgeEntry::new(
            "help-create",
            "How do I create a task?",
            "Just tell me, for example \"create a task to buy milk\". I'll ask for a priority \
             and a deadline; you can skip either or say \"create it now\" at any point.",
            Locale::En,
        ),
        KnowledgeEntry::new(
            "help-priority",
            "What priorities can a task have?",
            "Tasks can be HIGH, MEDIUM or LOW priority. If you skip it, MEDIUM is used.",
            Locale::En,
        ),
        KnowledgeEntry::new(
            "help-deadline",
            "How do deadlines work?",
            "Give me a date like \"tomorrow\", \"next friday\", \"in 3 days\" or \"2026-12-01\". \
             Deadlines are optional.",
            Locale::En,
        ),
        KnowledgeEntry::new(
            "help-capabilities",
            "What can you do?",
            "I can create, update, delete and list your tasks, and give you task statistics.",
            Locale::En,
        ),
        KnowledgeEntry::new(
            "help-update",
            "How do I change a task?",
            "Say something like \"update task 3 priority to high\" or \"change task 2 title to \
             call mom\".",
            Locale::En,
        ),
        KnowledgeEntry::new(
            "help-delete",
            "How do I delete a task?",
            "Say \"delete task 3\". You can list your tasks first to find the number.",
            Locale::En,
        ),
        KnowledgeEntry::new(
            "help-create-vi",
            "Làm sao để tạo công việc?",
            "Bạn chỉ cần nói, ví dụ \"tạo task mua sữa\". Tôi sẽ hỏi thêm độ ưu tiên và hạn chót, \
             bạn có thể bỏ qua hoặc nói \"tạo luôn\".",
            Locale::Vi,
        ),
        KnowledgeEntry::new(
            "help-capabilities-vi",
            "Bạn có thể làm gì?",
            "Tôi có thể tạo, cập nhật, xóa, liệt kê công việc và thống kê công việc của bạn.",
            Locale::Vi,
        ),
    ]
}
