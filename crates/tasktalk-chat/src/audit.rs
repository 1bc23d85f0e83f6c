//! Append-only audit trail of conversation turns.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use tasktalk_core::{Role, Timestamp};

use crate::error::ChatError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub conversation_id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    pub recorded_at: Timestamp,
}

impl AuditRecord {
    pub fn new(conversation_id: &str, user_id: &str, role: Role, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            intent: None,
            recorded_at: Timestamp::now(),
        }
    }

    pub fn with_intent(mut self, intent: Option<String>) -> Self {
        self.intent = intent;
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), ChatError>;
}

/// Emits every record as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), ChatError> {
        info!(
            target: "tasktalk::audit",
            id = %record.id,
            conversation_id = %record.conversation_id,
            user_id = %record.user_id,
            role = %record.role,
            intent = record.intent.as_deref().unwrap_or("-"),
            chars = record.content.chars().count(),
            "Turn recorded"
        );
        Ok(())
    }
}

/// Keeps records in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(_) => vec![],
        }
    }

    pub fn for_conversation(&self, conversation_id: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.conversation_id == conversation_id)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), ChatError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| ChatError::Audit(format!("Lock poisoned: {}", e)))?;
        records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_appends_in_order() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditRecord::new("c1", "u1", Role::User, "hello"))
            .await
            .unwrap();
        sink.record(
            AuditRecord::new("c1", "u1", Role::Assistant, "hi")
                .with_intent(Some("CHITCHAT".to_string())),
        )
        .await
        .unwrap();
        sink.record(AuditRecord::new("c2", "u2", Role::User, "other"))
            .await
            .unwrap();

        let c1 = sink.for_conversation("c1");
        assert_eq!(c1.len(), 2);
        assert_eq!(c1[0].role, Role::User);
        assert_eq!(c1[1].intent.as_deref(), Some("CHITCHAT"));
        assert_ne!(c1[0].id, c1[1].id);
        assert_eq!(sink.records().len(), 3);
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_records() {
        let sink = TracingAuditSink;
        assert!(sink
            .record(AuditRecord::new("c1", "u1", Role::User, "hello"))
            .await
            .is_ok());
    }

    #[test]
    fn test_audit_record_serialization() {
        let record = AuditRecord::new("c1", "u1", Role::User, "hello");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("intent"));
    }
}
