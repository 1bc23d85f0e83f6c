//! Short-term conversation memory.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use tasktalk_core::error::TasktalkError;
use tasktalk_core::ConversationTurn;

/// Bounded, per-conversation log of recent turns.
#[async_trait]
pub trait TurnMemory: Send + Sync {
    async fn append(&self, conversation_id: &str, turn: ConversationTurn)
        -> Result<(), TasktalkError>;

    /// The last `limit` turns, oldest first.
    async fn recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, TasktalkError>;

    async fn clear(&self, conversation_id: &str) -> Result<(), TasktalkError>;
}

#[derive(Debug)]
struct TurnLog {
    turns: VecDeque<ConversationTurn>,
    last_touched: Instant,
}

impl Default for TurnLog {
    fn default() -> Self {
        Self {
            turns: VecDeque::new(),
            last_touched: Instant::now(),
        }
    }
}

/// Process-local turn memory. Oldest turns are evicted past `capacity`;
/// whole conversations go through [`InMemoryTurnMemory::sweep_idle`].
#[derive(Debug)]
pub struct InMemoryTurnMemory {
    logs: DashMap<String, TurnLog>,
    capacity: usize,
}

impl InMemoryTurnMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn conversation_count(&self) -> usize {
        self.logs.len()
    }

    /// Drop conversations with no new turn for at least `ttl`. Returns the
    /// removed conversation ids.
    pub fn sweep_idle(&self, ttl: Duration) -> Vec<String> {
        let mut idle: Vec<String> = self
            .logs
            .iter()
            .filter(|entry| entry.last_touched.elapsed() >= ttl)
            .map(|entry| entry.key().clone())
            .collect();
        // Re-checked under the shard lock: a turn may have landed since.
        idle.retain(|id| {
            self.logs
                .remove_if(id, |_, log| log.last_touched.elapsed() >= ttl)
                .is_some()
        });
        idle
    }
}

impl Default for InMemoryTurnMemory {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl TurnMemory for InMemoryTurnMemory {
    async fn append(
        &self,
        conversation_id: &str,
        turn: ConversationTurn,
    ) -> Result<(), TasktalkError> {
        let mut log = self.logs.entry(conversation_id.to_string()).or_default();
        log.turns.push_back(turn);
        while log.turns.len() > self.capacity {
            log.turns.pop_front();
        }
        log.last_touched = Instant::now();
        Ok(())
    }

    async fn recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, TasktalkError> {
        Ok(self
            .logs
            .get(conversation_id)
            .map(|log| {
                let skip = log.turns.len().saturating_sub(limit);
                log.turns.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), TasktalkError> {
        self.logs.remove(conversation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasktalk_core::Role;

    #[tokio::test]
    async fn test_append_and_recent_in_order() {
        let memory = InMemoryTurnMemory::new(10);
        memory.append("c1", ConversationTurn::user("one")).await.unwrap();
        memory
            .append("c1", ConversationTurn::assistant("two"))
            .await
            .unwrap();
        memory.append("c1", ConversationTurn::user("three")).await.unwrap();

        let recent = memory.recent("c1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "two");
        assert_eq!(recent[0].role, Role::Assistant);
        assert_eq!(recent[1].content, "three");
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let memory = InMemoryTurnMemory::new(3);
        for i in 0..5 {
            memory
                .append("c1", ConversationTurn::user(format!("m{}", i)))
                .await
                .unwrap();
        }
        let all = memory.recent("c1", 100).await.unwrap();
        let contents: Vec<&str> = all.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let memory = InMemoryTurnMemory::default();
        memory.append("a", ConversationTurn::user("for a")).await.unwrap();
        memory.append("b", ConversationTurn::user("for b")).await.unwrap();

        assert_eq!(memory.recent("a", 10).await.unwrap()[0].content, "for a");
        assert_eq!(memory.conversation_count(), 2);
        assert!(memory.recent("unknown", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_idle_drops_whole_conversations() {
        let memory = InMemoryTurnMemory::default();
        memory.append("a", ConversationTurn::user("x")).await.unwrap();
        memory.append("b", ConversationTurn::user("y")).await.unwrap();

        assert!(memory.sweep_idle(Duration::from_secs(3600)).is_empty());
        assert_eq!(memory.conversation_count(), 2);

        let mut removed = memory.sweep_idle(Duration::ZERO);
        removed.sort();
        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(memory.conversation_count(), 0);
        assert!(memory.recent("a", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let memory = InMemoryTurnMemory::default();
        memory.append("a", ConversationTurn::user("x")).await.unwrap();
        memory.clear("a").await.unwrap();
        assert!(memory.recent("a", 10).await.unwrap().is_empty());
    }
}
