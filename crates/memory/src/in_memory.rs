//! In-memory store, for testing and ephemeral sessions.

use crate::clock::MonotonicClock;
use async_trait::async_trait;
use chrono::Utc;
use memoria_core::error::MemoryError;
use memoria_core::memory::{
    turn_added_description, LongTermMemory, MemoryStats, MemoryStore, Turn, UpdateKind,
    UpdateRecord, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct UserMemory {
    turns: Vec<Turn>,
    long_term: LongTermMemory,
    updates: Vec<UpdateRecord>,
}

impl UserMemory {
    fn record(&mut self, kind: UpdateKind, description: String, item_count: usize) {
        self.updates.push(UpdateRecord {
            kind,
            description,
            item_count,
            created_at: Utc::now(),
        });
    }
}

/// A [`MemoryStore`] that keeps everything in a map keyed by user.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryStore {
    users: Arc<RwLock<HashMap<UserId, UserMemory>>>,
    clock: MonotonicClock,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            clock: MonotonicClock::new(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append_turn(&self, user: &UserId, user_text: &str, agent_text: &str) -> Result<Turn, MemoryError> {
        let mut users = self.users.write().await;
        let memory = users.entry(user.clone()).or_default();
        let floor = memory.turns.last().map(|t| t.timestamp);
        let turn = Turn {
            user_text: user_text.to_string(),
            agent_text: agent_text.to_string(),
            timestamp: self.clock.tick_after(floor),
        };
        memory.turns.push(turn.clone());
        memory.record(UpdateKind::ShortTermAdd, turn_added_description(user_text), 1);
        Ok(turn)
    }

    async fn read_turns(&self, user: &UserId, limit: Option<usize>) -> Result<Vec<Turn>, MemoryError> {
        let users = self.users.read().await;
        let Some(memory) = users.get(user) else {
            return Ok(Vec::new());
        };
        let start = limit.map_or(0, |l| memory.turns.len().saturating_sub(l));
        Ok(memory.turns[start..].to_vec())
    }

    async fn clear_turns(&self, user: &UserId) -> Result<usize, MemoryError> {
        let mut users = self.users.write().await;
        let memory = users.entry(user.clone()).or_default();
        let removed = memory.turns.len();
        memory.turns.clear();
        memory.record(UpdateKind::ShortTermClear, format!("cleared {removed} short-term turns"), removed);
        Ok(removed)
    }

    async fn retain_recent_turns(&self, user: &UserId, keep: usize) -> Result<usize, MemoryError> {
        let mut users = self.users.write().await;
        let Some(memory) = users.get_mut(user) else {
            return Ok(0);
        };
        let removed = memory.turns.len().saturating_sub(keep);
        if removed > 0 {
            memory.turns.drain(..removed);
            memory.record(
                UpdateKind::ShortTermTrim,
                format!("trimmed {removed} oldest turns, kept {keep}"),
                removed,
            );
        }
        Ok(removed)
    }

    async fn read_long_term(&self, user: &UserId) -> Result<LongTermMemory, MemoryError> {
        let users = self.users.read().await;
        Ok(users.get(user).map(|m| m.long_term.clone()).unwrap_or_default())
    }

    async fn write_long_term(&self, user: &UserId, memory: &LongTermMemory) -> Result<(), MemoryError> {
        let sparse = memory.sparse();
        let description = format!(
            "long-term memory replaced: {} facts, {} episodes, {} semantic",
            sparse.factual.len(),
            sparse.episodic.len(),
            sparse.semantic.len()
        );
        let items = sparse.item_count();

        let mut users = self.users.write().await;
        let entry = users.entry(user.clone()).or_default();
        entry.long_term = sparse;
        entry.record(UpdateKind::LongTermUpdate, description, items);
        Ok(())
    }

    async fn stats(&self, user: &UserId) -> Result<MemoryStats, MemoryError> {
        let users = self.users.read().await;
        Ok(users
            .get(user)
            .map(|m| MemoryStats {
                short_term_count: m.turns.len(),
                factual_count: m.long_term.factual.len(),
                episodic_count: m.long_term.episodic.len(),
                semantic_count: m.long_term.semantic.len(),
            })
            .unwrap_or_default())
    }

    async fn clear_all(&self, user: &UserId) -> Result<usize, MemoryError> {
        let mut users = self.users.write().await;
        let memory = users.entry(user.clone()).or_default();
        let removed = memory.turns.len()
            + memory.long_term.factual.len()
            + memory.long_term.episodic.len()
            + memory.long_term.semantic.len();
        memory.turns.clear();
        memory.long_term = LongTermMemory::default();
        memory.record(
            UpdateKind::MemoryClearAll,
            format!("cleared all memory ({removed} items)"),
            removed,
        );
        Ok(removed)
    }

    async fn update_history(&self, user: &UserId, limit: usize) -> Result<Vec<UpdateRecord>, MemoryError> {
        let users = self.users.read().await;
        Ok(users
            .get(user)
            .map(|m| m.updates.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::memory::{Episode, FactualKey};

    #[tokio::test]
    async fn append_and_read_with_limit() {
        let store = InMemoryStore::new();
        let user = UserId::from("ming");
        for i in 1..=4 {
            store.append_turn(&user, &format!("u{i}"), "a").await.unwrap();
        }

        let all = store.read_turns(&user, None).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let last_two: Vec<_> = store
            .read_turns(&user, Some(2))
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.user_text)
            .collect();
        assert_eq!(last_two, vec!["u3", "u4"]);
    }

    #[tokio::test]
    async fn unknown_user_reads_empty() {
        let store = InMemoryStore::new();
        let user = UserId::from("nobody");
        assert!(store.read_turns(&user, None).await.unwrap().is_empty());
        assert_eq!(store.read_long_term(&user).await.unwrap(), LongTermMemory::default());
        assert_eq!(store.stats(&user).await.unwrap(), MemoryStats::default());
        assert_eq!(store.retain_recent_turns(&user, 3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn retain_recent_turns_trims_oldest() {
        let store = InMemoryStore::new();
        let user = UserId::from("ming");
        for i in 1..=5 {
            store.append_turn(&user, &format!("T{i}"), "a").await.unwrap();
        }
        assert_eq!(store.retain_recent_turns(&user, 3).await.unwrap(), 2);
        let texts: Vec<_> = store
            .read_turns(&user, None)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.user_text)
            .collect();
        assert_eq!(texts, vec!["T3", "T4", "T5"]);
    }

    #[tokio::test]
    async fn write_long_term_is_sparse_and_audited() {
        let store = InMemoryStore::new();
        let user = UserId::from("ming");
        let mut memory = LongTermMemory::default();
        memory.set_fact(FactualKey::Identity, "Ming").set_fact(FactualKey::Taboos, "");
        memory.episodic.push(Episode::new("event", "met a rose"));
        store.write_long_term(&user, &memory).await.unwrap();

        let stats = store.stats(&user).await.unwrap();
        assert_eq!(stats.factual_count, 1);
        assert_eq!(stats.episodic_count, 1);

        let history = store.update_history(&user, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, UpdateKind::LongTermUpdate);
        assert_eq!(history[0].item_count, 2);
    }

    #[tokio::test]
    async fn clear_all_counts_both_tiers() {
        let store = InMemoryStore::new();
        let user = UserId::from("ming");
        store.append_turn(&user, "hi", "hello").await.unwrap();
        let mut memory = LongTermMemory::default();
        memory.set_fact(FactualKey::Interests, "stars");
        store.write_long_term(&user, &memory).await.unwrap();

        assert_eq!(store.clear_all(&user).await.unwrap(), 2);
        assert_eq!(store.stats(&user).await.unwrap(), MemoryStats::default());
        assert_eq!(
            store.update_history(&user, 1).await.unwrap()[0].kind,
            UpdateKind::MemoryClearAll
        );
    }
}
