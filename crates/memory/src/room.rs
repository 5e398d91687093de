//! Memory Room: the per-user façade over a [`MemoryStore`] that enforces
//! the short-term window ceiling.
//!
//! Per-user lifecycle of the window:
//! `EMPTY → ACCUMULATING → OVERFLOW (transient) → ACCUMULATING`.
//! Overflow lasts at most until the next [`MemoryRoom::cleanup_if_needed`].
//!
//! Every operation rejects an empty [`UserId`] with
//! [`MemoryError::MissingUser`] before touching storage.

use crate::export::MemoryExport;
use memoria_core::error::MemoryError;
use memoria_core::memory::{LongTermMemory, MemoryStats, MemoryStore, Turn, UpdateRecord, UserId};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct MemoryRoom {
    store: Arc<dyn MemoryStore>,
    max_rounds: usize,
}

impl MemoryRoom {
    /// `max_rounds` is read once here; a ceiling of zero is raised to one.
    pub fn new(store: Arc<dyn MemoryStore>, max_rounds: usize) -> Self {
        Self {
            store,
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn backend_name(&self) -> &str {
        self.store.name()
    }

    pub fn location(&self) -> Option<&str> {
        self.store.location()
    }

    fn ensure_user(user: &UserId, operation: &str) -> Result<(), MemoryError> {
        if user.is_empty() {
            error!(operation, "Memory operation called without a user id");
            return Err(MemoryError::MissingUser);
        }
        Ok(())
    }

    pub async fn add_turn(&self, user: &UserId, user_text: &str, agent_text: &str) -> Result<Turn, MemoryError> {
        Self::ensure_user(user, "add_turn")?;
        let turn = self.store.append_turn(user, user_text, agent_text).await?;
        debug!(user = %user, "Turn added to short-term memory");
        Ok(turn)
    }

    /// At most `max_rounds` most recent turns, oldest first.
    pub async fn get_short_term(&self, user: &UserId) -> Result<Vec<Turn>, MemoryError> {
        Self::ensure_user(user, "get_short_term")?;
        self.store.read_turns(user, Some(self.max_rounds)).await
    }

    pub async fn get_long_term(&self, user: &UserId) -> Result<LongTermMemory, MemoryError> {
        Self::ensure_user(user, "get_long_term")?;
        self.store.read_long_term(user).await
    }

    /// Evict the oldest turns once the stored window exceeds the ceiling.
    /// Returns how many turns were removed.
    ///
    /// Callers must serialize this with every other write for the same user.
    pub async fn cleanup_if_needed(&self, user: &UserId) -> Result<usize, MemoryError> {
        Self::ensure_user(user, "cleanup_if_needed")?;
        let stored = self.store.stats(user).await?.short_term_count;
        if stored <= self.max_rounds {
            return Ok(0);
        }
        let removed = self.store.retain_recent_turns(user, self.max_rounds).await?;
        info!(user = %user, removed, kept = self.max_rounds, "Trimmed short-term memory");
        Ok(removed)
    }

    pub async fn clear_short_term(&self, user: &UserId) -> Result<usize, MemoryError> {
        Self::ensure_user(user, "clear_short_term")?;
        let removed = self.store.clear_turns(user).await?;
        info!(user = %user, removed, "Cleared short-term memory");
        Ok(removed)
    }

    pub async fn clear_all(&self, user: &UserId) -> Result<usize, MemoryError> {
        Self::ensure_user(user, "clear_all")?;
        let removed = self.store.clear_all(user).await?;
        info!(user = %user, removed, "Cleared all memory");
        Ok(removed)
    }

    /// Replace the stored long-term profile.
    pub async fn update_long_term(&self, user: &UserId, memory: &LongTermMemory) -> Result<(), MemoryError> {
        Self::ensure_user(user, "update_long_term")?;
        self.store.write_long_term(user, memory).await?;
        info!(
            user = %user,
            facts = memory.factual_count(),
            episodes = memory.episodic.len(),
            semantic = memory.semantic_count(),
            "Long-term memory updated"
        );
        Ok(())
    }

    pub async fn stats(&self, user: &UserId) -> Result<MemoryStats, MemoryError> {
        Self::ensure_user(user, "stats")?;
        self.store.stats(user).await
    }

    pub async fn update_history(&self, user: &UserId, limit: usize) -> Result<Vec<UpdateRecord>, MemoryError> {
        Self::ensure_user(user, "update_history")?;
        self.store.update_history(user, limit).await
    }

    /// Snapshot both tiers (every stored turn, not just the window) for export.
    pub async fn export(&self, user: &UserId) -> Result<MemoryExport, MemoryError> {
        Self::ensure_user(user, "export")?;
        let turns = self.store.read_turns(user, None).await?;
        let long_term = self.store.read_long_term(user).await?;
        let stats = self.store.stats(user).await?;
        Ok(MemoryExport::new(user.clone(), self.store.name(), turns, long_term, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryStore;
    use memoria_core::memory::FactualKey;

    fn room(max_rounds: usize) -> MemoryRoom {
        MemoryRoom::new(Arc::new(InMemoryStore::new()), max_rounds)
    }

    fn texts(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.user_text.as_str()).collect()
    }

    #[tokio::test]
    async fn cleanup_keeps_newest_turns() {
        let room = room(3);
        let user = UserId::from("ming");
        for i in 1..=5 {
            room.add_turn(&user, &format!("T{i}"), "reply").await.unwrap();
        }

        assert_eq!(room.cleanup_if_needed(&user).await.unwrap(), 2);
        let window = room.get_short_term(&user).await.unwrap();
        assert_eq!(texts(&window), vec!["T3", "T4", "T5"]);
        assert_eq!(room.stats(&user).await.unwrap().short_term_count, 3);
    }

    #[tokio::test]
    async fn bounded_window_for_any_turn_count() {
        let k = 3;
        for n in 0..8usize {
            let room = room(k);
            let user = UserId::from("ming");
            for i in 1..=n {
                room.add_turn(&user, &format!("T{i}"), "r").await.unwrap();
            }
            room.cleanup_if_needed(&user).await.unwrap();

            let window = room.get_short_term(&user).await.unwrap();
            let expected: Vec<String> = (n.saturating_sub(k) + 1..=n).map(|i| format!("T{i}")).collect();
            assert_eq!(window.len(), n.min(k));
            assert_eq!(texts(&window), expected.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn get_short_term_caps_before_cleanup() {
        let room = room(2);
        let user = UserId::from("ming");
        for i in 1..=4 {
            room.add_turn(&user, &format!("T{i}"), "r").await.unwrap();
        }
        // Overflow is visible in storage but never in reads
        assert_eq!(room.stats(&user).await.unwrap().short_term_count, 4);
        assert_eq!(texts(&room.get_short_term(&user).await.unwrap()), vec!["T3", "T4"]);
    }

    #[tokio::test]
    async fn cleanup_is_noop_under_ceiling() {
        let room = room(10);
        let user = UserId::from("ming");
        room.add_turn(&user, "hi", "hello").await.unwrap();
        assert_eq!(room.cleanup_if_needed(&user).await.unwrap(), 0);
        assert_eq!(room.get_short_term(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_user_is_rejected_everywhere() {
        let room = room(3);
        let nobody = UserId::from("");

        assert!(matches!(room.add_turn(&nobody, "a", "b").await, Err(MemoryError::MissingUser)));
        assert!(matches!(room.get_short_term(&nobody).await, Err(MemoryError::MissingUser)));
        assert!(matches!(room.get_long_term(&nobody).await, Err(MemoryError::MissingUser)));
        assert!(matches!(room.cleanup_if_needed(&nobody).await, Err(MemoryError::MissingUser)));
        assert!(matches!(room.clear_short_term(&nobody).await, Err(MemoryError::MissingUser)));
        assert!(matches!(room.clear_all(&nobody).await, Err(MemoryError::MissingUser)));
        assert!(matches!(
            room.update_long_term(&nobody, &LongTermMemory::default()).await,
            Err(MemoryError::MissingUser)
        ));
        assert!(matches!(room.stats(&nobody).await, Err(MemoryError::MissingUser)));
        assert!(matches!(room.export(&nobody).await, Err(MemoryError::MissingUser)));
    }

    #[tokio::test]
    async fn rejected_user_leaves_store_untouched() {
        let store = Arc::new(InMemoryStore::new());
        let room = MemoryRoom::new(store.clone(), 3);
        let _ = room.add_turn(&UserId::from("  "), "a", "b").await;
        assert!(store.update_history(&UserId::from("  "), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn export_includes_every_stored_turn() {
        let room = room(2);
        let user = UserId::from("ming");
        for i in 1..=3 {
            room.add_turn(&user, &format!("T{i}"), "r").await.unwrap();
        }
        let mut memory = LongTermMemory::default();
        memory.set_fact(FactualKey::Identity, "Ming");
        room.update_long_term(&user, &memory).await.unwrap();

        let export = room.export(&user).await.unwrap();
        assert_eq!(export.short_term_memory.count, 3);
        assert_eq!(export.long_term_memory.factual_count, 1);
        assert_eq!(export.backend, "in_memory");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_and_in_memory_agree() {
        use crate::sqlite::SqliteStore;

        let sqlite = MemoryRoom::new(Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap()), 3);
        let memory = room(3);
        let user = UserId::from("ming");

        for room in [&sqlite, &memory] {
            for i in 1..=5 {
                room.add_turn(&user, &format!("T{i}"), "r").await.unwrap();
            }
            room.cleanup_if_needed(&user).await.unwrap();
            room.clear_short_term(&user).await.unwrap();
            room.add_turn(&user, "after", "r").await.unwrap();
        }

        let a = sqlite.get_short_term(&user).await.unwrap();
        let b = memory.get_short_term(&user).await.unwrap();
        assert_eq!(texts(&a), texts(&b));
        assert_eq!(sqlite.stats(&user).await.unwrap(), memory.stats(&user).await.unwrap());

        let kinds = |h: Vec<UpdateRecord>| h.into_iter().map(|r| r.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds(sqlite.update_history(&user, 20).await.unwrap()),
            kinds(memory.update_history(&user, 20).await.unwrap())
        );
    }
}
