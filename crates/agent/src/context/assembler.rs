//! Context assembler: renders both memory tiers into the messages handed to
//! the generation call.
//!
//! Output order is fixed:
//!
//! 1. **Memory summary** (`System`): known facts, the last
//!    [`RECENT_EPISODES`] episodes, semantic understanding. Omitted entirely
//!    when none of those carry a value.
//! 2. **Short-term window**: each turn as a `User` then `Assistant` message,
//!    oldest first.
//!
//! Rendering is deterministic: identical memory always yields identical
//! message content.

use memoria_core::memory::{FactualKey, LongTermMemory, MemoryStats, SemanticKey, Turn, UserId};
use memoria_core::message::Message;
use memoria_memory::MemoryRoom;
use std::sync::Arc;
use tracing::{debug, warn};

/// How many of the most recent episodes the summary includes.
pub const RECENT_EPISODES: usize = 3;

pub struct ContextAssembler {
    room: Arc<MemoryRoom>,
}

impl ContextAssembler {
    pub fn new(room: Arc<MemoryRoom>) -> Self {
        Self { room }
    }

    /// Memory summary (if any) followed by the short-term window.
    ///
    /// A tier that cannot be read is logged and rendered as empty.
    pub async fn build_context(&self, user: &UserId) -> Vec<Message> {
        let long_term = match self.room.get_long_term(user).await {
            Ok(memory) => memory,
            Err(e) => {
                warn!(user = %user, error = %e, "Long-term memory unavailable, continuing without it");
                LongTermMemory::default()
            }
        };
        let window = match self.room.get_short_term(user).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(user = %user, error = %e, "Short-term memory unavailable, continuing without it");
                Vec::new()
            }
        };

        let mut messages = Vec::with_capacity(window.len() * 2 + 1);
        messages.extend(render_long_term(&long_term));
        messages.extend(render_short_term(&window));

        debug!(
            user = %user,
            turns = window.len(),
            has_summary = !long_term.is_empty(),
            "Assembled memory context"
        );
        messages
    }

    /// One-line digest of both tiers, e.g.
    /// `short-term: 3 turns | long-term: 2 facts, 1 episodes, 0 semantic`.
    pub async fn summarize(&self, user: &UserId) -> String {
        let stats = self.room.stats(user).await.unwrap_or_else(|e| {
            warn!(user = %user, error = %e, "Memory stats unavailable");
            MemoryStats::default()
        });
        format!(
            "short-term: {} turns | long-term: {} facts, {} episodes, {} semantic",
            stats.short_term_count.min(self.room.max_rounds()),
            stats.factual_count,
            stats.episodic_count,
            stats.semantic_count
        )
    }
}

/// The memory summary message, or `None` when there is nothing to say.
pub fn render_long_term(memory: &LongTermMemory) -> Option<Message> {
    let facts: Vec<String> = FactualKey::ALL
        .iter()
        .filter(|k| !memory.fact(**k).is_empty())
        .map(|k| format!("- {}: {}", k.label(), memory.fact(*k).trim()))
        .collect();

    let episodes: Vec<String> = memory
        .recent_episodes(RECENT_EPISODES)
        .iter()
        .filter(|e| !e.is_blank())
        .map(|e| {
            let mut line = String::from("- ");
            if !e.kind.trim().is_empty() {
                line.push_str(&format!("[{}] ", e.kind.trim()));
            }
            line.push_str(e.content.trim());
            if !e.timestamp.trim().is_empty() {
                line.push_str(&format!(" ({})", e.timestamp.trim()));
            }
            line
        })
        .collect();

    let semantic: Vec<String> = SemanticKey::ALL
        .iter()
        .filter(|k| !memory.semantic_value(**k).is_empty())
        .map(|k| format!("- {}: {}", k.label(), memory.semantic_value(*k).trim()))
        .collect();

    if facts.is_empty() && episodes.is_empty() && semantic.is_empty() {
        return None;
    }

    let mut sections = vec!["What you remember about this user:".to_string()];
    for (title, lines) in [
        ("Facts", facts),
        ("Recent experiences", episodes),
        ("Deeper understanding", semantic),
    ] {
        if !lines.is_empty() {
            sections.push(format!("{title}:\n{}", lines.join("\n")));
        }
    }
    Some(Message::system(sections.join("\n\n")))
}

/// The window as alternating user/assistant messages, oldest first.
pub fn render_short_term(turns: &[Turn]) -> Vec<Message> {
    turns
        .iter()
        .flat_map(|t| [Message::user(t.user_text.as_str()), Message::assistant(t.agent_text.as_str())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::memory::Episode;
    use memoria_core::message::Role;
    use memoria_memory::InMemoryStore;

    fn room() -> Arc<MemoryRoom> {
        Arc::new(MemoryRoom::new(Arc::new(InMemoryStore::new()), 3))
    }

    #[test]
    fn empty_memory_renders_nothing() {
        assert!(render_long_term(&LongTermMemory::default()).is_none());

        let mut blank = LongTermMemory::default();
        blank.set_fact(FactualKey::Identity, "   ");
        blank.episodic.push(Episode::new("event", ""));
        assert!(render_long_term(&blank).is_none());
    }

    #[test]
    fn summary_lists_known_values_only() {
        let mut memory = LongTermMemory::default();
        memory
            .set_fact(FactualKey::Identity, "Ming")
            .set_fact(FactualKey::Taboos, "");
        memory.set_semantic(SemanticKey::Goals, "be an astronaut");

        let message = render_long_term(&memory).unwrap();
        assert_eq!(message.role, Role::System);
        assert!(message.content.contains("Ming"));
        assert!(message.content.contains("be an astronaut"));
        assert!(!message.content.contains(FactualKey::Taboos.label()));
        assert!(!message.content.contains("Recent experiences"));
    }

    #[test]
    fn summary_includes_last_three_episodes() {
        let mut memory = LongTermMemory::default();
        for i in 1..=5 {
            memory.episodic.push(Episode::new("event", format!("episode {i}")));
        }
        let content = render_long_term(&memory).unwrap().content;
        assert!(!content.contains("episode 2"));
        for i in 3..=5 {
            assert!(content.contains(&format!("episode {i}")));
        }
        assert!(content.find("episode 3") < content.find("episode 5"));
    }

    #[test]
    fn window_alternates_roles() {
        let turns = vec![
            Turn { user_text: "u1".into(), agent_text: "a1".into(), timestamp: chrono::Utc::now() },
            Turn { user_text: "u2".into(), agent_text: "a2".into(), timestamp: chrono::Utc::now() },
        ];
        let messages = render_short_term(&turns);
        let shape: Vec<_> = messages.iter().map(|m| (m.role, m.content.as_str())).collect();
        assert_eq!(
            shape,
            vec![
                (Role::User, "u1"),
                (Role::Assistant, "a1"),
                (Role::User, "u2"),
                (Role::Assistant, "a2"),
            ]
        );
    }

    #[tokio::test]
    async fn build_context_puts_summary_first() {
        let room = room();
        let user = UserId::from("ming");
        room.add_turn(&user, "I like stars", "Me too").await.unwrap();
        let mut memory = LongTermMemory::default();
        memory.set_fact(FactualKey::Interests, "stars");
        room.update_long_term(&user, &memory).await.unwrap();

        let messages = ContextAssembler::new(room).build_context(&user).await;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "I like stars");
        assert_eq!(messages[2].content, "Me too");
    }

    #[tokio::test]
    async fn new_user_gets_empty_context() {
        let messages = ContextAssembler::new(room()).build_context(&UserId::from("new")).await;
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn missing_user_degrades_to_empty_context() {
        let messages = ContextAssembler::new(room()).build_context(&UserId::from("")).await;
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn digest_counts_both_tiers() {
        let room = room();
        let user = UserId::from("ming");
        for i in 0..5 {
            room.add_turn(&user, &format!("u{i}"), "a").await.unwrap();
        }
        let mut memory = LongTermMemory::default();
        memory
            .set_fact(FactualKey::Identity, "Ming")
            .set_fact(FactualKey::Interests, "stars");
        memory.episodic.push(Episode::new("event", "saw a comet"));
        room.update_long_term(&user, &memory).await.unwrap();

        let digest = ContextAssembler::new(room).summarize(&user).await;
        assert_eq!(digest, "short-term: 3 turns | long-term: 2 facts, 1 episodes, 0 semantic");
    }
}
