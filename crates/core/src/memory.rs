//! Two-tier memory model and the `MemoryStore` trait.
//!
//! Each user owns:
//! - a bounded short-term window of [`Turn`]s (recent exchanges), and
//! - a [`LongTermMemory`] profile distilled from those turns: keyed
//!   factual and semantic values plus an append-only episode list.
//!
//! Every structural mutation also appends an [`UpdateRecord`] to an audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::error::MemoryError;

/// Opaque, externally assigned user identifier.
///
/// The only validation ever applied is "non-empty"; see [`UserId::is_empty`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank ids (including whitespace-only) violate the caller contract.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user/agent exchange. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user_text: String,
    pub agent_text: String,
    pub timestamp: DateTime<Utc>,
}

/// The fixed key set of the factual category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactualKey {
    Identity,
    Preferences,
    Interests,
    ImportantPeople,
    Taboos,
}

impl FactualKey {
    pub const ALL: [FactualKey; 5] = [
        FactualKey::Identity,
        FactualKey::Preferences,
        FactualKey::Interests,
        FactualKey::ImportantPeople,
        FactualKey::Taboos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactualKey::Identity => "identity",
            FactualKey::Preferences => "preferences",
            FactualKey::Interests => "interests",
            FactualKey::ImportantPeople => "important_people",
            FactualKey::Taboos => "taboos",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Human-readable label used when rendering memory for the model.
    pub fn label(&self) -> &'static str {
        match self {
            FactualKey::Identity => "Identity",
            FactualKey::Preferences => "Preferences",
            FactualKey::Interests => "Interests",
            FactualKey::ImportantPeople => "Important people",
            FactualKey::Taboos => "Taboos",
        }
    }
}

/// The fixed key set of the semantic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticKey {
    Values,
    Themes,
    Goals,
}

impl SemanticKey {
    pub const ALL: [SemanticKey; 3] = [SemanticKey::Values, SemanticKey::Themes, SemanticKey::Goals];

    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticKey::Values => "values",
            SemanticKey::Themes => "themes",
            SemanticKey::Goals => "goals",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SemanticKey::Values => "Values",
            SemanticKey::Themes => "Themes",
            SemanticKey::Goals => "Goals",
        }
    }
}

/// A remembered event. Episodes are append-only and never deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub content: String,

    /// Free-form time reference as reported by the summarizer.
    #[serde(default)]
    pub timestamp: String,
}

impl Episode {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
            timestamp: String::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// The structured long-term profile for one user.
///
/// Blank (empty or whitespace-only) factual/semantic values mean "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongTermMemory {
    #[serde(default)]
    pub factual: BTreeMap<FactualKey, String>,

    /// Oldest first.
    #[serde(default)]
    pub episodic: Vec<Episode>,

    #[serde(default)]
    pub semantic: BTreeMap<SemanticKey, String>,
}

fn known(value: Option<&String>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v.as_str(),
        _ => "",
    }
}

impl LongTermMemory {
    /// The factual value for `key`, or `""` when unknown.
    pub fn fact(&self, key: FactualKey) -> &str {
        known(self.factual.get(&key))
    }

    /// The semantic value for `key`, or `""` when unknown.
    pub fn semantic_value(&self, key: SemanticKey) -> &str {
        known(self.semantic.get(&key))
    }

    pub fn set_fact(&mut self, key: FactualKey, value: impl Into<String>) -> &mut Self {
        self.factual.insert(key, value.into());
        self
    }

    pub fn set_semantic(&mut self, key: SemanticKey, value: impl Into<String>) -> &mut Self {
        self.semantic.insert(key, value.into());
        self
    }

    pub fn factual_count(&self) -> usize {
        FactualKey::ALL.iter().filter(|k| !self.fact(**k).is_empty()).count()
    }

    pub fn semantic_count(&self) -> usize {
        SemanticKey::ALL.iter().filter(|k| !self.semantic_value(**k).is_empty()).count()
    }

    /// True when no category holds any information.
    pub fn is_empty(&self) -> bool {
        self.factual_count() == 0
            && self.semantic_count() == 0
            && self.episodic.iter().all(Episode::is_blank)
    }

    /// The most recent `n` episodes, oldest first.
    pub fn recent_episodes(&self, n: usize) -> &[Episode] {
        let start = self.episodic.len().saturating_sub(n);
        &self.episodic[start..]
    }

    /// Merge `incoming` on top of `self`.
    ///
    /// Non-blank factual/semantic values overwrite; blank or absent ones never
    /// erase. Incoming episodes are appended verbatim.
    pub fn merge(&self, incoming: &LongTermMemory) -> LongTermMemory {
        let mut merged = self.clone();
        for (key, value) in &incoming.factual {
            if !value.trim().is_empty() {
                merged.factual.insert(*key, value.clone());
            }
        }
        for (key, value) in &incoming.semantic {
            if !value.trim().is_empty() {
                merged.semantic.insert(*key, value.clone());
            }
        }
        merged.episodic.extend(incoming.episodic.iter().cloned());
        merged
    }

    /// Whether `self` differs from `before` in any field that carries
    /// information: a factual or semantic value, or the episode count.
    pub fn has_changes_from(&self, before: &LongTermMemory) -> bool {
        FactualKey::ALL.iter().any(|k| self.fact(*k) != before.fact(*k))
            || SemanticKey::ALL.iter().any(|k| self.semantic_value(*k) != before.semantic_value(*k))
            || self.episodic.len() != before.episodic.len()
    }

    /// A copy with blank values and blank-content episodes removed.
    pub fn sparse(&self) -> LongTermMemory {
        LongTermMemory {
            factual: self
                .factual
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            episodic: self.episodic.iter().filter(|e| !e.is_blank()).cloned().collect(),
            semantic: self
                .semantic
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        }
    }

    /// Number of items a sparse write persists.
    pub fn item_count(&self) -> usize {
        self.factual_count()
            + self.semantic_count()
            + self.episodic.iter().filter(|e| !e.is_blank()).count()
    }
}

/// Per-tier counts for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub short_term_count: usize,
    pub factual_count: usize,
    pub episodic_count: usize,
    pub semantic_count: usize,
}

impl MemoryStats {
    pub fn long_term_count(&self) -> usize {
        self.factual_count + self.episodic_count + self.semantic_count
    }
}

/// Kind of structural mutation recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    ShortTermAdd,
    ShortTermClear,
    ShortTermTrim,
    LongTermUpdate,
    MemoryClearAll,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::ShortTermAdd => "short_term_add",
            UpdateKind::ShortTermClear => "short_term_clear",
            UpdateKind::ShortTermTrim => "short_term_trim",
            UpdateKind::LongTermUpdate => "long_term_update",
            UpdateKind::MemoryClearAll => "memory_clear_all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "short_term_add" => Some(UpdateKind::ShortTermAdd),
            "short_term_clear" => Some(UpdateKind::ShortTermClear),
            "short_term_trim" => Some(UpdateKind::ShortTermTrim),
            "long_term_update" => Some(UpdateKind::LongTermUpdate),
            "memory_clear_all" => Some(UpdateKind::MemoryClearAll),
            _ => None,
        }
    }
}

/// One audit log entry. Never edited after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub kind: UpdateKind,
    pub description: String,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Truncate `text` to at most `max_chars` characters, marking the cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

/// Audit description for an appended turn.
pub fn turn_added_description(user_text: &str) -> String {
    format!("added turn: {}", preview(user_text, 50))
}

/// Durable per-user storage for both memory tiers and the audit log.
///
/// Every operation touches only rows scoped to one user. The store does no
/// per-user locking; callers serialize writes for a given user.
///
/// Implementations: SQLite, in-memory (for testing and ephemeral sessions).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Where the data lives, for backends that persist it.
    fn location(&self) -> Option<&str> {
        None
    }

    /// Append one turn with a store-assigned, strictly increasing timestamp.
    async fn append_turn(
        &self,
        user: &UserId,
        user_text: &str,
        agent_text: &str,
    ) -> std::result::Result<Turn, MemoryError>;

    /// Turns oldest → newest; with `limit`, only the most recent `limit`.
    async fn read_turns(
        &self,
        user: &UserId,
        limit: Option<usize>,
    ) -> std::result::Result<Vec<Turn>, MemoryError>;

    /// Delete every turn; returns the pre-deletion count.
    async fn clear_turns(&self, user: &UserId) -> std::result::Result<usize, MemoryError>;

    /// Delete all but the newest `keep` turns in one operation; returns how
    /// many were removed.
    async fn retain_recent_turns(
        &self,
        user: &UserId,
        keep: usize,
    ) -> std::result::Result<usize, MemoryError>;

    /// The stored profile, or the zero value when nothing is stored.
    async fn read_long_term(&self, user: &UserId) -> std::result::Result<LongTermMemory, MemoryError>;

    /// Replace the whole stored profile atomically. Blank values are dropped.
    async fn write_long_term(
        &self,
        user: &UserId,
        memory: &LongTermMemory,
    ) -> std::result::Result<(), MemoryError>;

    async fn stats(&self, user: &UserId) -> std::result::Result<MemoryStats, MemoryError>;

    /// Wipe both tiers; returns the combined number of removed items.
    async fn clear_all(&self, user: &UserId) -> std::result::Result<usize, MemoryError>;

    /// Audit records, most recent first, at most `limit`.
    async fn update_history(
        &self,
        user: &UserId,
        limit: usize,
    ) -> std::result::Result<Vec<UpdateRecord>, MemoryError>;
}
