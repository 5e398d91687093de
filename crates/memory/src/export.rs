//! JSON export of a user's complete memory.

use chrono::{DateTime, Utc};
use memoria_core::error::Result;
use memoria_core::memory::{LongTermMemory, MemoryStats, Turn, UserId};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryExport {
    pub user_id: UserId,
    pub export_time: DateTime<Utc>,
    pub backend: String,
    pub short_term_memory: ShortTermExport,
    pub long_term_memory: LongTermExport,
    pub stats: MemoryStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortTermExport {
    pub conversations: Vec<Turn>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermExport {
    pub memory: LongTermMemory,
    pub factual_count: usize,
    pub episodic_count: usize,
    pub semantic_count: usize,
}

impl MemoryExport {
    pub fn new(
        user_id: UserId,
        backend: impl Into<String>,
        turns: Vec<Turn>,
        long_term: LongTermMemory,
        stats: MemoryStats,
    ) -> Self {
        Self {
            user_id,
            export_time: Utc::now(),
            backend: backend.into(),
            short_term_memory: ShortTermExport {
                count: turns.len(),
                conversations: turns,
            },
            long_term_memory: LongTermExport {
                factual_count: long_term.factual_count(),
                episodic_count: long_term.episodic.len(),
                semantic_count: long_term.semantic_count(),
                memory: long_term,
            },
            stats,
        }
    }

    /// `memory_export_<user>_<YYYYmmdd_HHMMSS>.json`
    pub fn default_file_name(&self) -> String {
        let safe_user: String = self
            .user_id
            .as_str()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!(
            "memory_export_{safe_user}_{}.json",
            self.export_time.format("%Y%m%d_%H%M%S")
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the export as pretty-printed JSON.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::memory::FactualKey;

    fn sample() -> MemoryExport {
        let mut long_term = LongTermMemory::default();
        long_term.set_fact(FactualKey::Identity, "Ming");
        let turns = vec![Turn {
            user_text: "hello".into(),
            agent_text: "good morning".into(),
            timestamp: Utc::now(),
        }];
        MemoryExport::new(UserId::from("ming/01"), "in_memory", turns, long_term, MemoryStats::default())
    }

    #[test]
    fn export_json_contains_both_tiers() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["user_id"], "ming/01");
        assert_eq!(json["short_term_memory"]["count"], 1);
        assert_eq!(json["short_term_memory"]["conversations"][0]["user_text"], "hello");
        assert_eq!(json["long_term_memory"]["memory"]["factual"]["identity"], "Ming");
        assert_eq!(json["long_term_memory"]["factual_count"], 1);
    }

    #[test]
    fn default_file_name_is_filesystem_safe() {
        let name = sample().default_file_name();
        assert!(name.starts_with("memory_export_ming_01_"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn write_to_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        sample().write_to(&path).unwrap();
        let back: MemoryExport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.long_term_memory.memory.fact(FactualKey::Identity), "Ming");
    }

    #[test]
    fn write_to_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("export.json");
        let err = sample().write_to(&path).unwrap_err();
        assert!(matches!(err, memoria_core::Error::Io(_)));
    }
}
