//! Memory system for Memoria: persistent stores, the per-user memory room
//! and the consolidation mechanism that promotes turns into long-term memory.

pub mod clock;
pub mod consolidation;
pub mod export;
pub mod in_memory;
pub mod room;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use consolidation::{
    Consolidation, ConsolidationMechanism, FallbackReason, RoundCounter, SummaryParseError,
    parse_summary,
};
pub use export::MemoryExport;
pub use in_memory::InMemoryStore;
pub use room::MemoryRoom;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
