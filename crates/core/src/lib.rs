//! # Memoria Core
//!
//! Domain types, traits, and error definitions for the Memoria companion agent.
//! This crate has **zero framework dependencies**: it defines the two-tier
//! memory model and the collaborator traits every other crate implements
//! against.
//!
//! ## Layout
//!
//! - [`memory`]: turns, long-term profile, audit records, and the
//!   [`MemoryStore`] trait
//! - [`summarizer`]: the [`Summarizer`] trait used for consolidation
//! - [`provider`]: the [`Provider`] trait for reply generation
//! - [`event`]: domain events and the broadcast [`EventBus`]

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod summarizer;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{
    Episode, FactualKey, LongTermMemory, MemoryStats, MemoryStore, SemanticKey, Turn,
    UpdateKind, UpdateRecord, UserId,
};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use summarizer::Summarizer;
