//! The companion agent: memory-aware turn handling for Memoria.
//!
//! Each turn follows **Assemble → Generate → Record → Consolidate → Trim**:
//!
//! 1. **Assemble** the persona prompt, the long-term memory summary and the
//!    short-term window
//! 2. **Generate** a reply via the configured provider
//! 3. **Record** the turn and count the round
//! 4. **Consolidate** into long-term memory every `update_interval` rounds
//! 5. **Trim** the short-term window back to `max_short_term_rounds` on
//!    turns that did not consolidate

pub mod context;
pub mod loop_runner;
pub mod summarizer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ContextAssembler, render_long_term, render_short_term};
pub use loop_runner::{AgentLoop, ConsolidationReport, FALLBACK_REPLY, TurnOutcome, TurnReply};
pub use summarizer::ProviderSummarizer;
