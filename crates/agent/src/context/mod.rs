//! Context assembly: turns a user's stored memory into generation messages.
//!
//! | Section | Source | Rendered as |
//! |---------|--------|-------------|
//! | Memory summary | Long-term profile | One `System` message, omitted when empty |
//! | Recent conversation | Short-term window | Alternating `User` / `Assistant` messages |

pub mod assembler;
pub mod token;

pub use assembler::{ContextAssembler, render_long_term, render_short_term};
