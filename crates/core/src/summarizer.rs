//! Summarizer trait: the external extraction call used by consolidation.
//!
//! The summarizer receives one prompt (extraction instruction plus the
//! rendered conversation) and returns free text that is *supposed* to be a
//! JSON object. Callers must treat the output as untrusted.

use async_trait::async_trait;
use crate::error::ProviderError;

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// A human-readable name (usually the backing provider).
    fn name(&self) -> &str;

    /// Run the extraction prompt and return the raw model text.
    async fn summarize(&self, prompt: &str) -> std::result::Result<String, ProviderError>;
}
