//! Summarizer backed by a chat [`Provider`].

use async_trait::async_trait;
use memoria_core::error::ProviderError;
use memoria_core::message::Message;
use memoria_core::provider::{Provider, ProviderRequest};
use memoria_core::summarizer::Summarizer;
use std::sync::Arc;
use tracing::debug;

/// Sends the extraction prompt as a single user message.
pub struct ProviderSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn summarize(&self, prompt: &str) -> Result<String, ProviderError> {
        let mut request =
            ProviderRequest::new(&self.model, vec![Message::user(prompt)]).with_temperature(self.temperature);
        if let Some(max) = self.max_tokens {
            request = request.with_max_tokens(max);
        }

        let response = self.provider.complete(request).await?;
        let text = response.message.content;
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        debug!(model = %response.model, chars = text.len(), "Summarizer answered");
        Ok(text)
    }
}
