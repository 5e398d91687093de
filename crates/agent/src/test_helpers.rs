//! Shared test doubles for the agent crate.

use memoria_core::error::ProviderError;
use memoria_core::message::Message;
use memoria_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use memoria_core::summarizer::Summarizer;
use std::sync::Mutex;

/// A provider that replays scripted results in order and records every request.
///
/// Panics if more calls are made than results provided.
pub struct ScriptedProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(make_text_response(t))).collect())
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let call = requests.len();
        if call >= responses.len() {
            panic!("ScriptedProvider: no more responses (call #{call}, have {})", responses.len());
        }
        requests.push(request);
        responses[call].clone()
    }
}

/// A summarizer that replays scripted answers, then keeps repeating the last one.
pub struct ScriptedSummarizer {
    answers: Vec<Result<String, ProviderError>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedSummarizer {
    pub fn new(answers: Vec<Result<String, ProviderError>>) -> Self {
        assert!(!answers.is_empty(), "ScriptedSummarizer needs at least one answer");
        Self {
            answers,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(answer: &str) -> Self {
        Self::new(vec![Ok(answer.to_string())])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Summarizer for ScriptedSummarizer {
    fn name(&self) -> &str {
        "scripted_summarizer"
    }

    async fn summarize(&self, prompt: &str) -> Result<String, ProviderError> {
        let mut prompts = self.prompts.lock().unwrap();
        let index = prompts.len().min(self.answers.len() - 1);
        prompts.push(prompt.to_string());
        self.answers[index].clone()
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}
