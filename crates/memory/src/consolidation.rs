//! Consolidation: promote short-term turns into long-term memory.
//!
//! Every `update_interval` recorded rounds the caller asks the summarizer to
//! extract a structured profile from the current window, merges it into the
//! stored profile and, when something actually changed, persists it.
//!
//! Summarizer output is untrusted. [`ConsolidationMechanism::consolidate`]
//! never fails: a broken call or unusable output yields
//! [`Consolidation::Fallback`] carrying the existing memory unchanged.

use memoria_core::error::ProviderError;
use memoria_core::memory::{Episode, FactualKey, LongTermMemory, SemanticKey, Turn, UserId};
use memoria_core::summarizer::Summarizer;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Instruction sent ahead of the rendered conversation.
pub const EXTRACTION_INSTRUCTION: &str = r#"You are a memory extraction assistant. Read the conversation below and extract what it reveals about the user.

Return a single JSON object with exactly this shape:
{
  "factual": {
    "identity": "",
    "preferences": "",
    "interests": "",
    "important_people": "",
    "taboos": ""
  },
  "episodic": [
    {"type": "", "content": "", "timestamp": ""}
  ],
  "semantic": {
    "values": "",
    "themes": "",
    "goals": ""
  }
}

Rules:
- Only extract information the user actually mentioned. Do not guess.
- Leave a value as an empty string when the conversation says nothing about it.
- "episodic" lists notable events or experiences; use an empty list if there are none.
- Return only the JSON object, with no explanation and no markdown fences."#;

/// Per-user round counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundCounter {
    pub current: u32,
    pub interval: u32,
}

impl RoundCounter {
    pub fn new(interval: u32) -> Self {
        Self {
            current: 0,
            interval: interval.max(1),
        }
    }

    pub fn should_trigger(&self) -> bool {
        self.current > 0 && self.current % self.interval == 0
    }
}

/// Why a consolidation attempt kept the existing memory.
#[derive(Debug, Clone)]
pub enum FallbackReason {
    /// The summarizer errored or timed out.
    SummarizerFailed(ProviderError),
    /// The summarizer answered, but not with a usable JSON object.
    Unparseable(SummaryParseError),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::SummarizerFailed(e) => write!(f, "summarizer failed: {e}"),
            FallbackReason::Unparseable(e) => write!(f, "unparseable summary: {e}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Consolidation {
    Merged(LongTermMemory),
    Fallback {
        memory: LongTermMemory,
        reason: FallbackReason,
    },
}

impl Consolidation {
    /// The memory to compare against the stored profile.
    pub fn memory(&self) -> &LongTermMemory {
        match self {
            Consolidation::Merged(memory) | Consolidation::Fallback { memory, .. } => memory,
        }
    }

    pub fn into_memory(self) -> LongTermMemory {
        match self {
            Consolidation::Merged(memory) | Consolidation::Fallback { memory, .. } => memory,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Consolidation::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryParseError {
    /// No JSON object could be located in the text.
    NoJsonObject,
    /// A candidate was found but did not parse.
    InvalidJson(String),
}

impl std::fmt::Display for SummaryParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryParseError::NoJsonObject => write!(f, "no JSON object found"),
            SummaryParseError::InvalidJson(e) => write!(f, "invalid JSON: {e}"),
        }
    }
}

impl std::error::Error for SummaryParseError {}

pub struct ConsolidationMechanism {
    summarizer: Arc<dyn Summarizer>,
    update_interval: u32,
    summarizer_timeout: Duration,
    /// One counter per user that has recorded a turn in this process.
    /// Reads never create an entry. Nothing is evicted.
    rounds: Mutex<HashMap<UserId, RoundCounter>>,
}

impl ConsolidationMechanism {
    pub fn new(summarizer: Arc<dyn Summarizer>, update_interval: u32) -> Self {
        Self {
            summarizer,
            update_interval: update_interval.max(1),
            summarizer_timeout: Duration::from_secs(60),
            rounds: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.summarizer_timeout = timeout;
        self
    }

    pub fn update_interval(&self) -> u32 {
        self.update_interval
    }

    pub fn summarizer_name(&self) -> &str {
        self.summarizer.name()
    }

    /// The user's counter, or a fresh one if they have none yet.
    fn peek(&self, user: &UserId) -> RoundCounter {
        let rounds = self.rounds.lock().unwrap_or_else(PoisonError::into_inner);
        rounds
            .get(user)
            .copied()
            .unwrap_or_else(|| RoundCounter::new(self.update_interval))
    }

    /// Count one durably recorded turn. Returns the new round number.
    pub fn increment_round(&self, user: &UserId) -> u32 {
        let mut rounds = self.rounds.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = rounds
            .entry(user.clone())
            .or_insert_with(|| RoundCounter::new(self.update_interval));
        counter.current = counter.current.saturating_add(1);
        counter.current
    }

    pub fn should_trigger(&self, user: &UserId) -> bool {
        self.peek(user).should_trigger()
    }

    pub fn reset_round(&self, user: &UserId) {
        let mut rounds = self.rounds.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(counter) = rounds.get_mut(user) {
            counter.current = 0;
        }
    }

    pub fn current_round(&self, user: &UserId) -> u32 {
        self.peek(user).current
    }

    /// Extract from `short_term` and merge into `existing`.
    pub async fn consolidate(&self, short_term: &[Turn], existing: &LongTermMemory) -> Consolidation {
        let prompt = format!(
            "{EXTRACTION_INSTRUCTION}\n\nConversation:\n{}",
            format_conversation(short_term)
        );
        debug!(turns = short_term.len(), summarizer = self.summarizer.name(), "Running consolidation");

        let raw = match tokio::time::timeout(self.summarizer_timeout, self.summarizer.summarize(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return fallback(existing, FallbackReason::SummarizerFailed(e)),
            Err(_) => {
                let e = ProviderError::Timeout(format!(
                    "summarizer did not answer within {}s",
                    self.summarizer_timeout.as_secs()
                ));
                return fallback(existing, FallbackReason::SummarizerFailed(e));
            }
        };

        match parse_summary(&raw) {
            Ok(extracted) => {
                let merged = merge_long_term(existing, &extracted);
                info!(
                    facts = merged.factual_count(),
                    episodes = merged.episodic.len(),
                    semantic = merged.semantic_count(),
                    "Consolidation produced a merged profile"
                );
                Consolidation::Merged(merged)
            }
            Err(e) => fallback(existing, FallbackReason::Unparseable(e)),
        }
    }
}

fn fallback(existing: &LongTermMemory, reason: FallbackReason) -> Consolidation {
    warn!(%reason, "Consolidation fell back to existing memory");
    Consolidation::Fallback {
        memory: existing.clone(),
        reason,
    }
}

/// Render turns as numbered `Turn i:` blocks.
pub fn format_conversation(turns: &[Turn]) -> String {
    turns
        .iter()
        .enumerate()
        .map(|(i, t)| format!("Turn {}:\nuser: {}\nagent: {}", i + 1, t.user_text, t.agent_text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn merge_long_term(existing: &LongTermMemory, incoming: &LongTermMemory) -> LongTermMemory {
    existing.merge(incoming)
}

pub fn has_changes(before: &LongTermMemory, after: &LongTermMemory) -> bool {
    after.has_changes_from(before)
}

/// Parse summarizer output into a [`LongTermMemory`].
///
/// Accepts a bare JSON object or text with one embedded (markdown fences,
/// preambles). Unknown keys are ignored and blank episodes dropped.
pub fn parse_summary(raw: &str) -> Result<LongTermMemory, SummaryParseError> {
    let value = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(v @ Value::Object(_)) => v,
        _ => {
            let span = first_json_object(raw).ok_or(SummaryParseError::NoJsonObject)?;
            serde_json::from_str::<Value>(span).map_err(|e| SummaryParseError::InvalidJson(e.to_string()))?
        }
    };
    let Value::Object(root) = value else {
        return Err(SummaryParseError::NoJsonObject);
    };

    let mut memory = LongTermMemory::default();

    if let Some(Value::Object(factual)) = root.get("factual") {
        for (key, value) in factual {
            if let Some(key) = FactualKey::parse(key) {
                memory.set_fact(key, value_text(value));
            }
        }
    }

    if let Some(Value::Object(semantic)) = root.get("semantic") {
        for (key, value) in semantic {
            if let Some(key) = SemanticKey::parse(key) {
                memory.set_semantic(key, value_text(value));
            }
        }
    }

    if let Some(Value::Array(episodes)) = root.get("episodic") {
        memory.episodic = episodes
            .iter()
            .filter_map(|item| match item {
                Value::Object(fields) => {
                    let field = |name: &str| fields.get(name).map(value_text).unwrap_or_default();
                    Some(Episode::new(field("type"), field("content")).with_timestamp(field("timestamp")))
                }
                Value::String(content) => Some(Episode::new("event", content.clone())),
                _ => None,
            })
            .filter(|e| !e.is_blank())
            .collect();
    }

    Ok(memory)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// The first balanced `{ ... }` span, skipping braces inside strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
