//! The per-turn pipeline.
//!
//! For each user input:
//!
//! 1. **Assemble** persona prompt + memory context + the new input
//! 2. **Generate** a reply via the configured provider (bounded by a timeout)
//! 3. **Record** the turn in short-term memory and count the round
//! 4. **Consolidate** when the round hits the update interval
//! 5. **Trim** the window back to its ceiling
//!
//! Turns for the same user are serialized; different users run concurrently.

use crate::context::ContextAssembler;
use crate::context::token::estimate_messages_tokens;
use chrono::Utc;
use memoria_core::event::{DomainEvent, EventBus};
use memoria_core::memory::{LongTermMemory, Turn, UserId, preview};
use memoria_core::message::Message;
use memoria_core::provider::{Provider, ProviderRequest};
use memoria_memory::consolidation::has_changes;
use memoria_memory::{Consolidation, ConsolidationMechanism, MemoryRoom};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reply used whenever generation fails.
pub const FALLBACK_REPLY: &str = "Sorry, I ran into a problem. Please try again in a moment.";

/// What the agent said and what happened to memory along the way.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub text: String,
    pub outcome: TurnOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The turn was stored as round `round` of the current interval.
    Recorded {
        round: u32,
        consolidation: ConsolidationReport,
        trimmed: usize,
    },
    /// The reply was generated but storing the turn failed.
    NotRecorded { reason: String },
    /// Generation failed; the fallback reply was returned and nothing stored.
    GenerationFailed { reason: String },
    /// The caller supplied an empty user id.
    MissingUser,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsolidationReport {
    /// Not due this round.
    Skipped,
    /// Long-term memory changed; the window was cleared and the round reset.
    Promoted,
    /// Nothing new was learned; window and round left as they were.
    NoChange,
    /// The summarizer failed or answered garbage; retried next interval.
    Degraded(String),
    /// Reading or writing memory failed; window and round left as they were.
    StorageFailed(String),
}

/// Drives conversations against a provider with two-tier memory.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
    fallback_reply: String,
    generation_timeout: Duration,
    room: Arc<MemoryRoom>,
    assembler: ContextAssembler,
    consolidation: Arc<ConsolidationMechanism>,
    event_bus: Arc<EventBus>,
    /// Turn lock per user. One entry is added for each user the loop has
    /// served and none are evicted, so the map grows with the user count
    /// of a long-running process.
    user_locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        room: Arc<MemoryRoom>,
        consolidation: Arc<ConsolidationMechanism>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            system_prompt: String::new(),
            fallback_reply: FALLBACK_REPLY.to_string(),
            generation_timeout: Duration::from_secs(120),
            assembler: ContextAssembler::new(room.clone()),
            room,
            consolidation,
            event_bus,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Persona prompt placed before the memory summary.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_fallback_reply(mut self, reply: impl Into<String>) -> Self {
        self.fallback_reply = reply.into();
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn room(&self) -> &Arc<MemoryRoom> {
        &self.room
    }

    pub fn consolidation(&self) -> &Arc<ConsolidationMechanism> {
        &self.consolidation
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// One-line digest of the user's memory.
    pub async fn memory_digest(&self, user: &UserId) -> String {
        self.assembler.summarize(user).await
    }

    fn lock_for(&self, user: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(user.clone()).or_default().clone()
    }

    /// Messages for the generation call: persona, memory context, new input.
    pub async fn build_messages(&self, user: &UserId, input: &str) -> Vec<Message> {
        let mut messages = Vec::new();
        if !self.system_prompt.trim().is_empty() {
            messages.push(Message::system(self.system_prompt.as_str()));
        }
        messages.extend(self.assembler.build_context(user).await);
        messages.push(Message::user(input));
        messages
    }

    /// Handle one user input. Never fails: problems are reported in
    /// [`TurnReply::outcome`] and logged.
    pub async fn chat(&self, user: &UserId, input: &str) -> TurnReply {
        if user.is_empty() {
            error!("chat called without a user id");
            return TurnReply {
                text: self.fallback_reply.clone(),
                outcome: TurnOutcome::MissingUser,
            };
        }

        let lock = self.lock_for(user);
        let _guard = lock.lock().await;

        info!(user = %user, input = %preview(input, 50), "Processing turn");

        let reply = match self.generate(user, input).await {
            Ok(reply) => reply,
            Err(reason) => {
                warn!(user = %user, %reason, "Generation failed, returning fallback reply");
                self.publish_error("generation", &reason);
                return TurnReply {
                    text: self.fallback_reply.clone(),
                    outcome: TurnOutcome::GenerationFailed { reason },
                };
            }
        };

        if let Err(e) = self.room.add_turn(user, input, &reply).await {
            error!(user = %user, error = %e, "Failed to record turn");
            self.publish_error("record_turn", &e.to_string());
            return TurnReply {
                text: reply,
                outcome: TurnOutcome::NotRecorded { reason: e.to_string() },
            };
        }

        let round = self.consolidation.increment_round(user);
        self.event_bus.publish(DomainEvent::TurnRecorded {
            user_id: user.to_string(),
            round,
            timestamp: Utc::now(),
        });

        let consolidation = if self.consolidation.should_trigger(user) {
            self.consolidate(user).await
        } else {
            ConsolidationReport::Skipped
        };

        // A consolidation turn never trims: the window is either promoted
        // or kept whole until the next turn's ceiling check.
        let trimmed = if consolidation == ConsolidationReport::Skipped {
            self.trim(user).await
        } else {
            0
        };

        TurnReply {
            text: reply,
            outcome: TurnOutcome::Recorded {
                round,
                consolidation,
                trimmed,
            },
        }
    }

    async fn generate(&self, user: &UserId, input: &str) -> Result<String, String> {
        let messages = self.build_messages(user, input).await;
        debug!(
            user = %user,
            messages = messages.len(),
            approx_tokens = estimate_messages_tokens(&messages),
            "Calling provider"
        );

        let mut request = ProviderRequest::new(&self.model, messages).with_temperature(self.temperature);
        if let Some(max) = self.max_tokens {
            request = request.with_max_tokens(max);
        }

        let response = match tokio::time::timeout(self.generation_timeout, self.provider.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => {
                return Err(format!(
                    "no reply within {}s",
                    self.generation_timeout.as_secs()
                ));
            }
        };

        if let Some(usage) = &response.usage {
            self.event_bus.publish(DomainEvent::ResponseGenerated {
                user_id: user.to_string(),
                model: response.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: Utc::now(),
            });
        }

        let text = response.message.content;
        if text.trim().is_empty() {
            return Err("provider returned an empty reply".into());
        }
        Ok(text)
    }

    /// Promote the window into long-term memory. The window is cleared and
    /// the round reset only after a verified change has been persisted.
    async fn consolidate(&self, user: &UserId) -> ConsolidationReport {
        let (window, existing) = match self.read_tiers(user).await {
            Ok(tiers) => tiers,
            Err(reason) => {
                warn!(user = %user, %reason, "Consolidation skipped, memory unreadable");
                return ConsolidationReport::StorageFailed(reason);
            }
        };

        let report = match self.consolidation.consolidate(&window, &existing).await {
            Consolidation::Fallback { reason, .. } => ConsolidationReport::Degraded(reason.to_string()),
            Consolidation::Merged(merged) if !has_changes(&existing, &merged) => {
                info!(user = %user, "Consolidation found nothing new");
                ConsolidationReport::NoChange
            }
            Consolidation::Merged(merged) => match self.room.update_long_term(user, &merged).await {
                Ok(()) => {
                    if let Err(e) = self.room.clear_short_term(user).await {
                        warn!(user = %user, error = %e, "Long-term memory saved but short-term clear failed");
                    }
                    self.consolidation.reset_round(user);
                    ConsolidationReport::Promoted
                }
                Err(e) => {
                    error!(user = %user, error = %e, "Failed to persist consolidated memory");
                    self.publish_error("consolidation", &e.to_string());
                    ConsolidationReport::StorageFailed(e.to_string())
                }
            },
        };

        self.event_bus.publish(DomainEvent::ConsolidationAttempted {
            user_id: user.to_string(),
            changed: report == ConsolidationReport::Promoted,
            timestamp: Utc::now(),
        });
        report
    }

    async fn read_tiers(&self, user: &UserId) -> Result<(Vec<Turn>, LongTermMemory), String> {
        let window = self.room.get_short_term(user).await.map_err(|e| e.to_string())?;
        let existing = self.room.get_long_term(user).await.map_err(|e| e.to_string())?;
        Ok((window, existing))
    }

    async fn trim(&self, user: &UserId) -> usize {
        match self.room.cleanup_if_needed(user).await {
            Ok(0) => 0,
            Ok(removed) => {
                self.event_bus.publish(DomainEvent::ShortTermTrimmed {
                    user_id: user.to_string(),
                    removed,
                    timestamp: Utc::now(),
                });
                removed
            }
            Err(e) => {
                warn!(user = %user, error = %e, "Short-term cleanup failed");
                0
            }
        }
    }

    fn publish_error(&self, context: &str, message: &str) {
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}
