use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::AssistantError;
use crate::event_bus::{Event, EventBus};

/// One entry of a chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Trait representing an LLM provider.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Name of the provider.
    fn name(&self) -> &str;

    /// Model name of the provider.
    fn model_name(&self) -> &str {
        "Unknown"
    }

    /// Send the whole transcript and return the model's next reply.
    async fn send_messages(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Offline provider that maps simple commands onto function envelopes.
///
/// Understands `add <text>`, `delete <id>`, `list`, `search <text>` and answers
/// observations with an output envelope. Anything else gets a conversational reply.
pub struct LocalProvider;

#[async_trait]
impl LLMProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn model_name(&self) -> &str {
        "keywords"
    }

    async fn send_messages(&self, messages: &[ChatMessage]) -> Result<String> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.trim())
            .unwrap_or_default();

        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(last) {
            if let Some(observation) = map.get("observation") {
                let text = match observation {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Ok(serde_json::json!({
                    "type": "output",
                    "output": format!("Done. Result: {}", text),
                })
                .to_string());
            }
        }

        let (verb, rest) = match last.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb.to_lowercase(), rest.trim()),
            None => (last.to_lowercase(), ""),
        };
        let envelope = |function: &str, input: &str| {
            serde_json::json!({ "function": function, "input": input }).to_string()
        };

        let reply = match verb.as_str() {
            "add" | "create" if !rest.is_empty() => envelope("createTodo", rest),
            "delete" | "remove" if !rest.is_empty() => format!("deleteTodoById({})", rest),
            "list" | "show" => envelope("getAllTodos", ""),
            "search" | "find" if !rest.is_empty() => envelope("searchTodo", rest),
            _ => "I can add, delete, list or search todos. Try \"add buy milk\".".to_string(),
        };
        Ok(reply)
    }
}

/// Owns the active provider and applies the timeout and retry policy.
pub struct LLMManager {
    providers: Vec<Box<dyn LLMProvider>>,
    event_bus: Option<Arc<EventBus>>,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl LLMManager {
    /// Create a new manager with the given providers. The first one is used.
    pub fn new(providers: Vec<Box<dyn LLMProvider>>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            providers,
            event_bus: None,
            timeout,
            max_retries,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Get the active provider.
    pub fn provider(&self) -> Option<&dyn LLMProvider> {
        self.providers.first().map(|p| &**p)
    }

    /// Send the transcript to the active provider, retrying failures and timeouts.
    pub async fn send(&self, messages: &[ChatMessage]) -> Result<String, AssistantError> {
        let provider = self
            .provider()
            .ok_or_else(|| AssistantError::Upstream("no providers available".to_string()))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.emit(Event::ApiCallStarted {
                provider: provider.name().to_string(),
                model: provider.model_name().to_string(),
            })
            .await;

            let err = match tokio::time::timeout(self.timeout, provider.send_messages(messages)).await
            {
                Ok(Ok(reply)) => {
                    self.emit(Event::ApiCallCompleted {
                        provider: provider.name().to_string(),
                        attempt,
                    })
                    .await;
                    return Ok(reply);
                }
                Ok(Err(e)) => AssistantError::Upstream(format!("{:#}", e)),
                Err(_) => AssistantError::UpstreamTimeout(self.timeout.as_secs()),
            };

            self.emit(Event::ApiError {
                provider: provider.name().to_string(),
                error: err.to_string(),
            })
            .await;

            if attempt > self.max_retries || !err.is_retryable() {
                warn!("{} failed after {} attempt(s): {}", provider.name(), attempt, err);
                return Err(err);
            }
            debug!("Retrying {} after error: {}", provider.name(), err);
            tokio::time::sleep(self.retry_backoff * attempt).await;
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(event).await;
        }
    }
}
