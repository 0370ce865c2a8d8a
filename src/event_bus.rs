use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Events that can be emitted by components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // API events
    ApiCallStarted {
        provider: String,
        model: String,
    },
    ApiCallCompleted {
        provider: String,
        attempt: u32,
    },
    ApiError {
        provider: String,
        error: String,
    },

    // Intent events
    IntentParsed {
        function: String,
        source: String,
    },
    IntentUnrecognized {
        reply: String,
    },
    InvalidArgument {
        function: String,
        detail: String,
    },

    // Store events
    TodoCreated {
        id: i64,
    },
    TodoDeleted {
        id: i64,
    },
    TodosListed {
        count: usize,
    },
    TodosSearched {
        query: String,
        count: usize,
    },
    StoreError {
        error: String,
    },
}

/// Event bus for component communication
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    metrics: Arc<RwLock<Metrics>>,
}

/// Accumulated metrics from events
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Metrics {
    pub api_calls: usize,
    pub api_errors: usize,
    pub intents_dispatched: usize,
    pub intents_unrecognized: usize,
    pub invalid_arguments: usize,
    pub store_errors: usize,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            metrics: Arc::new(RwLock::new(Metrics::default())),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    pub async fn emit(&self, event: Event) -> Result<()> {
        self.update_metrics(&event).await;

        // No receivers is fine
        let _ = self.sender.send(event);
        Ok(())
    }

    /// Get current metrics
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.read().await.clone()
    }

    async fn update_metrics(&self, event: &Event) {
        let mut metrics = self.metrics.write().await;

        match event {
            Event::ApiCallStarted { .. } => metrics.api_calls += 1,
            Event::ApiError { .. } => metrics.api_errors += 1,
            Event::IntentParsed { .. } => metrics.intents_dispatched += 1,
            Event::IntentUnrecognized { .. } => metrics.intents_unrecognized += 1,
            Event::InvalidArgument { .. } => metrics.invalid_arguments += 1,
            Event::StoreError { .. } => metrics.store_errors += 1,
            _ => {}
        }
    }
}

/// Log every event at debug level until the bus is dropped.
pub fn spawn_event_logger(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => debug!("event: {:?}", event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("event logger skipped {} events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_emission() {
        let bus = EventBus::new(100);
        let mut receiver = bus.subscribe();

        bus.emit(Event::TodoCreated { id: 7 }).await.unwrap();

        let received = receiver.recv().await.unwrap();
        match received {
            Event::TodoCreated { id } => {
                assert_eq!(id, 7);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[tokio::test]
    async fn test_metrics_update() {
        let bus = EventBus::new(100);

        bus.emit(Event::ApiCallStarted {
            provider: "gemini".to_string(),
            model: "gemini-1.5-flash".to_string(),
        })
        .await
        .unwrap();
        bus.emit(Event::IntentUnrecognized {
            reply: "hello".to_string(),
        })
        .await
        .unwrap();

        let metrics = bus.get_metrics().await;
        assert_eq!(metrics.api_calls, 1);
        assert_eq!(metrics.intents_unrecognized, 1);
        assert_eq!(metrics.intents_dispatched, 0);
    }
}
