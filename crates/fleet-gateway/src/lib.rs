//! In-process event bus.
//!
//! Fire-and-forget publish/subscribe over a `tokio::sync::broadcast`
//! channel, kept separate from the synchronous handler list below so
//! in-process reactions run even before any subscriber attaches. Handlers
//! are registered against a [`Gateway`] and awaited in registration order
//! on every publish; one handler failing does not block the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use fleet_core::types::Provider;

/// Closed vocabulary of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FleetEvent {
    WorkerAdded {
        worker_id: i64,
        provider: Provider,
    },
    WorkerDeleted {
        worker_id: i64,
        provider: Provider,
    },
    SessionStarted {
        worker_id: i64,
        session_id: i64,
        provider: Provider,
    },
    SessionTerminated {
        worker_id: i64,
        session_id: i64,
        reason: String,
    },
    QuotaWarning {
        worker_id: i64,
        percent: f64,
    },
    QuotaExhausted {
        worker_id: i64,
        provider: Provider,
    },
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub event: FleetEvent,
    pub at: DateTime<Utc>,
}

type Handler = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Typed pub/sub bus. Cloning shares the same broadcast channel and handler
/// list — the idiomatic way to hand the bus to multiple control loops
/// without a global singleton.
#[derive(Clone)]
pub struct Gateway {
    tx: broadcast::Sender<Envelope>,
    handlers: Arc<Mutex<Vec<Handler>>>,
}

impl Gateway {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to the raw broadcast stream (used by `fleet-runtime`'s
    /// status command to tail live events).
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Register a synchronous handler, invoked in registration order on
    /// every publish.
    pub async fn on_event(&self, handler: Handler) {
        self.handlers.lock().await.push(handler);
    }

    /// Publish an event. Fire-and-forget: broadcast send errors (no
    /// subscribers) are ignored, and each registered handler runs even if
    /// an earlier one panics-free-errors internally.
    pub async fn publish(&self, event: FleetEvent) {
        let envelope = Envelope {
            event,
            at: Utc::now(),
        };
        let _ = self.tx.send(envelope.clone());

        let handlers = self.handlers.lock().await;
        for handler in handlers.iter() {
            handler(envelope.clone());
        }
        if handlers.is_empty() {
            warn!(event = ?envelope.event, "fleet-gateway: no handlers registered");
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(256)
    }
}
