//! Event emitter
//!
//! Ordered, sequential, at-least-once fan-out of run events to subscribers
//! (persistence, UIs, test harnesses). Listeners for a given event are
//! invoked strictly in subscription order and never interleaved with the
//! next event; a failing listener does not prevent later listeners from
//! seeing the event.

use crate::event::EventEnvelope;
use crate::types::EventId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;

/// A subscriber to the run's event stream
#[async_trait]
pub trait RunEventListener: Send + Sync {
    async fn on_event(&self, envelope: &EventEnvelope) -> Result<(), ListenerError>;
}

/// Opaque listener failure, surfaced in the aggregate
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Aggregate failure raised after every listener has run
#[derive(Debug, thiserror::Error)]
#[error("{} event listener(s) failed", .failures.len())]
pub struct EmitError {
    /// (subscription index, error message) per failed listener
    pub failures: Vec<(usize, String)>,
}

/// Sequential fan-out emitter
#[derive(Default)]
pub struct EventEmitter {
    listeners: Vec<Arc<dyn RunEventListener>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners are invoked in subscription order.
    pub fn subscribe(&mut self, listener: Arc<dyn RunEventListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Emit one envelope to all listeners.
    ///
    /// Assigns a fresh identity and timestamp (overwriting caller-set
    /// values), then invokes listeners one at a time. If any listener fails,
    /// the rest still run; the failures come back as one aggregate error.
    pub async fn emit(&self, envelope: &mut EventEnvelope) -> Result<(), EmitError> {
        envelope.id = EventId::new();
        envelope.occurred_at = SystemTime::now();

        let mut failures = Vec::new();
        for (index, listener) in self.listeners.iter().enumerate() {
            if let Err(err) = listener.on_event(envelope).await {
                tracing::warn!(index, error = %err, "event listener failed");
                failures.push((index, err.to_string()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EmitError { failures })
        }
    }
}
