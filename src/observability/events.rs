//! Proxy notifications.
//!
//! Dispatch outcomes are delivered through return values; these events only
//! mirror what happened for observers. Every event is logged, then broadcast
//! to subscribers. Sending never blocks and a missing subscriber is not an
//! error.

use serde::Serialize;
use tokio::sync::broadcast;

/// Default capacity of the event broadcast buffer.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Observable notification emitted by the dispatcher and its components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProxyEvent {
    RequestStarted {
        request_id: String,
        server_id: String,
        capability: String,
    },
    RequestSucceeded {
        request_id: String,
        server_id: String,
        capability: String,
        duration_ms: u64,
    },
    RequestFailed {
        request_id: String,
        server_id: String,
        capability: String,
        error: String,
    },
    RetryAttempted {
        server_id: String,
        attempt: u32,
        error: String,
    },
    BreakerOpened {
        server_id: String,
        failure_count: u32,
    },
    BreakerHalfOpened {
        server_id: String,
    },
    BreakerClosed {
        server_id: String,
    },
    FailoverAttemptFailed {
        capability: String,
        server_id: String,
        error: String,
    },
}

/// Cloneable handle used by components to publish [`ProxyEvent`]s.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<ProxyEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ProxyEvent) {
        log_event(&event);
        let _ = self.tx.send(event);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

fn log_event(event: &ProxyEvent) {
    match event {
        ProxyEvent::RequestStarted { request_id, server_id, capability } => {
            tracing::debug!(%request_id, %server_id, %capability, "Request started");
        }
        ProxyEvent::RequestSucceeded { request_id, server_id, capability, duration_ms } => {
            tracing::debug!(%request_id, %server_id, %capability, duration_ms, "Request succeeded");
        }
        ProxyEvent::RequestFailed { request_id, server_id, capability, error } => {
            tracing::warn!(%request_id, %server_id, %capability, %error, "Request failed");
        }
        ProxyEvent::RetryAttempted { server_id, attempt, error } => {
            tracing::info!(%server_id, attempt, %error, "Retrying request");
        }
        ProxyEvent::BreakerOpened { server_id, failure_count } => {
            tracing::warn!(%server_id, failure_count, "Circuit breaker opened");
        }
        ProxyEvent::BreakerHalfOpened { server_id } => {
            tracing::info!(%server_id, "Circuit breaker half-open, probing");
        }
        ProxyEvent::BreakerClosed { server_id } => {
            tracing::info!(%server_id, "Circuit breaker closed");
        }
        ProxyEvent::FailoverAttemptFailed { capability, server_id, error } => {
            tracing::warn!(%capability, %server_id, %error, "Failover attempt failed");
        }
    }
}
