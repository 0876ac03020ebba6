//! Error taxonomy for capability dispatch.
//!
//! Every failure is scoped to a single logical call. Attempt-level
//! [`ProxyError::Timeout`] and [`ProxyError::Transport`] are retried by the
//! executor; [`ProxyError::NoServerAvailable`] and [`ProxyError::CircuitOpen`]
//! are returned immediately and never retried.

use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`ServerDirectory`](crate::directory::ServerDirectory)
/// while delivering a single message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors surfaced by the dispatcher.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// No candidate server claims the capability (or the named server is unknown).
    #[error("no server available for {target}")]
    NoServerAvailable { target: String },

    /// The target's breaker is open; no network attempt was made.
    #[error("circuit open for server {server_id}")]
    CircuitOpen { server_id: String },

    /// A single attempt exceeded its deadline.
    #[error("request to {server_id} timed out after {timeout:?}")]
    Timeout { server_id: String, timeout: Duration },

    /// The underlying send failed.
    #[error("transport error from {server_id}: {source}")]
    Transport {
        server_id: String,
        #[source]
        source: TransportError,
    },

    /// The caller cancelled the request.
    #[error("request {request_id} cancelled")]
    Cancelled { request_id: String },

    /// Every failover candidate failed or was gated.
    #[error("all {attempts} failover attempts exhausted for {capability}{}", last_error_suffix(.last_error))]
    AllFailoverAttemptsExhausted {
        capability: String,
        attempts: usize,
        last_error: Option<Box<ProxyError>>,
    },
}

fn last_error_suffix(last: &Option<Box<ProxyError>>) -> String {
    match last {
        Some(err) => format!(": {err}"),
        None => String::new(),
    }
}

impl ProxyError {
    /// Stable machine-readable name, used in API bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::NoServerAvailable { .. } => "no_server_available",
            ProxyError::CircuitOpen { .. } => "circuit_open",
            ProxyError::Timeout { .. } => "timeout",
            ProxyError::Transport { .. } => "transport_error",
            ProxyError::Cancelled { .. } => "cancelled",
            ProxyError::AllFailoverAttemptsExhausted { .. } => "all_failover_attempts_exhausted",
        }
    }

    /// Whether the executor may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProxyError::Timeout { .. } | ProxyError::Transport { .. })
    }
}
