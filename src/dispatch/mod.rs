//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Capability call (name, params, options)
//!     → routing (ranked candidate servers)
//!     → resilience::circuit_breaker (admission per server)
//!     → tracker.rs (register request, cancellation token)
//!     → resilience::retries (deadline + retries via the directory)
//!     → tracker.rs (unregister) → result / error / outcomes
//! ```

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;

use crate::error::ProxyError;
use crate::resilience::RetryPolicy;
use crate::routing::Requirements;

pub mod dispatcher;
pub mod tracker;

pub use dispatcher::{Dispatcher, DispatcherSettings, ProxyStats};
pub use tracker::{InFlightRequest, RequestTracker, TrackedRequest};

/// Per-call overrides. Unset fields fall back to the dispatcher defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub retry_attempts: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub requirements: Option<Requirements>,
    /// Cap on servers contacted by parallel dispatch. Zero means no cap.
    pub max_servers: Option<usize>,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = Some(requirements);
        self
    }

    pub fn with_max_servers(mut self, max: usize) -> Self {
        self.max_servers = Some(max);
        self
    }

    /// Effective retry policy for this call.
    pub fn policy(&self, defaults: &RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            timeout: self.timeout.unwrap_or(defaults.timeout),
            max_attempts: self.retry_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self.retry_delay.unwrap_or(defaults.base_delay),
        }
    }
}

/// Result of one branch of a parallel dispatch.
#[derive(Debug, Clone)]
pub struct ServerOutcome {
    pub server_id: String,
    pub result: Result<Value, ProxyError>,
}

impl ServerOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl Serialize for ServerOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Record<'a> {
            server_id: &'a str,
            success: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            result: Option<&'a Value>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<String>,
        }

        Record {
            server_id: &self.server_id,
            success: self.is_success(),
            result: self.result.as_ref().ok(),
            error: self.result.as_ref().err().map(|e| e.to_string()),
        }
        .serialize(serializer)
    }
}
