//! Timeout/retry executor.
//!
//! # Responsibilities
//! - Bound every attempt with a deadline (timeouts.rs)
//! - Retry timeouts and transport failures with linear backoff (backoff.rs)
//! - Report exactly one outcome per logical send to the breaker registry
//!
//! # Design Decisions
//! - Only the terminal error is surfaced; intermediate errors are only
//!   visible as retry events
//! - A cancelled send records no outcome, it only frees a half-open probe slot

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::schema::{RetryConfig, TimeoutConfig};
use crate::directory::ServerDirectory;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::observability::{EventSink, ProxyEvent};
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;
use crate::resilience::timeouts::{bounded, cancellable_sleep};

/// Deadline and retry bounds for one logical send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline of each individual attempt.
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base of the linear backoff.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(retries: &RetryConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            timeout: Duration::from_secs(timeouts.request_secs),
            max_attempts: retries.max_attempts,
            base_delay: Duration::from_millis(retries.base_delay_ms),
        }
    }
}

/// Wraps [`ServerDirectory::send`] with deadlines, retries and breaker reporting.
#[derive(Clone)]
pub struct RetryExecutor {
    directory: Arc<dyn ServerDirectory>,
    breakers: Arc<CircuitBreakerRegistry>,
    events: EventSink,
}

impl RetryExecutor {
    pub fn new(
        directory: Arc<dyn ServerDirectory>,
        breakers: Arc<CircuitBreakerRegistry>,
        events: EventSink,
    ) -> Self {
        Self {
            directory,
            breakers,
            events,
        }
    }

    /// Send `message` to `server_id`, retrying per `policy` until success,
    /// a non-retryable error, exhaustion or cancellation.
    pub async fn send(
        &self,
        server_id: &str,
        message: &Value,
        policy: &RetryPolicy,
        request_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value, ProxyError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        let outcome = loop {
            let result = bounded(self.directory.send(server_id, message), policy.timeout, cancel)
                .await
                .into_result(server_id, request_id, policy.timeout);

            match result {
                Ok(value) => break Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    attempt += 1;
                    metrics::record_retry(server_id);
                    self.events.emit(ProxyEvent::RetryAttempted {
                        server_id: server_id.to_string(),
                        attempt,
                        error: err.to_string(),
                    });

                    let delay = calculate_backoff(attempt, policy.base_delay);
                    if !cancellable_sleep(delay, cancel).await {
                        break Err(ProxyError::Cancelled {
                            request_id: request_id.to_string(),
                        });
                    }
                }
                Err(err) => break Err(err),
            }
        };

        match &outcome {
            Ok(_) => self.breakers.record_success(server_id),
            Err(ProxyError::Cancelled { .. }) => self.breakers.release_probe(server_id),
            Err(_) => self.breakers.record_failure(server_id),
        }
        outcome
    }
}
