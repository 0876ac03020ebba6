//! Proxy dispatcher: capability calls across candidate servers.
//!
//! # Strategies
//! - Single: best candidate only, fail fast when gated
//! - Parallel: every candidate concurrently, outcomes returned as data
//! - Failover: candidates one at a time in rank order until one succeeds
//! - Direct: a named server, bypassing capability matching
//!
//! All strategies share the same per-server path: breaker admission, request
//! tracking, then the retry executor.

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::ProxyConfig;
use crate::directory::ServerDirectory;
use crate::dispatch::tracker::{InFlightRequest, RequestTracker};
use crate::dispatch::{CallOptions, ServerOutcome};
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::observability::{EventSink, ProxyEvent};
use crate::resilience::{
    Admission, BreakerStatus, CircuitBreakerRegistry, ProbeGuard, RetryExecutor, RetryPolicy,
};
use crate::routing::CapabilityMatcher;

/// Capability label used to track [`Dispatcher::send_message`] requests.
pub const DIRECT_CAPABILITY: &str = "direct";

/// Tunables for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub policy: RetryPolicy,
    pub event_buffer: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            policy: RetryPolicy::default(),
            event_buffer: crate::observability::events::DEFAULT_EVENT_BUFFER,
        }
    }
}

impl DispatcherSettings {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            failure_threshold: config.breaker.failure_threshold,
            reset_timeout: Duration::from_secs(config.breaker.reset_timeout_secs),
            policy: RetryPolicy::from_config(&config.retries, &config.timeouts),
            event_buffer: config.observability.event_buffer,
        }
    }
}

/// Counters reported by [`Dispatcher::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProxyStats {
    pub total_requests: u64,
    pub in_flight: usize,
    pub open_breakers: usize,
    pub total_breakers: usize,
}

/// Routes capability calls to servers.
pub struct Dispatcher {
    matcher: Arc<dyn CapabilityMatcher>,
    directory: Arc<dyn ServerDirectory>,
    breakers: Arc<CircuitBreakerRegistry>,
    tracker: RequestTracker,
    executor: RetryExecutor,
    events: EventSink,
    defaults: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        matcher: Arc<dyn CapabilityMatcher>,
        directory: Arc<dyn ServerDirectory>,
        settings: DispatcherSettings,
    ) -> Self {
        let events = EventSink::new(settings.event_buffer);
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            settings.failure_threshold,
            settings.reset_timeout,
            events.clone(),
        ));
        let executor = RetryExecutor::new(directory.clone(), breakers.clone(), events.clone());

        Self {
            matcher,
            directory,
            breakers,
            tracker: RequestTracker::new(),
            executor,
            events,
            defaults: settings.policy,
        }
    }

    /// Call the best server for `capability`.
    pub async fn execute_capability(
        &self,
        capability: &str,
        params: Value,
        options: &CallOptions,
    ) -> Result<Value, ProxyError> {
        let start = Instant::now();
        let result = self.execute_single(capability, params, options).await;
        metrics::record_request("single", outcome_label(&result), start.elapsed());
        result
    }

    async fn execute_single(
        &self,
        capability: &str,
        params: Value,
        options: &CallOptions,
    ) -> Result<Value, ProxyError> {
        let server_id = self
            .matcher
            .find_best(capability, options.requirements.as_ref())
            .ok_or_else(|| ProxyError::NoServerAvailable {
                target: capability.to_string(),
            })?;

        let message = capability_message(capability, params);
        let policy = options.policy(&self.defaults);
        self.call_server(&server_id, capability, &message, &policy).await
    }

    /// Call every matching server concurrently (capped at `max_servers`).
    ///
    /// Never fails as a whole: each server yields one [`ServerOutcome`], and
    /// gated servers show up as failed `CircuitOpen` outcomes.
    pub async fn execute_capability_parallel(
        &self,
        capability: &str,
        params: Value,
        options: &CallOptions,
    ) -> Vec<ServerOutcome> {
        let start = Instant::now();
        let mut servers = self
            .matcher
            .find_servers(capability, options.requirements.as_ref());
        if let Some(max) = options.max_servers.filter(|&max| max > 0) {
            servers.truncate(max);
        }
        if servers.is_empty() {
            tracing::warn!(%capability, "No servers matched for parallel dispatch");
        }

        let message = capability_message(capability, params);
        let policy = options.policy(&self.defaults);
        let (message, policy) = (&message, &policy);

        let branches = servers.into_iter().map(|server_id| async move {
            let result = self.call_server(&server_id, capability, message, policy).await;
            ServerOutcome { server_id, result }
        });
        let outcomes = join_all(branches).await;

        let label = if outcomes.iter().any(ServerOutcome::is_success) {
            "success"
        } else {
            "failure"
        };
        metrics::record_request("parallel", label, start.elapsed());
        outcomes
    }

    /// Try candidates strictly in rank order until one succeeds.
    ///
    /// Gated candidates are skipped without counting as attempts. Cancelling
    /// the current attempt stops the whole failover.
    pub async fn execute_capability_with_failover(
        &self,
        capability: &str,
        params: Value,
        options: &CallOptions,
    ) -> Result<Value, ProxyError> {
        let start = Instant::now();
        let result = self.execute_failover(capability, params, options).await;
        metrics::record_request("failover", outcome_label(&result), start.elapsed());
        result
    }

    async fn execute_failover(
        &self,
        capability: &str,
        params: Value,
        options: &CallOptions,
    ) -> Result<Value, ProxyError> {
        let candidates = self
            .matcher
            .find_servers(capability, options.requirements.as_ref());
        if candidates.is_empty() {
            return Err(ProxyError::NoServerAvailable {
                target: capability.to_string(),
            });
        }

        let message = capability_message(capability, params);
        let policy = options.policy(&self.defaults);
        let mut attempts = 0;
        let mut last_error = None;

        for server_id in &candidates {
            let admission = self.breakers.admit(server_id);
            if admission == Admission::Rejected {
                tracing::debug!(%capability, %server_id, "Skipping gated failover candidate");
                continue;
            }
            let probe = ProbeGuard::new(&self.breakers, server_id, admission);
            attempts += 1;

            match self
                .dispatch_admitted(server_id, capability, &message, &policy, probe)
                .await
            {
                Ok(value) => return Ok(value),
                Err(err @ ProxyError::Cancelled { .. }) => return Err(err),
                Err(err) => {
                    self.events.emit(ProxyEvent::FailoverAttemptFailed {
                        capability: capability.to_string(),
                        server_id: server_id.clone(),
                        error: err.to_string(),
                    });
                    last_error = Some(Box::new(err));
                }
            }
        }

        Err(ProxyError::AllFailoverAttemptsExhausted {
            capability: capability.to_string(),
            attempts,
            last_error,
        })
    }

    /// Send `message` to a named server, bypassing capability matching.
    pub async fn send_message(
        &self,
        server_id: &str,
        message: Value,
        options: &CallOptions,
    ) -> Result<Value, ProxyError> {
        let start = Instant::now();
        let result = if self.directory.is_reachable(server_id) {
            let policy = options.policy(&self.defaults);
            self.call_server(server_id, DIRECT_CAPABILITY, &message, &policy).await
        } else {
            Err(ProxyError::NoServerAvailable {
                target: server_id.to_string(),
            })
        };
        metrics::record_request("direct", outcome_label(&result), start.elapsed());
        result
    }

    pub fn cancel_request(&self, request_id: &str) -> bool {
        self.tracker.cancel(request_id)
    }

    /// Cancel every in-flight request, e.g. on shutdown.
    pub fn cancel_all(&self) -> usize {
        self.tracker.cancel_all()
    }

    pub fn in_flight_requests(&self) -> Vec<InFlightRequest> {
        self.tracker.list()
    }

    pub fn circuit_breaker_status(&self, server_id: &str) -> BreakerStatus {
        self.breakers.status(server_id)
    }

    pub fn circuit_breakers(&self) -> Vec<(String, BreakerStatus)> {
        self.breakers.snapshot()
    }

    pub fn reset_circuit_breaker(&self, server_id: &str) {
        self.breakers.reset(server_id);
    }

    pub fn stats(&self) -> ProxyStats {
        ProxyStats {
            total_requests: self.tracker.total_started(),
            in_flight: self.tracker.in_flight(),
            open_breakers: self.breakers.open_count(),
            total_breakers: self.breakers.len(),
        }
    }

    /// Subscribe to dispatcher notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.events.subscribe()
    }

    /// Breaker admission, then dispatch.
    async fn call_server(
        &self,
        server_id: &str,
        capability: &str,
        message: &Value,
        policy: &RetryPolicy,
    ) -> Result<Value, ProxyError> {
        let admission = self.breakers.admit(server_id);
        if admission == Admission::Rejected {
            tracing::debug!(%server_id, %capability, "Circuit open, failing fast");
            return Err(ProxyError::CircuitOpen {
                server_id: server_id.to_string(),
            });
        }
        let probe = ProbeGuard::new(&self.breakers, server_id, admission);
        self.dispatch_admitted(server_id, capability, message, policy, probe)
            .await
    }

    /// Track and execute a request the breaker already admitted.
    ///
    /// The executor records the breaker outcome once the send settles. If this
    /// future is dropped first, `probe` hands the half-open slot back.
    async fn dispatch_admitted(
        &self,
        server_id: &str,
        capability: &str,
        message: &Value,
        policy: &RetryPolicy,
        probe: ProbeGuard<'_>,
    ) -> Result<Value, ProxyError> {
        let request = self.tracker.begin(server_id, capability);
        let request_id = request.id().to_string();
        self.events.emit(ProxyEvent::RequestStarted {
            request_id: request_id.clone(),
            server_id: server_id.to_string(),
            capability: capability.to_string(),
        });

        let start = Instant::now();
        let result = self
            .executor
            .send(server_id, message, policy, &request_id, request.token())
            .await;
        probe.settle();
        drop(request);

        match &result {
            Ok(_) => self.events.emit(ProxyEvent::RequestSucceeded {
                request_id,
                server_id: server_id.to_string(),
                capability: capability.to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            }),
            Err(err) => self.events.emit(ProxyEvent::RequestFailed {
                request_id,
                server_id: server_id.to_string(),
                capability: capability.to_string(),
                error: err.to_string(),
            }),
        }
        result
    }
}

fn capability_message(capability: &str, params: Value) -> Value {
    json!({ "capability": capability, "params": params })
}

fn outcome_label(result: &Result<Value, ProxyError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(err) => err.kind(),
    }
}
