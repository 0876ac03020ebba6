//! Per-server circuit breakers.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: server assumed down, requests fail fast
//! - Half-Open: a single probe request tests whether the server recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: first is_open() check after next_retry_time
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (next_retry_time refreshed)
//! ```
//!
//! # Design Decisions
//! - Per-server breaker, entries created lazily on first failure
//! - A missing entry is equivalent to Closed with zero failures
//! - Single probe in Half-Open: only the caller that performs the transition
//!   proceeds, everyone else keeps seeing the breaker as open until the probe
//!   resolves or releases its slot
//! - DashMap gives per-key atomic updates without a registry-wide lock

use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::schema::BreakerConfig;
use crate::observability::metrics;
use crate::observability::{EventSink, ProxyEvent};

/// Breaker state of a single server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of a breaker entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    /// Only set while the breaker is open.
    pub next_retry_time: Option<Instant>,
}

#[derive(Debug, Default)]
struct BreakerEntry {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    next_retry_time: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerEntry {
    fn status(&self) -> BreakerStatus {
        BreakerStatus {
            state: self.state,
            failure_count: self.failure_count,
            last_failure_time: self.last_failure_time,
            next_retry_time: self.next_retry_time,
        }
    }
}

/// Registry of circuit breakers keyed by server id.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    entries: DashMap<String, BreakerEntry>,
    failure_threshold: u32,
    reset_timeout: Duration,
    events: EventSink,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: u32, reset_timeout: Duration, events: EventSink) -> Self {
        Self {
            entries: DashMap::new(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            events,
        }
    }

    pub fn from_config(config: &BreakerConfig, events: EventSink) -> Self {
        Self::new(
            config.failure_threshold,
            Duration::from_secs(config.reset_timeout_secs),
            events,
        )
    }

    /// Returns true if requests to `server_id` must be rejected.
    ///
    /// An open breaker whose retry time has passed moves to half-open here, and
    /// the caller that observed the transition is admitted as the probe.
    pub fn is_open(&self, server_id: &str) -> bool {
        self.admit(server_id) == Admission::Rejected
    }

    /// Admission decision for one call. A [`Admission::Probe`] caller owns the
    /// half-open slot and must hold a [`ProbeGuard`] until its outcome is
    /// recorded.
    pub fn admit(&self, server_id: &str) -> Admission {
        let Some(mut entry) = self.entries.get_mut(server_id) else {
            return Admission::Allowed;
        };

        match entry.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen => {
                if entry.probe_in_flight {
                    Admission::Rejected
                } else {
                    entry.probe_in_flight = true;
                    Admission::Probe
                }
            }
            CircuitState::Open => {
                let due = entry
                    .next_retry_time
                    .is_some_and(|retry_at| Instant::now() >= retry_at);
                if !due {
                    return Admission::Rejected;
                }
                entry.state = CircuitState::HalfOpen;
                entry.next_retry_time = None;
                entry.probe_in_flight = true;
                drop(entry);

                metrics::record_breaker_transition(server_id, CircuitState::HalfOpen.as_str());
                self.events.emit(ProxyEvent::BreakerHalfOpened {
                    server_id: server_id.to_string(),
                });
                Admission::Probe
            }
        }
    }

    /// Record a call-level success. Only a half-open breaker changes state.
    pub fn record_success(&self, server_id: &str) {
        let Some(mut entry) = self.entries.get_mut(server_id) else {
            return;
        };
        if entry.state != CircuitState::HalfOpen {
            return;
        }
        entry.state = CircuitState::Closed;
        entry.failure_count = 0;
        entry.next_retry_time = None;
        entry.probe_in_flight = false;
        drop(entry);

        metrics::record_breaker_transition(server_id, CircuitState::Closed.as_str());
        self.events.emit(ProxyEvent::BreakerClosed {
            server_id: server_id.to_string(),
        });
    }

    /// Record a call-level failure, opening the breaker once the threshold is
    /// reached. A failed half-open probe re-opens immediately.
    pub fn record_failure(&self, server_id: &str) {
        let now = Instant::now();
        let mut entry = self.entries.entry(server_id.to_string()).or_default();

        entry.failure_count = entry.failure_count.saturating_add(1);
        entry.last_failure_time = Some(now);

        let should_open = match entry.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => entry.failure_count >= self.failure_threshold,
            CircuitState::Open => false,
        };
        if !should_open {
            return;
        }

        entry.state = CircuitState::Open;
        entry.next_retry_time = Some(now + self.reset_timeout);
        entry.probe_in_flight = false;
        let failure_count = entry.failure_count;
        drop(entry);

        metrics::record_breaker_transition(server_id, CircuitState::Open.as_str());
        self.events.emit(ProxyEvent::BreakerOpened {
            server_id: server_id.to_string(),
            failure_count,
        });
    }

    /// Give up a half-open probe slot without an outcome (e.g. the probe was
    /// cancelled), letting the next caller probe instead.
    pub fn release_probe(&self, server_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(server_id) {
            if entry.state == CircuitState::HalfOpen {
                entry.probe_in_flight = false;
            }
        }
    }

    /// Administrative reset: forget everything about `server_id`.
    pub fn reset(&self, server_id: &str) {
        if self.entries.remove(server_id).is_some() {
            tracing::info!(%server_id, "Circuit breaker reset");
        }
    }

    pub fn status(&self, server_id: &str) -> BreakerStatus {
        self.entries
            .get(server_id)
            .map(|entry| entry.status())
            .unwrap_or_default()
    }

    /// All known entries, sorted by server id.
    pub fn snapshot(&self) -> Vec<(String, BreakerStatus)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Number of breakers currently in the open state.
    pub fn open_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.state == CircuitState::Open)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }
}

/// Outcome of [`CircuitBreakerRegistry::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed; the call proceeds.
    Allowed,
    /// The caller is the single half-open probe.
    Probe,
    /// Breaker open, or another probe is in flight.
    Rejected,
}

/// Holds a half-open probe slot. Dropping the guard before
/// [`settle`](Self::settle) releases the slot, so an abandoned probe never
/// leaves the breaker gated.
#[derive(Debug)]
pub struct ProbeGuard<'a> {
    breakers: &'a CircuitBreakerRegistry,
    server_id: &'a str,
    armed: bool,
}

impl<'a> ProbeGuard<'a> {
    /// Guard the slot if `admission` made the caller the probe.
    pub fn new(breakers: &'a CircuitBreakerRegistry, server_id: &'a str, admission: Admission) -> Self {
        Self {
            breakers,
            server_id,
            armed: admission == Admission::Probe,
        }
    }

    /// The probe's outcome was recorded; nothing to release.
    pub fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(server_id = %self.server_id, "Half-open probe abandoned");
            self.breakers.release_probe(self.server_id);
        }
    }
}
