//! In-flight request registry.
//!
//! # Responsibilities
//! - Assign unique request ids
//! - Hold a cancellation token per in-flight request
//! - Cancel by id and list in-flight requests for introspection
//!
//! Ids combine a per-tracker monotonic counter, the wall-clock start time and
//! a random suffix, so concurrent `begin` calls never collide.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;

#[derive(Debug)]
struct Entry {
    server_id: String,
    capability: String,
    started_at_ms: u64,
    started: Instant,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    requests: DashMap<String, Entry>,
    counter: AtomicU64,
}

impl Inner {
    fn remove(&self, request_id: &str) -> Option<Entry> {
        let removed = self.requests.remove(request_id).map(|(_, entry)| entry);
        if removed.is_some() {
            metrics::record_in_flight(self.requests.len());
        }
        removed
    }
}

/// Snapshot of one in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlightRequest {
    pub id: String,
    pub server_id: String,
    pub capability: String,
    /// Start time, milliseconds since the Unix epoch.
    pub started_at_ms: u64,
    pub elapsed_ms: u64,
}

/// Concurrent registry of in-flight requests.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    inner: Arc<Inner>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new in-flight request. The entry is removed when the
    /// returned guard drops, or earlier through [`end`](Self::end) or
    /// [`cancel`](Self::cancel).
    pub fn begin(&self, server_id: &str, capability: &str) -> TrackedRequest {
        let seq = self.inner.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let id = format!("req-{seq}-{started_at_ms}-{:08x}", fastrand::u32(..));
        let token = CancellationToken::new();

        self.inner.requests.insert(
            id.clone(),
            Entry {
                server_id: server_id.to_string(),
                capability: capability.to_string(),
                started_at_ms,
                started: Instant::now(),
                token: token.clone(),
            },
        );
        metrics::record_in_flight(self.inner.requests.len());

        TrackedRequest {
            id,
            token,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Remove a request. Idempotent.
    pub fn end(&self, request_id: &str) {
        self.inner.remove(request_id);
    }

    /// Signal a request's cancellation token and forget it.
    /// Returns false if the request already settled or never existed.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.inner.remove(request_id) {
            Some(entry) => {
                entry.token.cancel();
                tracing::info!(%request_id, server_id = %entry.server_id, "Request cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight request. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.inner.requests.iter().map(|r| r.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn list(&self) -> Vec<InFlightRequest> {
        let mut all: Vec<_> = self
            .inner
            .requests
            .iter()
            .map(|item| {
                let entry = item.value();
                InFlightRequest {
                    id: item.key().clone(),
                    server_id: entry.server_id.clone(),
                    capability: entry.capability.clone(),
                    started_at_ms: entry.started_at_ms,
                    elapsed_ms: entry.started.elapsed().as_millis() as u64,
                }
            })
            .collect();
        all.sort_by_key(|r| r.started_at_ms);
        all
    }

    pub fn in_flight(&self) -> usize {
        self.inner.requests.len()
    }

    /// Requests started since this tracker was created.
    pub fn total_started(&self) -> u64 {
        self.inner.counter.load(Ordering::Relaxed)
    }
}

/// Guard for one tracked request. Unregisters the request on drop.
#[derive(Debug)]
pub struct TrackedRequest {
    id: String,
    token: CancellationToken,
    inner: Arc<Inner>,
}

impl TrackedRequest {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for TrackedRequest {
    fn drop(&mut self) {
        self.inner.remove(&self.id);
    }
}
