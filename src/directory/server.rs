//! A single backend server known to the directory.
//!
//! # Responsibilities
//! - Carry the server's id, endpoint, claimed capabilities and labels
//! - Track reachability (Unknown/Healthy/Unhealthy) with hysteresis

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use url::Url;

use crate::config::ServerConfig;

/// Reachability state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

/// A backend server and its live reachability state.
#[derive(Debug)]
pub struct Server {
    pub id: String,
    /// Endpoint that receives dispatched messages.
    pub url: Url,
    pub capabilities: Vec<String>,
    pub labels: BTreeMap<String, String>,
    /// Higher ranks first when several servers match.
    pub priority: i32,

    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl Server {
    pub fn new(id: impl Into<String>, url: Url, capabilities: Vec<String>) -> Self {
        Self {
            id: id.into(),
            url,
            capabilities,
            labels: BTreeMap::new(),
            priority: 0,
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, url::ParseError> {
        let url = Url::parse(&config.url)?;
        let mut server = Self::new(config.id.clone(), url, config.capabilities.clone());
        server.labels = config.labels.clone();
        server.priority = config.priority;
        Ok(server)
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn health(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Healthy or Unknown servers are reachable.
    pub fn is_reachable(&self) -> bool {
        self.health() != HealthState::Unhealthy
    }

    /// Report a successful probe. Returns true if the server became Healthy.
    pub fn mark_success(&self, healthy_threshold: usize) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.health() == HealthState::Healthy {
            return false;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Report a failed probe. Returns true if the server became Unhealthy.
    pub fn mark_failure(&self, unhealthy_threshold: usize) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        if self.health() == HealthState::Unhealthy {
            return false;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Server {
        Server::new(
            "a",
            Url::parse("http://127.0.0.1:3000/rpc").unwrap(),
            vec!["search".into()],
        )
    }

    #[test]
    fn unknown_counts_as_reachable() {
        let s = server();
        assert_eq!(s.health(), HealthState::Unknown);
        assert!(s.is_reachable());
        assert!(s.supports("search"));
        assert!(!s.supports("index"));
    }

    #[test]
    fn hysteresis() {
        let s = server();
        assert!(!s.mark_failure(2));
        assert!(s.is_reachable());
        assert!(s.mark_failure(2));
        assert!(!s.is_reachable());

        // a single success is not enough to recover
        assert!(!s.mark_success(2));
        assert!(!s.is_reachable());
        assert!(s.mark_success(2));
        assert_eq!(s.health(), HealthState::Healthy);
    }

    #[test]
    fn failure_streak_resets_on_success() {
        let s = server();
        s.mark_failure(2);
        s.mark_success(1);
        assert!(!s.mark_failure(2));
        assert!(s.is_reachable());
    }
}
