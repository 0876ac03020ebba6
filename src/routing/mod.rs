//! Capability routing subsystem.
//!
//! # Data Flow
//! ```text
//! Capability call (name, requirements)
//!     → CapabilityMatcher::find_servers / find_best
//!     → matcher.rs (evaluate capability + label filters)
//!     → Return: ranked server ids, best first
//! ```
//!
//! # Design Decisions
//! - Ranking is deterministic: same input, same order
//! - The dispatcher owns gating and retries; matchers only rank

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod matcher;

pub use matcher::StaticMatcher;

/// Requirement filters attached to a capability call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    /// Labels a candidate must carry with exactly these values.
    pub labels: BTreeMap<String, String>,
}

impl Requirements {
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Ranks servers able to perform a capability.
pub trait CapabilityMatcher: Send + Sync {
    /// Candidate server ids, best first.
    fn find_servers(&self, capability: &str, requirements: Option<&Requirements>) -> Vec<String>;

    /// The single best candidate, if any.
    fn find_best(&self, capability: &str, requirements: Option<&Requirements>) -> Option<String> {
        self.find_servers(capability, requirements).into_iter().next()
    }
}
