//! Server matching logic.
//!
//! # Responsibilities
//! - Match a claimed capability (exact, case-sensitive)
//! - Match requirement labels (exact key/value)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Empty requirements = always matches
//! - No regex, matching is linear in the number of servers

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::directory::{Server, ServerPool};
use crate::routing::{CapabilityMatcher, Requirements};

/// Condition evaluated against a server.
pub trait ServerFilter: Send + Sync + std::fmt::Debug {
    fn matches(&self, server: &Server) -> bool;
}

/// Matches servers claiming a capability.
#[derive(Debug, Clone)]
pub struct CapabilityFilter {
    capability: String,
}

impl CapabilityFilter {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
        }
    }
}

impl ServerFilter for CapabilityFilter {
    fn matches(&self, server: &Server) -> bool {
        server.supports(&self.capability)
    }
}

/// Matches servers carrying every required label.
#[derive(Debug, Clone)]
pub struct LabelFilter {
    labels: BTreeMap<String, String>,
}

impl LabelFilter {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }
}

impl ServerFilter for LabelFilter {
    fn matches(&self, server: &Server) -> bool {
        self.labels
            .iter()
            .all(|(key, value)| server.labels.get(key) == Some(value))
    }
}

/// Combines filters with AND semantics.
#[derive(Debug)]
pub struct AndFilter {
    filters: Vec<Box<dyn ServerFilter>>,
}

impl AndFilter {
    pub fn new(filters: Vec<Box<dyn ServerFilter>>) -> Self {
        Self { filters }
    }
}

impl ServerFilter for AndFilter {
    fn matches(&self, server: &Server) -> bool {
        self.filters.iter().all(|f| f.matches(server))
    }
}

/// [`CapabilityMatcher`] over a static [`ServerPool`].
///
/// Ranking is by priority (highest first), ties keep configuration order.
/// Servers the health monitor marked unreachable are not offered.
#[derive(Debug, Clone)]
pub struct StaticMatcher {
    pool: Arc<ServerPool>,
}

impl StaticMatcher {
    pub fn new(pool: Arc<ServerPool>) -> Self {
        Self { pool }
    }

    fn filter_for(capability: &str, requirements: Option<&Requirements>) -> AndFilter {
        let mut filters: Vec<Box<dyn ServerFilter>> = vec![Box::new(CapabilityFilter::new(capability))];
        if let Some(req) = requirements.filter(|r| !r.is_empty()) {
            filters.push(Box::new(LabelFilter::new(req.labels.clone())));
        }
        AndFilter::new(filters)
    }
}

impl CapabilityMatcher for StaticMatcher {
    fn find_servers(&self, capability: &str, requirements: Option<&Requirements>) -> Vec<String> {
        let filter = Self::filter_for(capability, requirements);
        let mut matched: Vec<&Arc<Server>> = self
            .pool
            .all()
            .iter()
            .filter(|s| s.is_reachable() && filter.matches(s))
            .collect();
        // stable sort keeps configuration order among equal priorities
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched.into_iter().map(|s| s.id.clone()).collect()
    }
}
