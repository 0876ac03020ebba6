//! Server table built from configuration.
//!
//! # Responsibilities
//! - Hold every configured server in configuration order
//! - Look servers up by id
//! - Answer reachability for the directory and the matcher

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::directory::server::Server;

/// Immutable collection of servers with live reachability state.
#[derive(Debug, Default)]
pub struct ServerPool {
    servers: Vec<Arc<Server>>,
    by_id: HashMap<String, usize>,
}

impl ServerPool {
    /// Build the pool from configuration. Servers with an unparsable URL are
    /// skipped with a warning; validation normally rejects them earlier.
    pub fn from_config(configs: &[ServerConfig]) -> Self {
        let mut pool = Self::default();
        for config in configs {
            match Server::from_config(config) {
                Ok(server) => pool.insert(server),
                Err(e) => {
                    tracing::warn!(server_id = %config.id, url = %config.url, error = %e, "Invalid server url");
                }
            }
        }
        pool
    }

    pub fn from_servers(servers: impl IntoIterator<Item = Server>) -> Self {
        let mut pool = Self::default();
        for server in servers {
            pool.insert(server);
        }
        pool
    }

    fn insert(&mut self, server: Server) {
        if self.by_id.contains_key(&server.id) {
            tracing::warn!(server_id = %server.id, "Duplicate server id ignored");
            return;
        }
        self.by_id.insert(server.id.clone(), self.servers.len());
        self.servers.push(Arc::new(server));
    }

    pub fn get(&self, server_id: &str) -> Option<&Arc<Server>> {
        self.by_id.get(server_id).map(|&idx| &self.servers[idx])
    }

    /// All servers, in configuration order.
    pub fn all(&self) -> &[Arc<Server>] {
        &self.servers
    }

    /// Unknown servers are never reachable.
    pub fn is_reachable(&self, server_id: &str) -> bool {
        self.get(server_id).is_some_and(|s| s.is_reachable())
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, url: &str) -> ServerConfig {
        ServerConfig {
            id: id.into(),
            url: url.into(),
            capabilities: vec!["search".into()],
            labels: Default::default(),
            priority: 0,
        }
    }

    #[test]
    fn builds_in_order_and_skips_bad_entries() {
        let pool = ServerPool::from_config(&[
            config("a", "http://127.0.0.1:3001/"),
            config("bad", "not a url"),
            config("b", "http://127.0.0.1:3002/"),
            config("a", "http://127.0.0.1:3003/"),
        ]);

        assert_eq!(pool.len(), 2);
        let ids: Vec<_> = pool.all().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(pool.get("a").unwrap().url.port(), Some(3001));
        assert!(pool.get("bad").is_none());
    }

    #[test]
    fn reachability_lookup() {
        let pool = ServerPool::from_config(&[config("a", "http://127.0.0.1:3001/")]);
        assert!(pool.is_reachable("a"));
        assert!(!pool.is_reachable("missing"));

        pool.get("a").unwrap().mark_failure(1);
        assert!(!pool.is_reachable("a"));
    }
}
