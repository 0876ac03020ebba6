//! Server directory subsystem.
//!
//! # Data Flow
//! ```text
//! [[servers]] config
//!     → server.rs (id, url, capabilities, reachability state)
//!     → pool.rs (ordered table, lookup by id)
//!     → http.rs (POST message to server url, return JSON result)
//! ```
//!
//! # Design Decisions
//! - The dispatcher only depends on the [`ServerDirectory`] trait
//! - Sends carry no timeout; deadlines are the executor's job
//! - Reachability is fed by active health checks

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

pub mod http;
pub mod pool;
pub mod server;

pub use http::HttpDirectory;
pub use pool::ServerPool;
pub use server::{HealthState, Server};

/// Resolves servers and performs the low-level send of one message.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Whether `server_id` exists and is currently believed reachable.
    fn is_reachable(&self, server_id: &str) -> bool;

    /// Deliver `message` to `server_id` and return its raw result.
    async fn send(&self, server_id: &str, message: &Value) -> Result<Value, TransportError>;
}
