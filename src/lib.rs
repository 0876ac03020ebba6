//! Capability-routing request proxy library.
//!
//! Callers name a capability; the proxy picks matching servers, guards each
//! one with a circuit breaker, bounds every attempt with a timeout, retries
//! transient failures and tracks in-flight requests so they can be cancelled.

pub mod admin;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use directory::ServerDirectory;
pub use dispatch::{CallOptions, Dispatcher, DispatcherSettings, ServerOutcome};
pub use error::{ProxyError, TransportError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::{CapabilityMatcher, Requirements};
