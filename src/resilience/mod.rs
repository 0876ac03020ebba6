//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Send to server:
//!     → circuit_breaker.rs (gate: is the server open?)
//!     → timeouts.rs (enforce attempt deadline, honour cancellation)
//!     → On failure: retries.rs (retry with backoff.rs linear delay)
//!     → circuit_breaker.rs (one outcome per logical send)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Circuit breaker prevents cascading failures
//! - Breakers see call-level outcomes, never attempt-level noise

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{Admission, BreakerStatus, CircuitBreakerRegistry, CircuitState, ProbeGuard};
pub use retries::{RetryExecutor, RetryPolicy};
