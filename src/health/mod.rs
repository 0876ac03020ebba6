//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each server
//!     → Update server reachability (directory::server)
//!
//! Reachability state machine:
//!     Unknown/Healthy ←→ Unhealthy
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - Reachability is independent from circuit breakers: health checks
//!   decide whether a server is offered at all, breakers react to call
//!   outcomes
//! - State transitions require consecutive successes/failures

pub mod active;

pub use active::HealthMonitor;
