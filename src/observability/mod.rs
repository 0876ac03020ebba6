//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher / breakers / executor produce:
//!     → events.rs (ProxyEvent broadcast, each event also logged)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Event subscribers (EventSink::subscribe)
//! ```
//!
//! # Design Decisions
//! - Events observe; they never steer control flow
//! - Metrics are cheap (atomic increments)

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{EventSink, ProxyEvent};
