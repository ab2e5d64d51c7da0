//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher produces:
//!     → events.rs (route resolved, breaker outcome, final status)
//!         → TracingObserver → logging.rs subscriber
//!         → MetricsObserver → metrics.rs
//!         → any external observer (span exporter, test probe)
//!
//! Breakers produce:
//!     → state transition logs + metrics.rs gauge
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all events
//! - Metrics are cheap (atomic increments)
//! - The event hook is optional; dispatch works with no observers

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{DispatchEvent, DispatchObserver, MetricsObserver, TracingObserver};
