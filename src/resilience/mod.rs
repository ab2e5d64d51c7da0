//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → registry.rs (breaker for the route's backend id)
//!     → circuit_breaker.rs (admit, or fail fast with CircuitOpenError)
//!     → timeouts.rs (enforce per-call deadline)
//!     → circuit_breaker.rs (record success/failure, maybe transition)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - No retries: a failed call is reported, not repeated
//! - Circuit breaker prevents cascading failures
//! - Breaker time comes from an injectable clock

pub mod circuit_breaker;
pub mod clock;
pub mod registry;
pub mod timeouts;

pub use circuit_breaker::{
    BreakerSettings, BreakerSnapshot, CallPermit, CircuitBreaker, CircuitOpenError, CircuitStatus,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use registry::BreakerRegistry;
