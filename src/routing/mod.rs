//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (route lookup, first match wins)
//!     → matcher.rs (evaluate path pattern)
//!     → Return: matched Route or NotFound
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → Compile patterns
//!     → Stable sort by priority
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - Reload swaps a whole new table, never edits one in place

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, PatternError};
pub use router::{Route, RouteMatch, RouteTable, RoutingError};
