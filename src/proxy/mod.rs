//! Proxy core.
//!
//! # Data Flow
//! ```text
//! ProxyRequest
//!     → dispatcher.rs (resolve route via routing::RouteTable)
//!     → resilience::CircuitBreaker::call
//!         → invoker.rs (BackendInvoker::invoke under a deadline)
//!         → outcome.rs (Success | Failure(Network | Timeout | Upstream))
//!     → dispatcher.rs (map outcome or CircuitOpenError)
//!     → ProxyResponse
//! ```
//!
//! # Design Decisions
//! - Request/response are plain values; the HTTP layer adapts them
//! - Nothing above `ProxyDispatcher::handle` sees transport errors

pub mod dispatcher;
pub mod invoker;
pub mod outcome;
pub mod request;
pub mod response;

pub use dispatcher::ProxyDispatcher;
pub use invoker::{BackendInvoker, HttpInvoker};
pub use outcome::{FailureKind, InvocationFailure, InvocationOutcome};
pub use request::ProxyRequest;
pub use response::ProxyResponse;
