//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, body limit, ProxyRequest)
//!     → proxy::ProxyDispatcher (route, breaker, backend)
//!     → response.rs (ProxyResponse → wire response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{to_proxy_request, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
