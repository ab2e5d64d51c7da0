//! Strangler-fig reverse proxy.
//!
//! Requests are matched against an ordered route table, each route names the
//! backend that serves it (legacy or migrated), and every backend call runs
//! through that backend's circuit breaker.

// Core subsystems
pub mod config;
pub mod http;
pub mod proxy;
pub mod routing;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{BackendInvoker, ProxyDispatcher};
