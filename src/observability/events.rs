//! Dispatch event hook.
//!
//! # Responsibilities
//! - Describe what happened to a request as structured events
//! - Fan events out to any number of observers (log, metrics, tracer)
//!
//! # Design Decisions
//! - Observers are a side channel; dispatch never depends on them
//! - Events borrow from the dispatcher, observers copy what they keep

use std::collections::HashMap;
use std::time::Duration;

use axum::http::{Method, StatusCode};

use crate::observability::metrics;
use crate::proxy::FailureKind;

/// One step of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent<'a> {
    RouteResolved {
        request_id: Option<&'a str>,
        path: &'a str,
        route: &'a str,
        backend_id: &'a str,
        migrated: bool,
        /// Segments captured by `{name}` pattern parts.
        params: &'a HashMap<String, String>,
    },
    RouteNotFound {
        request_id: Option<&'a str>,
        path: &'a str,
    },
    BreakerRejected {
        request_id: Option<&'a str>,
        backend_id: &'a str,
        failure_count: u32,
        retry_after: Duration,
    },
    BackendCompleted {
        request_id: Option<&'a str>,
        backend_id: &'a str,
        failure: Option<FailureKind>,
        elapsed: Duration,
    },
    ResponseSent {
        request_id: Option<&'a str>,
        method: &'a Method,
        path: &'a str,
        backend_id: Option<&'a str>,
        status: StatusCode,
        elapsed: Duration,
    },
}

/// Receives dispatch events.
pub trait DispatchObserver: Send + Sync {
    fn on_event(&self, event: &DispatchEvent<'_>);
}

/// Writes events as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn on_event(&self, event: &DispatchEvent<'_>) {
        match event {
            DispatchEvent::RouteResolved {
                request_id,
                path,
                route,
                backend_id,
                migrated,
                params,
            } => tracing::debug!(
                request_id = request_id.unwrap_or("unknown"),
                path = %path,
                route = %route,
                backend = %backend_id,
                migrated,
                params = ?params,
                "Route resolved"
            ),
            DispatchEvent::RouteNotFound { request_id, path } => tracing::warn!(
                request_id = request_id.unwrap_or("unknown"),
                path = %path,
                "No route matched"
            ),
            DispatchEvent::BreakerRejected {
                request_id,
                backend_id,
                failure_count,
                retry_after,
            } => tracing::warn!(
                request_id = request_id.unwrap_or("unknown"),
                backend = %backend_id,
                failure_count,
                retry_after = ?retry_after,
                "Circuit open, failing fast"
            ),
            DispatchEvent::BackendCompleted {
                request_id,
                backend_id,
                failure: None,
                elapsed,
            } => tracing::debug!(
                request_id = request_id.unwrap_or("unknown"),
                backend = %backend_id,
                elapsed = ?elapsed,
                "Backend call succeeded"
            ),
            DispatchEvent::BackendCompleted {
                request_id,
                backend_id,
                failure: Some(kind),
                elapsed,
            } => tracing::error!(
                request_id = request_id.unwrap_or("unknown"),
                backend = %backend_id,
                failure = ?kind,
                elapsed = ?elapsed,
                "Backend call failed"
            ),
            DispatchEvent::ResponseSent {
                request_id,
                method,
                path,
                backend_id,
                status,
                elapsed,
            } => tracing::info!(
                request_id = request_id.unwrap_or("unknown"),
                method = %method,
                path = %path,
                backend = backend_id.unwrap_or("none"),
                status = status.as_u16(),
                elapsed = ?elapsed,
                "Request served"
            ),
        }
    }
}

/// Feeds events into the metrics registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl DispatchObserver for MetricsObserver {
    fn on_event(&self, event: &DispatchEvent<'_>) {
        match event {
            DispatchEvent::BreakerRejected { backend_id, .. } => {
                metrics::record_breaker_rejection(backend_id);
            }
            DispatchEvent::BackendCompleted {
                backend_id,
                elapsed,
                ..
            } => metrics::record_backend_latency(backend_id, *elapsed),
            DispatchEvent::ResponseSent {
                method,
                backend_id,
                status,
                elapsed,
                ..
            } => metrics::record_request(
                method.as_str(),
                status.as_u16(),
                backend_id.unwrap_or("none"),
                *elapsed,
            ),
            DispatchEvent::RouteResolved { .. } | DispatchEvent::RouteNotFound { .. } => {}
        }
    }
}
