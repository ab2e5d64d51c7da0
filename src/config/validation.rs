//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing backends)
//! - Validate value ranges (thresholds and timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;
use crate::routing::PathPattern;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate backend id '{0}'")]
    DuplicateBackend(String),

    #[error("backend '{id}' has invalid url '{url}': {reason}")]
    InvalidBackendUrl { id: String, url: String, reason: String },

    #[error("duplicate route name '{0}'")]
    DuplicateRoute(String),

    #[error("route '{route}' references unknown backend '{backend}'")]
    UnknownBackend { route: String, backend: String },

    #[error("route '{route}' has invalid pattern: {reason}")]
    InvalidPattern { route: String, reason: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: String },

    #[error("{field} is not a valid socket address: '{value}'")]
    InvalidAddress { field: String, value: String },
}

fn positive(field: impl Into<String>, value: u64, errors: &mut Vec<ValidationError>) {
    if value == 0 {
        errors.push(ValidationError::NotPositive { field: field.into() });
    }
}

fn address(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    address("listener.bind_address", &config.listener.bind_address, &mut errors);
    positive("listener.max_connections", config.listener.max_connections as u64, &mut errors);
    if config.observability.metrics_enabled {
        address("observability.metrics_address", &config.observability.metrics_address, &mut errors);
    }
    if config.admin.enabled {
        address("admin.bind_address", &config.admin.bind_address, &mut errors);
    }

    positive("circuit_breaker.failure_threshold", config.circuit_breaker.failure_threshold.into(), &mut errors);
    positive("circuit_breaker.reset_timeout_secs", config.circuit_breaker.reset_timeout_secs, &mut errors);
    positive("timeouts.backend_secs", config.timeouts.backend_secs, &mut errors);
    positive("timeouts.connect_secs", config.timeouts.connect_secs, &mut errors);
    positive("timeouts.request_secs", config.timeouts.request_secs, &mut errors);

    let mut backend_ids = HashSet::new();
    for backend in &config.backends {
        if !backend_ids.insert(backend.id.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.id.clone()));
        }
        match Url::parse(&backend.url) {
            Ok(url) if url.scheme() == "http" => {}
            Ok(url) => errors.push(ValidationError::InvalidBackendUrl {
                id: backend.id.clone(),
                url: backend.url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidBackendUrl {
                id: backend.id.clone(),
                url: backend.url.clone(),
                reason: e.to_string(),
            }),
        }
        if let Some(threshold) = backend.failure_threshold {
            positive(format!("backends.{}.failure_threshold", backend.id), threshold.into(), &mut errors);
        }
        if let Some(secs) = backend.reset_timeout_secs {
            positive(format!("backends.{}.reset_timeout_secs", backend.id), secs, &mut errors);
        }
        if let Some(secs) = backend.timeout_secs {
            positive(format!("backends.{}.timeout_secs", backend.id), secs, &mut errors);
        }
    }

    let mut route_names = HashSet::new();
    for route in &config.routes {
        if !route_names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        if !backend_ids.contains(route.backend.as_str()) {
            errors.push(ValidationError::UnknownBackend {
                route: route.name.clone(),
                backend: route.backend.clone(),
            });
        }
        if let Err(e) = PathPattern::parse(&route.pattern) {
            errors.push(ValidationError::InvalidPattern {
                route: route.name.clone(),
                reason: e.to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
