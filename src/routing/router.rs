//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in evaluation order
//! - Look up the matching route for a request path
//! - Return matched route or explicit NotFound
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) pattern scan (acceptable for typical route counts)
//! - Explicit NotFound rather than silent default

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::config::RouteConfig;
use crate::routing::matcher::{PathPattern, PatternError};

/// Routing failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no route matches path {path}")]
    NotFound { path: String },
}

/// A single compiled route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub name: String,
    #[serde(serialize_with = "serialize_pattern")]
    pub pattern: PathPattern,
    pub backend_id: String,
    /// True once the functionality behind this route has moved to a new backend.
    pub migrated: bool,
    /// Prefix removed from the path before forwarding.
    pub strip_prefix: Option<String>,
    pub priority: u32,
}

fn serialize_pattern<S: serde::Serializer>(pattern: &PathPattern, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(pattern.as_str())
}

impl Route {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        backend_id: impl Into<String>,
        migrated: bool,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            name: name.into(),
            pattern: PathPattern::parse(pattern)?,
            backend_id: backend_id.into(),
            migrated,
            strip_prefix: None,
            priority: 0,
        })
    }

    pub fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Path to forward to the backend for an inbound path.
    pub fn upstream_path(&self, path: &str) -> String {
        let Some(prefix) = self.strip_prefix.as_deref() else {
            return path.to_string();
        };
        match path.strip_prefix(prefix) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => path.to_string(),
        }
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

/// Ordered, immutable routing table. First match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build a table; routes are ordered by descending priority, ties keep declaration order.
    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { routes }
    }

    /// Compile route configuration.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, PatternError> {
        let routes = configs
            .iter()
            .map(|c| {
                Ok(Route {
                    name: c.name.clone(),
                    pattern: PathPattern::parse(&c.pattern)?,
                    backend_id: c.backend.clone(),
                    migrated: c.migrated,
                    strip_prefix: c.strip_prefix.clone(),
                    priority: c.priority,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;
        Ok(Self::new(routes))
    }

    /// Resolve a request path to exactly one route or NotFound.
    pub fn resolve(&self, path: &str) -> Result<RouteMatch<'_>, RoutingError> {
        self.routes
            .iter()
            .find_map(|route| {
                route
                    .pattern
                    .captures(path)
                    .map(|params| RouteMatch { route, params })
            })
            .ok_or_else(|| RoutingError::NotFound {
                path: path.to_string(),
            })
    }

    /// Routes in evaluation order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn migrated_count(&self) -> usize {
        self.routes.iter().filter(|r| r.migrated).count()
    }
}
