//! Backend id → circuit breaker registry.
//!
//! # Responsibilities
//! - Own exactly one breaker per backend id for the process lifetime
//! - Create breakers eagerly for configured backends, lazily for others
//! - Expose snapshots for the admin API
//!
//! # Design Decisions
//! - No global instance; the registry is built at startup and injected
//! - Reload may add breakers but never replaces an existing one

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::ProxyConfig;
use crate::resilience::circuit_breaker::{BreakerSettings, BreakerSnapshot, CircuitBreaker};
use crate::resilience::clock::{Clock, SystemClock};

#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: BreakerSettings,
    clock: Arc<dyn Clock>,
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
            clock,
        }
    }

    /// Build a registry with one breaker per configured backend.
    pub fn from_config(config: &ProxyConfig) -> Self {
        let registry = Self::new(BreakerSettings::from(&config.circuit_breaker), Arc::new(SystemClock));
        registry.register_backends(config);
        registry
    }

    /// Register breakers for any configured backend not yet known.
    pub fn register_backends(&self, config: &ProxyConfig) {
        for backend in &config.backends {
            let settings = BreakerSettings {
                failure_threshold: backend
                    .failure_threshold
                    .unwrap_or(self.defaults.failure_threshold),
                reset_timeout: backend
                    .reset_timeout_secs
                    .map(std::time::Duration::from_secs)
                    .unwrap_or(self.defaults.reset_timeout),
            };
            self.register(&backend.id, settings);
        }
    }

    /// Register a breaker with explicit settings. An existing breaker is kept as is.
    pub fn register(&self, backend_id: &str, settings: BreakerSettings) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(backend_id.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(backend_id, settings, self.clock.clone())))
            .clone()
    }

    /// Breaker for a backend, created with default settings on first use.
    pub fn get(&self, backend_id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(backend_id) {
            return existing.clone();
        }
        self.register(backend_id, self.defaults)
    }

    pub fn contains(&self, backend_id: &str) -> bool {
        self.breakers.contains_key(backend_id)
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshots of all breakers, sorted by backend id.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snaps: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snaps.sort_by(|a, b| a.backend_id.cmp(&b.backend_id));
        snaps
    }
}
