//! Request dispatch.
//!
//! # Responsibilities
//! - Resolve the route for an inbound request
//! - Call the route's backend through its circuit breaker
//! - Map backend outcomes and breaker rejections to client responses
//! - Publish dispatch events to observers
//!
//! # Design Decisions
//! - No retries, no backoff, no response caching
//! - Upstream error responses pass through unchanged
//! - Circuit-open rejections never touch the backend
//! - Routes and timeouts are swapped atomically on reload

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::http::{header, HeaderValue, StatusCode};
use serde::Serialize;

use crate::config::ProxyConfig;
use crate::observability::{DispatchEvent, DispatchObserver};
use crate::proxy::invoker::BackendInvoker;
use crate::proxy::outcome::{InvocationFailure, InvocationOutcome};
use crate::proxy::request::ProxyRequest;
use crate::proxy::response::ProxyResponse;
use crate::resilience::{BreakerRegistry, CircuitOpenError};
use crate::routing::{PatternError, RouteTable};

/// Default per-call backend deadline.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotFoundBody<'a> {
    error: &'static str,
    path: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnreachableBody<'a> {
    error: &'static str,
    backend_id: &'a str,
    details: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CircuitOpenBody<'a> {
    error: &'static str,
    backend_id: &'a str,
    failure_count: u32,
    retry_after: u64,
}

/// Top-level orchestrator: route → breaker → invoker → response.
pub struct ProxyDispatcher {
    routes: ArcSwap<RouteTable>,
    backend_timeouts: ArcSwap<HashMap<String, Duration>>,
    default_timeout: Duration,
    breakers: Arc<BreakerRegistry>,
    invoker: Arc<dyn BackendInvoker>,
    observers: Vec<Arc<dyn DispatchObserver>>,
}

impl ProxyDispatcher {
    pub fn new(routes: RouteTable, breakers: Arc<BreakerRegistry>, invoker: Arc<dyn BackendInvoker>) -> Self {
        Self {
            routes: ArcSwap::from_pointee(routes),
            backend_timeouts: ArcSwap::from_pointee(HashMap::new()),
            default_timeout: DEFAULT_BACKEND_TIMEOUT,
            breakers,
            invoker,
            observers: Vec::new(),
        }
    }

    /// Build from validated configuration.
    pub fn from_config(
        config: &ProxyConfig,
        breakers: Arc<BreakerRegistry>,
        invoker: Arc<dyn BackendInvoker>,
    ) -> Result<Self, PatternError> {
        let routes = RouteTable::from_config(&config.routes)?;
        let dispatcher = Self::new(routes, breakers, invoker)
            .with_timeout(Duration::from_secs(config.timeouts.backend_secs));
        dispatcher.backend_timeouts.store(Arc::new(backend_timeouts(config)));
        Ok(dispatcher)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_backend_timeout(self, backend_id: impl Into<String>, timeout: Duration) -> Self {
        let mut timeouts = HashMap::clone(&self.backend_timeouts.load());
        timeouts.insert(backend_id.into(), timeout);
        self.backend_timeouts.store(Arc::new(timeouts));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Swap in routes and timeouts from a new configuration.
    /// Breakers for existing backends keep their state.
    pub fn reload(&self, config: &ProxyConfig) -> Result<(), PatternError> {
        let routes = RouteTable::from_config(&config.routes)?;
        self.install(routes, config);
        Ok(())
    }

    /// Swap in an already compiled table along with the config's timeouts.
    pub fn install(&self, routes: RouteTable, config: &ProxyConfig) {
        self.breakers.register_backends(config);
        let route_count = routes.len();
        self.routes.store(Arc::new(routes));
        self.backend_timeouts.store(Arc::new(backend_timeouts(config)));
        tracing::info!(routes = route_count, "Routing table reloaded");
    }

    /// Current routing table.
    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    fn timeout_for(&self, backend_id: &str) -> Duration {
        self.backend_timeouts
            .load()
            .get(backend_id)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    fn emit(&self, event: DispatchEvent<'_>) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    /// Serve one request.
    pub async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
        let start = Instant::now();
        let request_id = request.request_id();
        let routes = self.routes.load_full();

        let matched = match routes.resolve(request.path()) {
            Ok(matched) => matched,
            Err(_) => {
                self.emit(DispatchEvent::RouteNotFound {
                    request_id,
                    path: request.path(),
                });
                let response = ProxyResponse::json(
                    StatusCode::NOT_FOUND,
                    &NotFoundBody {
                        error: "route not found",
                        path: request.path(),
                    },
                );
                self.finish(&request, None, &response, start);
                return response;
            }
        };

        let route = matched.route;
        let backend_id = route.backend_id.as_str();
        self.emit(DispatchEvent::RouteResolved {
            request_id,
            path: request.path(),
            route: &route.name,
            backend_id,
            migrated: route.migrated,
            params: &matched.params,
        });

        let upstream_path = route.upstream_path(request.path());
        let forwarded = if upstream_path == request.path() {
            Cow::Borrowed(&request)
        } else {
            Cow::Owned(request.forwarded_to(upstream_path))
        };

        let breaker = self.breakers.get(backend_id);
        let timeout = self.timeout_for(backend_id);
        let call_start = Instant::now();
        let result = breaker
            .call(|| self.invoker.invoke(backend_id, &forwarded, timeout))
            .await;

        let response = match result {
            Ok(outcome) => {
                let failure = match &outcome {
                    InvocationOutcome::Success(_) => None,
                    InvocationOutcome::Failure(f) => Some(f.kind()),
                };
                self.emit(DispatchEvent::BackendCompleted {
                    request_id,
                    backend_id,
                    failure,
                    elapsed: call_start.elapsed(),
                });
                outcome_response(backend_id, outcome)
            }
            Err(open) => {
                self.emit(DispatchEvent::BreakerRejected {
                    request_id,
                    backend_id,
                    failure_count: open.failure_count,
                    retry_after: open.retry_after,
                });
                circuit_open_response(&open)
            }
        };

        self.finish(&request, Some(backend_id), &response, start);
        response
    }

    fn finish(&self, request: &ProxyRequest, backend_id: Option<&str>, response: &ProxyResponse, start: Instant) {
        self.emit(DispatchEvent::ResponseSent {
            request_id: request.request_id(),
            method: request.method(),
            path: request.path(),
            backend_id,
            status: response.status,
            elapsed: start.elapsed(),
        });
    }
}

fn backend_timeouts(config: &ProxyConfig) -> HashMap<String, Duration> {
    config
        .backends
        .iter()
        .filter_map(|b| b.timeout_secs.map(|secs| (b.id.clone(), Duration::from_secs(secs))))
        .collect()
}

fn outcome_response(backend_id: &str, outcome: InvocationOutcome) -> ProxyResponse {
    match outcome {
        InvocationOutcome::Success(response) => response,
        InvocationOutcome::Failure(InvocationFailure::Upstream(response)) => response,
        InvocationOutcome::Failure(failure) => ProxyResponse::json(
            StatusCode::SERVICE_UNAVAILABLE,
            &UnreachableBody {
                error: "backend unreachable",
                backend_id,
                details: failure.detail(),
            },
        ),
    }
}

fn circuit_open_response(open: &CircuitOpenError) -> ProxyResponse {
    let retry_after = open.retry_after_secs();
    let mut response = ProxyResponse::json(
        StatusCode::SERVICE_UNAVAILABLE,
        &CircuitOpenBody {
            error: "circuit open",
            backend_id: &open.backend_id,
            failure_count: open.failure_count,
            retry_after,
        },
    );
    response
        .headers
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::FailureKind;
    use crate::resilience::{BreakerSettings, CircuitStatus, ManualClock};
    use crate::routing::Route;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    enum Behavior {
        Respond(StatusCode, &'static str),
        Unreachable,
        Timeout,
        Slow(Duration),
    }

    #[derive(Default)]
    struct ScriptedInvoker {
        behaviors: Mutex<HashMap<String, Behavior>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedInvoker {
        fn set(&self, backend: &str, behavior: Behavior) {
            self.behaviors.lock().unwrap().insert(backend.into(), behavior);
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_to(&self, backend: &str) -> usize {
            self.calls().iter().filter(|(b, _)| b == backend).count()
        }
    }

    #[async_trait]
    impl BackendInvoker for ScriptedInvoker {
        async fn invoke(&self, backend_id: &str, request: &ProxyRequest, _timeout: Duration) -> InvocationOutcome {
            self.calls
                .lock()
                .unwrap()
                .push((backend_id.to_string(), request.path_and_query()));
            let behavior = self
                .behaviors
                .lock()
                .unwrap()
                .get(backend_id)
                .cloned()
                .unwrap_or(Behavior::Respond(StatusCode::OK, "{}"));
            match behavior {
                Behavior::Respond(status, body) => {
                    let response = ProxyResponse::new(status, body);
                    if status.as_u16() >= 400 {
                        InvocationOutcome::Failure(InvocationFailure::Upstream(response))
                    } else {
                        InvocationOutcome::Success(response)
                    }
                }
                Behavior::Unreachable => InvocationOutcome::Failure(InvocationFailure::Network(
                    "connection refused".into(),
                )),
                Behavior::Timeout => {
                    InvocationOutcome::Failure(InvocationFailure::Timeout("no response within 2000ms".into()))
                }
                Behavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    InvocationOutcome::Success(ProxyResponse::new(StatusCode::OK, "slow"))
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl DispatchObserver for RecordingObserver {
        fn on_event(&self, event: &DispatchEvent<'_>) {
            let name = match event {
                DispatchEvent::RouteResolved { backend_id, params, .. } => {
                    let mut captured: Vec<_> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                    captured.sort();
                    if captured.is_empty() {
                        format!("resolved:{}", backend_id)
                    } else {
                        format!("resolved:{}[{}]", backend_id, captured.join(","))
                    }
                }
                DispatchEvent::RouteNotFound { .. } => "not_found".to_string(),
                DispatchEvent::BreakerRejected { backend_id, .. } => format!("rejected:{}", backend_id),
                DispatchEvent::BackendCompleted { failure, .. } => format!("completed:{:?}", failure),
                DispatchEvent::ResponseSent { status, .. } => format!("sent:{}", status.as_u16()),
            };
            self.events.lock().unwrap().push(name);
        }
    }

    struct Harness {
        dispatcher: ProxyDispatcher,
        invoker: Arc<ScriptedInvoker>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new());
        let breakers = Arc::new(BreakerRegistry::new(BreakerSettings::default(), clock.clone()));
        let invoker = Arc::new(ScriptedInvoker::default());
        let routes = RouteTable::new(vec![
            Route::new("invoices", "/api/v1/invoices/*", "new-billing", true)
                .unwrap()
                .with_strip_prefix("/api/v1"),
            Route::new("orders", "/api/v1/orders/*", "legacy-sap", false).unwrap(),
        ]);
        let dispatcher = ProxyDispatcher::new(routes, breakers, invoker.clone());
        Harness {
            dispatcher,
            invoker,
            clock,
        }
    }

    #[tokio::test]
    async fn test_strangler_dispatch() {
        let h = harness();
        h.invoker.set("new-billing", Behavior::Respond(StatusCode::OK, r#"{"invoice":42}"#));
        h.invoker.set("legacy-sap", Behavior::Respond(StatusCode::OK, r#"{"order":7}"#));

        let invoice = h.dispatcher.handle(ProxyRequest::get("/api/v1/invoices/42")).await;
        assert_eq!(invoice.status, StatusCode::OK);
        assert_eq!(invoice.body.as_ref(), br#"{"invoice":42}"#);

        let order = h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;
        assert_eq!(order.body.as_ref(), br#"{"order":7}"#);

        assert_eq!(
            h.invoker.calls(),
            vec![
                ("new-billing".to_string(), "/invoices/42".to_string()),
                ("legacy-sap".to_string(), "/api/v1/orders/7".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_route_not_found() {
        let h = harness();
        let response = h.dispatcher.handle(ProxyRequest::get("/api/v1/customers/1")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json_body().unwrap()["path"], "/api/v1/customers/1");
        assert!(h.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_circuit_opens_after_five_failures() {
        let h = harness();
        h.invoker.set("legacy-sap", Behavior::Unreachable);

        for _ in 0..5 {
            let response = h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;
            assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(response.json_body().unwrap()["error"], "backend unreachable");
        }

        let sixth = h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;
        assert_eq!(sixth.status, StatusCode::SERVICE_UNAVAILABLE);
        let body = sixth.json_body().unwrap();
        assert_eq!(body["error"], "circuit open");
        assert_eq!(body["backendId"], "legacy-sap");
        assert_eq!(body["retryAfter"], 60);
        assert_eq!(sixth.headers.get(header::RETRY_AFTER).unwrap(), "60");
        assert_eq!(h.invoker.calls_to("legacy-sap"), 5);

        // Other backends are unaffected.
        let invoice = h.dispatcher.handle(ProxyRequest::get("/api/v1/invoices/1")).await;
        assert_eq!(invoice.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unreachable_backend_increments_failures() {
        let h = harness();
        h.invoker.set("new-billing", Behavior::Unreachable);

        let response = h.dispatcher.handle(ProxyRequest::get("/api/v1/invoices/42")).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        let body = response.json_body().unwrap();
        assert_eq!(body["error"], "backend unreachable");
        assert!(body["details"].as_str().unwrap().contains("connection refused"));
        assert_eq!(h.dispatcher.breakers().get("new-billing").failure_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unreachable() {
        let h = harness();
        h.invoker.set("legacy-sap", Behavior::Timeout);
        let response = h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.json_body().unwrap()["error"], "backend unreachable");
        assert_eq!(h.dispatcher.breakers().get("legacy-sap").failure_count(), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_passes_through() {
        let h = harness();
        h.invoker.set("legacy-sap", Behavior::Respond(StatusCode::NOT_FOUND, "order 7 not found"));

        let response = h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body.as_ref(), b"order 7 not found");
        assert_eq!(h.dispatcher.breakers().get("legacy-sap").failure_count(), 1);
    }

    #[tokio::test]
    async fn test_recovery_after_reset_timeout() {
        let h = harness();
        h.invoker.set("legacy-sap", Behavior::Unreachable);
        for _ in 0..5 {
            h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;
        }
        h.invoker.set("legacy-sap", Behavior::Respond(StatusCode::OK, "back"));

        h.clock.advance(Duration::from_secs(59));
        let early = h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;
        assert_eq!(early.json_body().unwrap()["error"], "circuit open");
        assert_eq!(h.invoker.calls_to("legacy-sap"), 5);

        h.clock.advance(Duration::from_secs(2));
        let probe = h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;
        assert_eq!(probe.status, StatusCode::OK);

        let breaker = h.dispatcher.breakers().get("legacy-sap");
        assert_eq!(breaker.status(), CircuitStatus::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_arrivals_single_probe() {
        let h = harness();
        h.invoker.set("legacy-sap", Behavior::Unreachable);
        for _ in 0..5 {
            h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;
        }
        h.invoker.set("legacy-sap", Behavior::Slow(Duration::from_millis(50)));
        h.clock.advance(Duration::from_secs(60));

        let requests = (0..8).map(|_| h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")));
        let responses = futures_util::future::join_all(requests).await;

        let served = responses.iter().filter(|r| r.status == StatusCode::OK).count();
        let rejected = responses
            .iter()
            .filter(|r| r.json_body().map(|b| b["error"] == "circuit open").unwrap_or(false))
            .count();
        assert_eq!(served, 1);
        assert_eq!(rejected, 7);
        assert_eq!(h.invoker.calls_to("legacy-sap"), 6);
    }

    #[tokio::test]
    async fn test_observer_events() {
        let h = harness();
        let observer = Arc::new(RecordingObserver::default());
        let dispatcher = h.dispatcher.with_observer(observer.clone());
        h.invoker.set("legacy-sap", Behavior::Unreachable);

        dispatcher.handle(ProxyRequest::get("/nowhere")).await;
        dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;

        assert_eq!(
            *observer.events.lock().unwrap(),
            vec![
                "not_found".to_string(),
                "sent:404".to_string(),
                "resolved:legacy-sap".to_string(),
                format!("completed:{:?}", Some(FailureKind::NetworkError)),
                "sent:503".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_captured_segments_reach_observers() {
        let clock = Arc::new(ManualClock::new());
        let breakers = Arc::new(BreakerRegistry::new(BreakerSettings::default(), clock));
        let invoker = Arc::new(ScriptedInvoker::default());
        invoker.set("new-billing", Behavior::Respond(StatusCode::OK, "ok"));
        let routes = RouteTable::new(vec![Route::new(
            "invoice-lines",
            "/invoices/{invoice_id}/lines/<line>",
            "new-billing",
            true,
        )
        .unwrap()]);
        let observer = Arc::new(RecordingObserver::default());
        let dispatcher = ProxyDispatcher::new(routes, breakers, invoker).with_observer(observer.clone());

        dispatcher.handle(ProxyRequest::get("/invoices/42/lines/3")).await;

        let events = observer.events.lock().unwrap().clone();
        assert_eq!(events[0], "resolved:new-billing[invoice_id=42,line=3]");
    }

    #[tokio::test]
    async fn test_reload_keeps_breaker_state() {
        let h = harness();
        h.invoker.set("legacy-sap", Behavior::Unreachable);
        h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;

        let mut config = ProxyConfig::default();
        config.routes.push(crate::config::RouteConfig {
            name: "orders".into(),
            pattern: "/api/v2/orders/*".into(),
            backend: "legacy-sap".into(),
            migrated: false,
            strip_prefix: None,
            priority: 0,
        });
        h.dispatcher.reload(&config).unwrap();

        assert_eq!(h.dispatcher.routes().len(), 1);
        let old = h.dispatcher.handle(ProxyRequest::get("/api/v1/orders/7")).await;
        assert_eq!(old.status, StatusCode::NOT_FOUND);
        h.dispatcher.handle(ProxyRequest::get("/api/v2/orders/7")).await;
        assert_eq!(h.dispatcher.breakers().get("legacy-sap").failure_count(), 2);
    }
}
