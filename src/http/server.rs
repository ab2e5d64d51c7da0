//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing, timeout, concurrency limit, request ID)
//! - Bind server to listener and drain on shutdown
//! - Apply configuration reloads to the dispatcher and invoker
//! - Serve the admin API on its own router

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::request::{to_proxy_request, UuidRequestId};
use crate::http::response::rejected;
use crate::observability::{MetricsObserver, TracingObserver};
use crate::proxy::invoker::backend_directory;
use crate::proxy::{HttpInvoker, ProxyDispatcher};
use crate::resilience::BreakerRegistry;
use crate::routing::{PatternError, RouteTable};

/// Errors raised while assembling the server from configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid backend url: {0}")]
    BackendUrl(#[from] url::ParseError),

    #[error("invalid route pattern: {0}")]
    Pattern(#[from] PatternError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ProxyDispatcher>,
    pub invoker: Arc<HttpInvoker>,
    pub config: Arc<ProxyConfig>,
    pub started_at: Instant,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let breakers = Arc::new(BreakerRegistry::from_config(&config));
        let invoker = Arc::new(HttpInvoker::new(
            &config.backends,
            &config.timeouts,
            config.limits.max_response_bytes,
        )?);

        let mut dispatcher = ProxyDispatcher::from_config(&config, breakers, invoker.clone())?
            .with_observer(Arc::new(TracingObserver));
        if config.observability.metrics_enabled {
            dispatcher = dispatcher.with_observer(Arc::new(MetricsObserver));
        }

        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            invoker,
            config: Arc::new(config),
            started_at: Instant::now(),
        };

        let router = Self::build_router(&state);
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: &AppState) -> Router {
        let config = &state.config;
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state.clone())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
    }

    /// Router serving the admin API, for a separate listener.
    pub fn admin_router(&self) -> Router {
        crate::admin::setup_admin_router(self.state.clone())
    }

    pub fn dispatcher(&self) -> &Arc<ProxyDispatcher> {
        &self.state.dispatcher
    }

    /// Get a reference to the config the server was built from.
    pub fn config(&self) -> &ProxyConfig {
        &self.state.config
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configurations arriving on `config_updates` are applied live.
    /// Returns once `shutdown` fires and in-flight requests have drained.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.state.dispatcher.routes().len(),
            "HTTP server starting"
        );

        let dispatcher = self.state.dispatcher.clone();
        let invoker = self.state.invoker.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if let Err(e) = apply_reload(&dispatcher, &invoker, &config) {
                    tracing::error!(error = %e, "Rejected config reload, keeping current configuration");
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        result
    }
}

/// Compile everything first; swap only if the whole config is usable.
fn apply_reload(
    dispatcher: &ProxyDispatcher,
    invoker: &HttpInvoker,
    config: &ProxyConfig,
) -> Result<(), ServerError> {
    let directory = backend_directory(&config.backends)?;
    let routes = RouteTable::from_config(&config.routes)?;

    // Backends first so new routes never point at an unknown directory entry.
    invoker.install_backends(directory);
    dispatcher.install(routes, config);
    tracing::info!(
        backends = config.backends.len(),
        routes = config.routes.len(),
        "Configuration reloaded"
    );
    Ok(())
}

/// Catch-all handler: every inbound request goes through the dispatcher.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let limit = state.config.limits.max_body_bytes;
    match to_proxy_request(request, limit).await {
        Ok(request) => state.dispatcher.handle(request).await.into_response(),
        Err(status) => rejected(status),
    }
}
