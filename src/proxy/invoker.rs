//! Backend invocation.
//!
//! # Responsibilities
//! - Define the `BackendInvoker` contract the dispatcher calls through
//! - Forward requests to HTTP backends with a pooled client
//! - Classify every result into an `InvocationOutcome`
//!
//! # Design Decisions
//! - Invokers never return errors; failures are values
//! - Status >= 400 is an upstream failure (counts against the breaker)
//! - Hop-by-hop headers are stripped in both directions
//! - Backend directory is swappable for config reload

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Request, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::config::{BackendConfig, TimeoutConfig};
use crate::proxy::outcome::{InvocationFailure, InvocationOutcome};
use crate::proxy::request::ProxyRequest;
use crate::proxy::response::ProxyResponse;
use crate::resilience::timeouts::with_deadline;

/// Performs a backend request.
///
/// Implementations must return within `timeout` and must fold every failure
/// mode into `InvocationOutcome::Failure`.
#[async_trait]
pub trait BackendInvoker: Send + Sync {
    async fn invoke(&self, backend_id: &str, request: &ProxyRequest, timeout: Duration) -> InvocationOutcome;
}

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Invoker that forwards requests to plain-HTTP backends over HTTP/1.1.
pub struct HttpInvoker {
    client: Client<HttpConnector, Body>,
    backends: ArcSwap<HashMap<String, Url>>,
    max_response_bytes: usize,
}

impl HttpInvoker {
    pub fn new(
        backends: &[BackendConfig],
        timeouts: &TimeoutConfig,
        max_response_bytes: usize,
    ) -> Result<Self, url::ParseError> {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build(connector);

        Ok(Self {
            client,
            backends: ArcSwap::from_pointee(backend_directory(backends)?),
            max_response_bytes,
        })
    }

    /// Replace the backend directory.
    pub fn install_backends(&self, directory: BackendDirectory) {
        self.backends.store(Arc::new(directory));
    }

    pub fn backend_url(&self, backend_id: &str) -> Option<Url> {
        self.backends.load().get(backend_id).cloned()
    }

    fn upstream_uri(base: &Url, request: &ProxyRequest) -> Result<Uri, axum::http::uri::InvalidUri> {
        let base = base.as_str().trim_end_matches('/');
        format!("{}{}", base, request.path_and_query()).parse()
    }

    async fn forward(&self, backend_id: &str, request: &ProxyRequest) -> InvocationOutcome {
        let Some(base) = self.backends.load().get(backend_id).cloned() else {
            return InvocationOutcome::Failure(InvocationFailure::Network(format!(
                "unknown backend {}",
                backend_id
            )));
        };

        let uri = match Self::upstream_uri(&base, request) {
            Ok(uri) => uri,
            Err(e) => {
                return InvocationOutcome::Failure(InvocationFailure::Network(format!(
                    "invalid upstream uri: {}",
                    e
                )))
            }
        };

        let mut headers = request.headers().clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        let mut builder = Request::builder().method(request.method().clone()).uri(uri);
        if let Some(h) = builder.headers_mut() {
            h.extend(headers);
        }
        let upstream_req = match builder.body(Body::from(request.body().clone())) {
            Ok(req) => req,
            Err(e) => {
                return InvocationOutcome::Failure(InvocationFailure::Network(format!(
                    "failed to build upstream request: {}",
                    e
                )))
            }
        };

        let response = match self.client.request(upstream_req).await {
            Ok(response) => response,
            Err(e) => return InvocationOutcome::Failure(InvocationFailure::Network(e.to_string())),
        };

        let (parts, body) = response.into_parts();
        let body = match axum::body::to_bytes(Body::new(body), self.max_response_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return InvocationOutcome::Failure(InvocationFailure::Network(format!(
                    "failed to read response body: {}",
                    e
                )))
            }
        };

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);

        let response = ProxyResponse {
            status: parts.status,
            headers,
            body,
        };
        if response.status.is_client_error() || response.status.is_server_error() {
            InvocationOutcome::Failure(InvocationFailure::Upstream(response))
        } else {
            InvocationOutcome::Success(response)
        }
    }
}

#[async_trait]
impl BackendInvoker for HttpInvoker {
    async fn invoke(&self, backend_id: &str, request: &ProxyRequest, timeout: Duration) -> InvocationOutcome {
        with_deadline(timeout, self.forward(backend_id, request)).await
    }
}

/// Backend id → base URL.
pub type BackendDirectory = HashMap<String, Url>;

/// Parse backend URLs without touching any running invoker.
pub fn backend_directory(backends: &[BackendConfig]) -> Result<BackendDirectory, url::ParseError> {
    backends
        .iter()
        .map(|b| Ok((b.id.clone(), Url::parse(&b.url)?)))
        .collect()
}
