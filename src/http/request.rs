//! Inbound request handling.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) when the client sent none
//! - Enforce the body size limit
//! - Convert wire requests into `ProxyRequest` values
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Declared oversize bodies are refused before reading
//! - Bodies are buffered; the core only sees complete values

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::proxy::ProxyRequest;

/// Header carrying the request id, in both directions.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request id generator producing UUID v4 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Buffer the body and build a `ProxyRequest`.
///
/// Fails with 413 when the body exceeds `max_body_bytes`, 400 when it cannot be read.
pub async fn to_proxy_request(request: Request<Body>, max_body_bytes: usize) -> Result<ProxyRequest, StatusCode> {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > max_body_bytes) {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, max_body_bytes).await.map_err(|e| {
        tracing::debug!(error = %e, "Failed to read request body");
        if declared.is_none() {
            StatusCode::PAYLOAD_TOO_LARGE
        } else {
            StatusCode::BAD_REQUEST
        }
    })?;

    let mut proxy_request = ProxyRequest::new(parts.method, parts.uri.path())
        .with_headers(parts.headers)
        .with_body(body);
    if let Some(query) = parts.uri.query() {
        proxy_request = proxy_request.with_query(query);
    }
    Ok(proxy_request)
}
