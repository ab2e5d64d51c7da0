//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn dispatcher results into wire responses
//! - Map adapter-level failures (oversized body, unreadable body) to status codes
//!
//! # Design Decisions
//! - Backend headers were already cleaned of hop-by-hop fields by the invoker
//! - Adapter errors use the same JSON error shape as the dispatcher

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::proxy::ProxyResponse;

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Response for a request the adapter refused before dispatch.
pub fn rejected(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("rejected").to_lowercase();
    ProxyResponse::json(status, &json!({ "error": reason })).into_response()
}
