//! Result of a single backend invocation.

use axum::http::StatusCode;
use thiserror::Error;

use crate::proxy::response::ProxyResponse;

/// Outcome of one backend call attempt. Every transport problem is folded in here.
#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    Success(ProxyResponse),
    Failure(InvocationFailure),
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Success(_))
    }
}

/// Failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NetworkError,
    Timeout,
    UpstreamError(StatusCode),
}

/// A failed backend call.
#[derive(Debug, Clone, Error)]
pub enum InvocationFailure {
    /// Connection refused, DNS failure, reset, unknown backend.
    #[error("network error: {0}")]
    Network(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// The backend answered with an error status; the full response is kept.
    #[error("upstream responded with {}", .0.status)]
    Upstream(ProxyResponse),
}

impl InvocationFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            InvocationFailure::Network(_) => FailureKind::NetworkError,
            InvocationFailure::Timeout(_) => FailureKind::Timeout,
            InvocationFailure::Upstream(resp) => FailureKind::UpstreamError(resp.status),
        }
    }

    pub fn detail(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            InvocationFailure::Network("refused".into()).kind(),
            FailureKind::NetworkError
        );
        assert_eq!(
            InvocationFailure::Timeout("2s".into()).kind(),
            FailureKind::Timeout
        );
        let upstream = InvocationFailure::Upstream(ProxyResponse::new(StatusCode::BAD_GATEWAY, ""));
        assert_eq!(upstream.kind(), FailureKind::UpstreamError(StatusCode::BAD_GATEWAY));
        assert_eq!(upstream.detail(), "upstream responded with 502 Bad Gateway");
    }
}
