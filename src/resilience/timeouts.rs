//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls with a deadline
//! - Fold an elapsed deadline into a `Timeout` failure
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The inner future is dropped (cancelled) when the deadline passes
//! - Timeouts count against the breaker like any other failure

use std::future::Future;
use std::time::Duration;

use crate::proxy::{InvocationFailure, InvocationOutcome};

/// Run `call` under `deadline`, turning an elapsed deadline into `Failure(Timeout)`.
pub async fn with_deadline<Fut>(deadline: Duration, call: Fut) -> InvocationOutcome
where
    Fut: Future<Output = InvocationOutcome>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(outcome) => outcome,
        Err(_) => InvocationOutcome::Failure(InvocationFailure::Timeout(format!(
            "no response within {}ms",
            deadline.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{FailureKind, ProxyResponse};
    use axum::http::StatusCode;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapsed() {
        let outcome = with_deadline(Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            InvocationOutcome::Success(ProxyResponse::new(StatusCode::OK, "late"))
        })
        .await;

        match outcome {
            InvocationOutcome::Failure(f) => assert_eq!(f.kind(), FailureKind::Timeout),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_within_deadline() {
        let outcome = with_deadline(Duration::from_secs(2), async {
            InvocationOutcome::Success(ProxyResponse::new(StatusCode::OK, "fast"))
        })
        .await;
        assert!(outcome.is_success());
    }
}
