//! Mapping of call outcomes to client responses.
//!
//! | Outcome          | Status                      |
//! |------------------|-----------------------------|
//! | Success          | 200, upstream payload       |
//! | Fallback         | 200, substitute payload     |
//! | CircuitOpen      | 503 (+ Retry-After if known)|
//! | RateLimited      | 429 + Retry-After           |
//! | BulkheadFull     | 503                         |
//! | RetryExhausted   | 503                         |

use std::time::Duration;
use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::cache::UpstreamPayload;
use crate::resilience::{CallOutcome, ErrorKind, ResilienceError};

/// Set on responses that carry a fallback payload.
pub const X_GATEWAY_FALLBACK: HeaderName = HeaderName::from_static("x-gateway-fallback");

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    dependency: &'a str,
    message: String,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::CircuitOpen | ErrorKind::BulkheadFull | ErrorKind::RetryExhausted => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Whole seconds, rounded up and never below one.
fn retry_after_secs(delay: Duration) -> u64 {
    let secs = delay.as_secs() + u64::from(delay.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ResilienceError {
    fn into_response(self) -> Response {
        let status = status_for(self.kind());
        let body = ErrorBody {
            error: self.kind().as_str(),
            dependency: self.dependency(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Some(delay) = self.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(delay)));
        }
        response
    }
}

impl IntoResponse for UpstreamPayload {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        if let Some(content_type) = self.content_type {
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

pub fn outcome_response(outcome: CallOutcome<UpstreamPayload>) -> Response {
    match outcome {
        CallOutcome::Success(payload) => payload.into_response(),
        CallOutcome::Fallback(payload) => {
            let mut response = payload.into_response();
            response
                .headers_mut()
                .insert(X_GATEWAY_FALLBACK, HeaderValue::from_static("true"));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::NetworkError;

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ResilienceError::RateLimited {
            dependency: "users".into(),
            retry_after: Duration::from_millis(1_200),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_unavailable_outcomes_are_503() {
        let open = ResilienceError::CircuitOpen {
            dependency: "users".into(),
            retry_after: Some(Duration::from_secs(30)),
        }
        .into_response();
        assert_eq!(open.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(open.headers()[header::RETRY_AFTER], "30");

        let exhausted = ResilienceError::RetryExhausted {
            dependency: "users".into(),
            attempts: 3,
            last: NetworkError::Status(502),
        }
        .into_response();
        assert_eq!(exhausted.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(exhausted.headers().get(header::RETRY_AFTER).is_none());

        let full = ResilienceError::BulkheadFull {
            dependency: "users".into(),
            waited: Duration::from_millis(50),
        }
        .into_response();
        assert_eq!(full.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_fallback_is_marked() {
        let response = outcome_response(CallOutcome::Fallback(UpstreamPayload::json("{}")));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&X_GATEWAY_FALLBACK], "true");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let response = outcome_response(CallOutcome::Success(UpstreamPayload::json("{}")));
        assert!(response.headers().get(&X_GATEWAY_FALLBACK).is_none());
    }

    #[test]
    fn test_retry_after_rounding() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
    }
}
