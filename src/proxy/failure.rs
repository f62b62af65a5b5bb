//! Error Classifier.
//!
//! Turns an upstream transport failure into a [`ProxyError`] and renders
//! it as the client-facing JSON response. [`classify_failure`] prefers the
//! structured signal (an `io::ErrorKind::TimedOut` anywhere in the source
//! chain) and only falls back to matching the failure text for transports
//! that do not surface one.

use std::error::Error as StdError;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "etimedout"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    ConnectionFailure,
}

/// Which request failed, for logs.
#[derive(Debug, Clone)]
pub struct RequestLabel {
    pub method: Method,
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{} {} timed out after {}ms: {cause}", request.method, request.path, timeout.as_millis())]
    Timeout {
        request: RequestLabel,
        timeout: Duration,
        cause: String,
    },

    #[error("{} {} could not reach {upstream}: {cause}", request.method, request.path)]
    ConnectionFailure {
        request: RequestLabel,
        upstream: String,
        cause: String,
    },
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ErrorBody {
    GatewayTimeout {
        error: &'static str,
        message: &'static str,
        timeout: u64,
    },
    BadGateway {
        error: &'static str,
        message: &'static str,
        upstream: String,
    },
    Internal {
        error: &'static str,
        message: &'static str,
    },
}

impl ErrorBody {
    #[must_use]
    pub const fn internal() -> Self {
        Self::Internal {
            error: "Internal Server Error",
            message: "An unexpected error occurred",
        }
    }
}

/// Decide whether a transport failure is a timeout or a connection failure.
#[must_use]
pub fn classify_failure(err: &(dyn StdError + 'static)) -> FailureKind {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::TimedOut)
        {
            return FailureKind::Timeout;
        }
        current = e.source();
    }

    let mut current = Some(err);
    while let Some(e) = current {
        let text = e.to_string().to_ascii_lowercase();
        if TIMEOUT_MARKERS.iter().any(|m| text.contains(m)) {
            return FailureKind::Timeout;
        }
        current = e.source();
    }

    FailureKind::ConnectionFailure
}

/// Flatten an error and its sources into one description.
#[must_use]
pub fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        text.push_str(": ");
        text.push_str(&e.to_string());
        current = e.source();
    }
    text
}

impl ProxyError {
    /// The deadline elapsed before the upstream started responding.
    #[must_use]
    pub fn deadline_elapsed(request: RequestLabel, timeout: Duration) -> Self {
        Self::Timeout {
            request,
            timeout,
            cause: format!("no response within {}ms", timeout.as_millis()),
        }
    }

    /// The upstream answered `101 Switching Protocols` to a plain request.
    #[must_use]
    pub fn unrequested_upgrade(request: RequestLabel, upstream: &str) -> Self {
        Self::ConnectionFailure {
            request,
            upstream: upstream.to_string(),
            cause: "upstream switched protocols without an upgrade request".to_string(),
        }
    }

    #[must_use]
    pub fn from_transport(
        err: &(dyn StdError + 'static),
        request: RequestLabel,
        timeout: Duration,
        upstream: &str,
    ) -> Self {
        let cause = describe(err);
        match classify_failure(err) {
            FailureKind::Timeout => Self::Timeout {
                request,
                timeout,
                cause,
            },
            FailureKind::ConnectionFailure => Self::ConnectionFailure {
                request,
                upstream: upstream.to_string(),
                cause,
            },
        }
    }

    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::ConnectionFailure { .. } => FailureKind::ConnectionFailure,
        }
    }

    #[must_use]
    pub fn render(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::Timeout { timeout, .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorBody::GatewayTimeout {
                    error: "Gateway Timeout",
                    message: "Request to upstream server timed out",
                    timeout: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                },
            ),
            Self::ConnectionFailure { upstream, .. } => (
                StatusCode::BAD_GATEWAY,
                ErrorBody::BadGateway {
                    error: "Bad Gateway",
                    message: "Failed to connect to upstream server",
                    upstream: upstream.clone(),
                },
            ),
        }
    }

    pub fn log(&self) {
        match self {
            Self::Timeout {
                request,
                timeout,
                cause,
            } => tracing::error!(
                failure = "timeout",
                method = %request.method,
                path = %request.path,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                error = %cause,
                "upstream request timed out"
            ),
            Self::ConnectionFailure {
                request, cause, ..
            } => tracing::error!(
                failure = "connection",
                method = %request.method,
                path = %request.path,
                error = %cause,
                "upstream request failed"
            ),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body) = self.render();
        (status, Json(body)).into_response()
    }
}

#[must_use]
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::internal()),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, thiserror::Error)]
    #[error("client error (Connect)")]
    struct Wrapped(#[source] io::Error);

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct Plain(String);

    fn label() -> RequestLabel {
        RequestLabel {
            method: Method::GET,
            path: "/users".into(),
        }
    }

    #[test]
    fn timed_out_io_error_in_chain_is_timeout() {
        let err = Wrapped(io::Error::new(io::ErrorKind::TimedOut, "deadline"));
        assert_eq!(classify_failure(&err), FailureKind::Timeout);
    }

    #[test]
    fn refused_connection_is_connection_failure() {
        let err = Wrapped(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(classify_failure(&err), FailureKind::ConnectionFailure);
    }

    #[test]
    fn timeout_text_is_recognised_without_structure() {
        assert_eq!(
            classify_failure(&Plain("connect ETIMEDOUT 10.0.0.1:443".into())),
            FailureKind::Timeout
        );
        assert_eq!(
            classify_failure(&Plain("operation Timed Out".into())),
            FailureKind::Timeout
        );
        assert_eq!(
            classify_failure(&Plain("dns error: no such host".into())),
            FailureKind::ConnectionFailure
        );
    }

    #[test]
    fn timeout_renders_gateway_timeout_body() {
        let err = ProxyError::deadline_elapsed(label(), Duration::from_millis(30_000));
        let (status, body) = err.render();
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "error": "Gateway Timeout",
                "message": "Request to upstream server timed out",
                "timeout": 30000,
            })
        );
    }

    #[test]
    fn connection_failure_renders_bad_gateway_body() {
        let cause = Wrapped(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        let err = ProxyError::from_transport(
            &cause,
            label(),
            Duration::from_millis(500),
            "http://localhost:3000",
        );
        assert_eq!(err.kind(), FailureKind::ConnectionFailure);

        let (status, body) = err.render();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "error": "Bad Gateway",
                "message": "Failed to connect to upstream server",
                "upstream": "http://localhost:3000",
            })
        );
    }

    #[test]
    fn unrequested_upgrade_is_a_bad_gateway() {
        let err = ProxyError::unrequested_upgrade(label(), "http://localhost:3000");
        assert_eq!(err.kind(), FailureKind::ConnectionFailure);
        assert!(err.to_string().contains("switched protocols"));

        let (status, body) = err.render();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            body,
            ErrorBody::BadGateway {
                error: "Bad Gateway",
                message: "Failed to connect to upstream server",
                upstream: "http://localhost:3000".into(),
            }
        );
    }

    #[test]
    fn describe_joins_source_chain() {
        let err = Wrapped(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(describe(&err), "client error (Connect): refused");
    }
}
