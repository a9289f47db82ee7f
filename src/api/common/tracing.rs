//! Custom tracing utilities for HTTP requests
//!
//! These callbacks plug into `tower_http::trace::TraceLayer` on the versioned
//! router. The layer runs after version negotiation, so spans carry the
//! negotiated version and, for rewritten requests, the URI the client sent.

use axum::extract::OriginalUri;
use axum::http::{Request, Response};
use std::collections::HashMap;
use std::time::Duration;
use tower_http::classify::ServerErrorsFailureClass;
use tracing::{info_span, Level, Span};

use crate::versioning::NegotiatedVersion;

fn is_sensitive(name: &str) -> bool {
    let name = name.to_lowercase();
    name.contains("authorization") || name.contains("cookie") || name.contains("token")
}

/// Creates a tracing span for an HTTP request with its versioning context
pub fn make_custom_span<B>(request: &Request<B>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let negotiated_version = request
        .extensions()
        .get::<NegotiatedVersion>()
        .map(|negotiated| negotiated.0.to_string());
    let original_uri = request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.to_string());

    info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri().path(),
        query = ?request.uri().query(),
        original_uri = ?original_uri,
        negotiated_version = ?negotiated_version,
        request_id = request_id,
        user_agent = ?request.headers().get("user-agent"),
    )
}

/// Logs an incoming HTTP request with sensitive headers redacted
pub fn on_custom_request<B>(request: &Request<B>, _span: &Span) {
    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            if is_sensitive(name.as_str()) {
                Some((name.to_string(), "[REDACTED]".to_string()))
            } else {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            }
        })
        .collect();

    tracing::debug!(
        method = %request.method(),
        uri = %request.uri(),
        headers = ?headers,
        "Incoming HTTP request"
    );
}

/// Logs the response at a level matching its status class
pub fn on_custom_response<B>(response: &Response<B>, latency: Duration, _span: &Span) {
    let status = response.status();
    let latency_ms = latency.as_millis();

    let log_level = match status.as_u16() {
        400..=499 => Level::WARN,
        500..=599 => Level::ERROR,
        _ => Level::INFO,
    };

    match log_level {
        Level::WARN => tracing::warn!(
            status = %status,
            latency_ms = latency_ms,
            "HTTP request completed with client error"
        ),
        Level::ERROR => tracing::error!(
            status = %status,
            latency_ms = latency_ms,
            "HTTP request completed with server error"
        ),
        _ => tracing::info!(
            status = %status,
            latency_ms = latency_ms,
            "HTTP request completed successfully"
        ),
    }
}

/// Logs HTTP request failures
pub fn on_custom_failure(error: ServerErrorsFailureClass, latency: Duration, _span: &Span) {
    let error_type = match &error {
        ServerErrorsFailureClass::StatusCode(code) => format!("HTTP {}", code.as_u16()),
        ServerErrorsFailureClass::Error(_) => "Internal Error".to_string(),
    };

    tracing::error!(
        error = ?error,
        latency_ms = latency.as_millis(),
        error_type = error_type,
        "HTTP request failed"
    );
}
