use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::versioning::{LabelError, OperationKey, VersionLabel};

#[derive(thiserror::Error, Debug)]
pub enum VersioningError {
    #[error("Versioning configuration absent: {0}")]
    ConfigurationAbsent(String),

    #[error("Ambiguous registration of {key} for version {version}: {first} and {second}")]
    AmbiguousRegistration {
        version: VersionLabel,
        key: OperationKey,
        first: String,
        second: String,
    },

    #[error("Invalid version label {label:?} declared by {owner}: {source}")]
    InvalidVersionLabel {
        owner: String,
        label: String,
        #[source]
        source: LabelError,
    },

    #[error("Route conflict on {method} {path}: {first} and {second}")]
    RouteConflict {
        method: String,
        path: String,
        first: String,
        second: String,
    },

    #[error("Invalid route pattern {path:?}: {reason}")]
    InvalidRoutePattern { path: String, reason: String },

    #[error("Invalid version header: {0}")]
    InvalidVersionHeader(String),

    #[error("No endpoint {endpoint} for version {version}")]
    NoMatchingEndpoint {
        version: VersionLabel,
        endpoint: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl VersioningError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            VersioningError::InvalidVersionHeader(_) => StatusCode::BAD_REQUEST,
            VersioningError::NoMatchingEndpoint { .. } | VersioningError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            VersioningError::ConfigurationAbsent(_)
            | VersioningError::AmbiguousRegistration { .. }
            | VersioningError::InvalidVersionLabel { .. }
            | VersioningError::RouteConflict { .. }
            | VersioningError::InvalidRoutePattern { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for VersioningError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                error_type = ?self,
                error_message = %error_message,
                status_code = %status,
                "Request error"
            );
        } else {
            tracing::warn!(
                error_message = %error_message,
                status_code = %status,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "message": error_message,
            "status": status.as_u16()
        }));
        (status, body).into_response()
    }
}
