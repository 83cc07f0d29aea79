//! Error types for the control plane.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur in the control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The request was malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested resource does not exist or is not visible to the
    /// caller. Ownership misses deliberately surface as not-found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller is not permitted to perform this action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The caller exceeded the deployment-creation rate.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Launching the build task failed. The deployment row already
    /// exists and remains QUEUED for external reconciliation.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a dispatch error.
    #[must_use]
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable error identifier.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::RateLimited => "too_many_requests",
            Self::Dispatch(_) => "dispatch_error",
            Self::Database(_) => "database_error",
            Self::Serialisation(_) => "serialisation_error",
            Self::Config(_) => "config_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Dispatch(_)
            | Self::Database(_)
            | Self::Serialisation(_)
            | Self::Config(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Sanitise internals; validation and ownership errors are safe
        // to echo back to the caller.
        let message = match &self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(msg) => msg.clone(),
            Self::Forbidden(msg) => msg.clone(),
            Self::RateLimited => "Rate limit exceeded".to_owned(),
            Self::Dispatch(_) => "Failed to launch build task".to_owned(),
            Self::Database(_)
            | Self::Serialisation(_)
            | Self::Config(_)
            | Self::Internal(_) => "Internal server error".to_owned(),
        };

        let body = Json(serde_json::json!({
            "success": false,
            "message": message,
            "error": self.error_type(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ControlError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ControlError::not_found("missing").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ControlError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ControlError::dispatch("launch failed").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_types() {
        assert_eq!(
            ControlError::dispatch("launch failed").error_type(),
            "dispatch_error"
        );
        assert_eq!(ControlError::not_found("x").error_type(), "not_found");
    }

    #[test]
    fn internal_details_are_sanitised() {
        let response = ControlError::internal("connection string leaked").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
