//! Edge router error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur in the edge router.
#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing or invalid Host header")]
    MissingHost,

    #[error("No site for host: {0}")]
    SiteNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EdgeError {
    /// Stable machine-readable error identifier.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::MissingHost => "missing_host",
            Self::SiteNotFound(_) => "site_not_found",
            Self::Database(_) => "database_error",
            Self::Upstream(_) => "upstream_error",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingHost => StatusCode::BAD_REQUEST,
            Self::SiteNotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Database(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Absence of a site is all a visitor gets to learn; internals
        // are sanitised.
        let message = match &self {
            Self::MissingHost => "Missing or invalid Host header".to_owned(),
            Self::SiteNotFound(_) => "Not found".to_owned(),
            Self::Upstream(_) => "Bad gateway".to_owned(),
            Self::Config(_) | Self::Database(_) | Self::Io(_) | Self::Internal(_) => {
                "Internal server error".to_owned()
            }
        };

        (status, message).into_response()
    }
}
