use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Result alias used by the repositories, the token service and the handlers.
pub type AppResult<T> = std::result::Result<T, AppError>;

/// AppError
///
/// The single error taxonomy of the service. Repositories and the token service
/// produce it, handlers return it, and `IntoResponse` translates it to an HTTP status.
///
/// The `Display` text is for server-side logs only. Clients receive a fixed public
/// message per variant so that store errors and identifiers never leak.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed body, path id or field value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Missing, malformed, badly signed or expired token, or bad credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Authenticated, but the role or ownership check failed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Absent or soft-deleted resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint violation (email, username).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced entity (e.g. the owner of a note) does not exist.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Store failure, wrapped with the operation that was running.
    #[error("database error while {context}: {source}")]
    Database {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Anything else that is not the caller's fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wraps a sqlx error, classifying constraint violations.
    ///
    /// Unique violations become `Conflict`, foreign key violations become
    /// `InvalidReference`, everything else stays a `Database` error.
    pub fn from_sqlx(context: &'static str, source: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &source {
            if db_err.is_unique_violation() {
                return AppError::Conflict(format!("{context}: {}", db_err.message()));
            }
            if db_err.is_foreign_key_violation() {
                return AppError::InvalidReference(format!("{context}: {}", db_err.message()));
            }
        }
        AppError::Database { context, source }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::InvalidReference(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database { .. } | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message that is safe to send to the client.
    fn public_message(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "Invalid request",
            AppError::Unauthenticated(_) => "Invalid or missing credentials",
            AppError::Forbidden(_) => "You do not have access to this resource",
            AppError::NotFound(_) => "Resource not found",
            AppError::Conflict(_) => "Resource already exists",
            AppError::InvalidReference(_) => "Referenced resource does not exist",
            AppError::Database { .. } | AppError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// ConfigError
///
/// Raised while building the immutable configuration and the services that
/// depend on it. Startup aborts on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("token signing secret must not be empty")]
    EmptySecret,
}
