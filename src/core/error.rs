//! Error type system for the restaurant API
//!
//! Two families of errors leave this crate as HTTP responses:
//! - [`AuthFailure`]: authentication outcomes, always `401` with a stable body
//! - [`AppError`]: everything else, mapped to a status code and an [`ErrorResponse`]
//!
//! Rate-limit rejections have their own response type in
//! `api::middleware::rate_limit` because they carry extra headers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Stable `error` field of every authentication failure body
pub const AUTHENTICATION_FAILED: &str = "authentication_failed";

/// Why a request could not be authenticated
///
/// All variants surface as `401`; only the human-readable message differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("API key not provided")]
    MissingCredential,

    #[error("Invalid API key format")]
    InvalidFormat,

    #[error("Invalid API key")]
    InvalidCredential,

    #[error("User account is inactive")]
    InactiveAccount,

    /// Login by email for an address that is not registered
    #[error("User not found")]
    UnknownUser,
}

impl AuthFailure {
    /// Short machine-friendly name, used in logs only
    pub fn kind(&self) -> &'static str {
        match self {
            AuthFailure::MissingCredential => "missing_credential",
            AuthFailure::InvalidFormat => "invalid_format",
            AuthFailure::InvalidCredential => "invalid_credential",
            AuthFailure::InactiveAccount => "inactive_account",
            AuthFailure::UnknownUser => "unknown_user",
        }
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        tracing::warn!(
            reason = self.kind(),
            trace_id = %current_trace_id(),
            "Authentication failed"
        );

        let body = Json(json!({
            "message": self.to_string(),
            "error": AUTHENTICATION_FAILED,
            "code": StatusCode::UNAUTHORIZED.as_u16(),
        }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Main error type for the API
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("System initialization failed: {0}")]
    InitializationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation failed: {}", .0.join("; "))]
    ValidationError(Vec<String>),

    #[error(transparent)]
    Authentication(#[from] AuthFailure),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("Task error: {0}")]
    TaskError(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,

            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,

            AppError::NotFound(_) => StatusCode::NOT_FOUND,

            AppError::InitializationError(_)
            | AppError::DatabaseError(_)
            | AppError::PoolError(_)
            | AppError::CredentialError(_)
            | AppError::TaskError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type name for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::InitializationError(_) => "InitializationError",
            AppError::DatabaseError(_) => "DatabaseError",
            AppError::PoolError(_) => "PoolError",
            AppError::InvalidRequest(_) => "InvalidRequest",
            AppError::ValidationError(_) => "ValidationError",
            AppError::Authentication(_) => AUTHENTICATION_FAILED,
            AppError::NotFound(_) => "NotFound",
            AppError::CredentialError(_) => "CredentialError",
            AppError::TaskError(_) => "TaskError",
        }
    }

    /// Whether this is a UNIQUE constraint violation reported by SQLite
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }
}

/// Error response structure for API endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// HTTP status code, repeated in the body for clients that only read JSON
    pub code: u16,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Trace ID of the request that failed
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: String, code: StatusCode, message: String) -> Self {
        Self {
            error,
            code: code.as_u16(),
            message,
            details: None,
            trace_id: current_trace_id(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Create an error response from an AppError
    pub fn from_error(error: &AppError) -> Self {
        let response = Self::new(
            error.error_type().to_string(),
            error.status_code(),
            error.to_string(),
        );

        match error {
            AppError::ValidationError(messages) => response.with_details(json!(messages)),
            _ => response,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Authentication(failure) = self {
            return failure.into_response();
        }

        let status_code = self.status_code();
        let error_response = ErrorResponse::from_error(&self);

        if status_code.is_server_error() {
            tracing::error!(
                error_type = self.error_type(),
                trace_id = %error_response.trace_id,
                status_code = %status_code,
                "Request failed: {}",
                self
            );
        } else {
            tracing::debug!(
                error_type = self.error_type(),
                trace_id = %error_response.trace_id,
                status_code = %status_code,
                "Request rejected: {}",
                self
            );
        }

        (status_code, Json(error_response)).into_response()
    }
}

tokio::task_local! {
    /// Trace ID of the request being served on this task, set by the trace middleware
    pub static CURRENT_TRACE_ID: String;
}

/// Trace ID of the current request, or a fresh one outside a request scope
pub fn current_trace_id() -> String {
    CURRENT_TRACE_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| Uuid::new_v4().to_string())
}

/// Result type alias for operations that can fail with AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Context extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| AppError::InitializationError(format!("{}: {}", context.into(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::InvalidRequest("test".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Authentication(AuthFailure::InvalidCredential).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::NotFound("test".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::DatabaseError(rusqlite::Error::InvalidQuery).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_auth_failure_body_is_stable() {
        for failure in [
            AuthFailure::MissingCredential,
            AuthFailure::InvalidFormat,
            AuthFailure::InvalidCredential,
            AuthFailure::InactiveAccount,
        ] {
            let response = AppError::from(failure).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let body = body_json(response).await;
            assert_eq!(body["error"], AUTHENTICATION_FAILED);
            assert_eq!(body["code"], 401);
            assert_eq!(body["message"], failure.to_string());
        }
    }

    #[test]
    fn test_inactive_and_invalid_messages_differ() {
        assert_ne!(
            AuthFailure::InactiveAccount.to_string(),
            AuthFailure::InvalidCredential.to_string()
        );
    }

    #[tokio::test]
    async fn test_validation_error_carries_details() {
        let error = AppError::ValidationError(vec![
            "email is required".to_string(),
            "name is too short".to_string(),
        ]);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(body["details"][1], "name is too short");
    }

    #[tokio::test]
    async fn test_trace_id_follows_task_scope() {
        let id = CURRENT_TRACE_ID
            .scope("trace-123".to_string(), async { current_trace_id() })
            .await;
        assert_eq!(id, "trace-123");

        let outside = current_trace_id();
        assert!(Uuid::parse_str(&outside).is_ok());
    }

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let err = result.context("Failed to open database").unwrap_err();
        assert!(err.to_string().contains("Failed to open database"));
        assert!(err.to_string().contains("file not found"));
    }
}
