/// Error Handling Module
///
/// Unified error handling for the token service.
/// It covers:
/// 1. Rejection kinds returned by grants and bearer validation
/// 2. Infrastructure errors (token store, user repository)
/// 3. HTTP response mapping with OAuth-style error bodies
/// 4. Request context for structured logs

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Authentication rejections
///
/// These are expected outcomes, not faults. They never say which factor
/// of a credential pair failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    InvalidClient,
    ExpiredOrUnknownToken,
    MissingToken,
}

impl AuthError {
    /// OAuth 2.0 error code for this rejection
    pub fn oauth_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_grant",
            AuthError::InvalidClient => "invalid_client",
            AuthError::ExpiredOrUnknownToken => "invalid_grant",
            AuthError::MissingToken => "invalid_request",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::InvalidClient => write!(f, "Client authentication failed"),
            AuthError::ExpiredOrUnknownToken => write!(f, "Invalid or expired token"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
        }
    }
}

impl StdError for AuthError {}

/// Token store errors
#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
    WrongType { key: String },
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Token store unavailable: {}", msg),
            StoreError::WrongType { key } => {
                write!(f, "Operation against a key holding the wrong kind of value: {}", key)
            }
            StoreError::Corrupt(msg) => write!(f, "Corrupt token record: {}", msg),
        }
    }
}

impl StdError for StoreError {}

/// User repository errors
#[derive(Debug)]
pub enum DatabaseError {
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Auth(AuthError),
    InvalidRequest(String),
    UnsupportedGrantType(String),
    Store(StoreError),
    Database(DatabaseError),
    Internal(String),
}

impl AppError {
    /// Infrastructure faults are the caller's to retry or alert on.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AppError::Store(_) | AppError::Database(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            AppError::UnsupportedGrantType(grant) => write!(f, "Unsupported grant type: {}", grant),
            AppError::Store(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            sqlx::Error::Database(e) => {
                AppError::Database(DatabaseError::QueryExecution(e.to_string()))
            }
            other => AppError::Database(DatabaseError::UnexpectedError(other.to_string())),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Store(StoreError::Corrupt(err.to_string()))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Blocking task failed: {}", err))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// OAuth-style error body
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// OAuth 2.0 error code (`invalid_grant`, `invalid_client`, ...)
    pub error: String,
    /// Human-readable description, never field-level
    pub error_description: String,
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, error_description: impl Into<String>, error_id: &str) -> Self {
        Self {
            error: error.into(),
            error_description: error_description.into(),
            error_id: error_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials | AuthError::ExpiredOrUnknownToken => {
                    (StatusCode::BAD_REQUEST, e.oauth_code(), e.to_string())
                }
                AuthError::InvalidClient => {
                    (StatusCode::UNAUTHORIZED, e.oauth_code(), e.to_string())
                }
                AuthError::MissingToken => {
                    (StatusCode::UNAUTHORIZED, e.oauth_code(), e.to_string())
                }
            },
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::UnsupportedGrantType(_) => (
                StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                self.to_string(),
            ),
            AppError::Store(_) | AppError::Database(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "temporarily_unavailable",
                "Service temporarily unavailable".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Internal server error".to_string(),
            ),
        };

        (status, ErrorResponse::new(code, message, request_id))
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Auth(e) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %e,
                    "Authentication rejected"
                );
            }
            AppError::InvalidRequest(_) | AppError::UnsupportedGrantType(_) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %self,
                    "Malformed token request"
                );
            }
            AppError::Store(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    "Token store error"
                );
            }
            AppError::Database(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    "User repository error"
                );
            }
            AppError::Internal(msg) => {
                tracing::error!(
                    request_id = request_id,
                    error = %msg,
                    "Internal error"
                );
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(AuthError::InvalidClient) | AppError::Auth(AuthError::MissingToken) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Auth(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidRequest(_) | AppError::UnsupportedGrantType(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Store(_) | AppError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub client_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            client_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Span carrying the request context; logs emitted while serving the
    /// request are tagged with it. The rejection itself is logged once, by
    /// [`ResponseError::error_response`].
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            operation = %self.operation,
            client_id = self.client_id.as_deref().unwrap_or("-"),
            started_at = %self.timestamp.to_rfc3339(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display_is_generic() {
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials");
        assert_eq!(AuthError::InvalidCredentials.oauth_code(), "invalid_grant");
        assert_eq!(AuthError::ExpiredOrUnknownToken.oauth_code(), "invalid_grant");
        assert_eq!(AuthError::InvalidClient.oauth_code(), "invalid_client");
    }

    #[test]
    fn test_app_error_conversion() {
        let app_err: AppError = StoreError::Unavailable("timeout".to_string()).into();
        assert!(app_err.is_infrastructure());

        let app_err: AppError = AuthError::InvalidCredentials.into();
        assert!(!app_err.is_infrastructure());
    }

    #[test]
    fn test_infrastructure_errors_hide_details() {
        let err = AppError::Store(StoreError::Unavailable("10.0.0.3:6379 refused".to_string()));
        let (status, body) = ErrorHandler::error_response(&err, "req-1");

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.error, "temporarily_unavailable");
        assert!(!body.error_description.contains("10.0.0.3"));
        assert_eq!(body.error_id, "req-1");
    }

    #[test]
    fn test_rejected_grant_maps_to_invalid_grant() {
        let err = AppError::Auth(AuthError::InvalidCredentials);
        let (status, body) = ErrorHandler::error_response(&err, "req-2");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "invalid_grant");
        assert_eq!(ResponseError::status_code(&err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unsupported_grant_type() {
        let err = AppError::UnsupportedGrantType("implicit".to_string());
        let (status, body) = ErrorHandler::error_response(&err, "req-3");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "unsupported_grant_type");
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("password_grant");
        assert_eq!(ctx.operation, "password_grant");
        assert!(ctx.client_id.is_none());

        let ctx = ctx.with_client_id("c1");
        assert_eq!(ctx.client_id.as_deref(), Some("c1"));
    }
}
