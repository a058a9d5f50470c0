// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::VerifyError;
use crate::database::{DatabaseError, StoreError};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({ "message": self.message() })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found() -> Self {
        ApiError::NotFound("Not found".to_string())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    /// Generic 500. The cause must already be logged.
    pub fn internal_server_error() -> Self {
        ApiError::InternalServerError("Server error".to_string())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        // Don't expose store internals to clients
        tracing::error!("Document store error: {}", err);
        ApiError::internal_server_error()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConnectionError(e) => {
                tracing::error!("Database connection error: {}", e);
                ApiError::internal_server_error()
            }
            DatabaseError::Store(e) => e.into(),
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::InvalidToken(reason) => {
                tracing::warn!("Rejected bearer token: {}", reason);
                ApiError::unauthorized("Invalid or expired token")
            }
            VerifyError::ServiceUnavailable(reason) => {
                tracing::warn!("Token verification unavailable: {}", reason);
                ApiError::service_unavailable("Authentication service unavailable")
            }
            VerifyError::Internal(reason) => {
                tracing::error!("Token verifier fault: {}", reason);
                ApiError::internal_server_error()
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

/// Failure of a delete route, rendered as `{ "success": false, "message": ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteError(pub ApiError);

impl From<ApiError> for DeleteError {
    fn from(err: ApiError) -> Self {
        DeleteError(err)
    }
}

impl From<StoreError> for DeleteError {
    fn from(err: StoreError) -> Self {
        DeleteError(err.into())
    }
}

impl From<DatabaseError> for DeleteError {
    fn from(err: DatabaseError) -> Self {
        DeleteError(err.into())
    }
}

impl IntoResponse for DeleteError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({ "success": false, "message": self.0.message() });
        (self.0.status_code(), Json(body)).into_response()
    }
}
