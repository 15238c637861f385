//! Custom error types for the API service

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::{DatabaseError, TokenError};
use serde_json::json;
use thiserror::Error;

use crate::models::{
    UnknownVariant,
    permission::{Action, Resource},
};

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// No bearer header and no `jwt` cookie
    #[error("Authentication token missing.")]
    AuthMissing,

    /// Signature or format check failed
    #[error("Unauthorized: Invalid authentication token.")]
    InvalidToken,

    /// Token `exp` is in the past
    #[error("Unauthorized: Authentication token expired.")]
    TokenExpired,

    /// Token is valid but its user no longer exists
    #[error("Unauthorized: User not found for provided token.")]
    UserNotFound,

    /// Wrong credentials on login
    #[error("Invalid username or password.")]
    InvalidCredentials,

    /// Fine-grained permission check failed
    #[error("Permission denied: You do not have '{action}' permission on '{resource}'.")]
    PermissionDenied { resource: Resource, action: Action },

    /// Coarse role check failed
    #[error("Forbidden: You do not have the necessary role to access this resource.")]
    Forbidden,

    /// Entity lookup miss
    #[error("{0}")]
    NotFound(String),

    /// Malformed input
    #[error("{0}")]
    Validation(String),

    /// Duplicate unique field or a state transition that already happened
    #[error("{0}")]
    Conflict(String),

    /// Unexpected failure
    #[error("{0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    /// HTTP status for this error kind
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthMissing
            | ApiError::InvalidToken
            | ApiError::TokenExpired
            | ApiError::UserNotFound
            | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied { .. } | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(err) if err.is_unique_violation() => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::TokenExpired,
            TokenError::Invalid(_) => ApiError::InvalidToken,
            TokenError::Signing(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(DatabaseError::Query(err))
    }
}

impl From<UnknownVariant> for ApiError {
    fn from(err: UnknownVariant) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::Database(err) if err.is_unique_violation() => json!({
                "success": false,
                "message": duplicate_message(err),
            }),
            // The generic 500 path exposes the raw error text.
            ApiError::Internal(msg) => json!({
                "success": false,
                "message": "Internal server error",
                "error": msg,
            }),
            ApiError::Database(err) => json!({
                "success": false,
                "message": "Internal server error",
                "error": err.to_string(),
            }),
            ApiError::PermissionDenied { resource, action } => json!({
                "success": false,
                "message": self.to_string(),
                "resource": resource,
                "action": action,
            }),
            other => json!({
                "success": false,
                "message": other.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

fn duplicate_message(err: &DatabaseError) -> String {
    match err.constraint() {
        Some("orders_order_number_key") => {
            "This order number already exists, please try a different order number".to_string()
        }
        Some("users_username_key") => "Username is already taken".to_string(),
        Some("users_email_key") => "Email is already registered".to_string(),
        _ => "Duplicate value".to_string(),
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
