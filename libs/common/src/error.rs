//! Custom error types for the common library
//!
//! This module defines the error types shared by every service: database
//! failures and identity-token failures.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[from] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

impl DatabaseError {
    /// Whether the failure is a unique-constraint violation (duplicate key)
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::Query(SqlxError::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    /// Name of the violated constraint, if the database reported one
    pub fn constraint(&self) -> Option<&str> {
        match self {
            DatabaseError::Query(SqlxError::Database(db)) => db.constraint(),
            _ => None,
        }
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors raised while issuing or verifying identity tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature mismatch, malformed token or unexpected claims
    #[error("Invalid token: {0}")]
    Invalid(String),

    /// The `exp` claim is in the past
    #[error("Token expired")]
    Expired,

    /// Signing failed
    #[error("Failed to sign token: {0}")]
    Signing(String),
}
