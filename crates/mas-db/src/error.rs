//! Database error types for mas-db.

use mas_core::enums::{ErrorCategory, Severity};
use mas_core::errors::MasError;
use thiserror::Error;

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed or returned unusable data.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., bad data in DB).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A JSON column could not be encoded or decoded.
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

impl From<DatabaseError> for MasError {
    #[track_caller]
    fn from(error: DatabaseError) -> Self {
        let code = match &error {
            DatabaseError::Query(_) | DatabaseError::NoResult => "DB_QUERY",
            DatabaseError::Migration(_) => "DB_MIGRATION",
            DatabaseError::InvalidState(_) | DatabaseError::Json(_) => "DB_INVALID_STATE",
            DatabaseError::LibSql(_) => "DB_LIBSQL",
        };
        Self::new(error.to_string())
            .with_category(ErrorCategory::Database)
            .with_severity(Severity::High)
            .with_code(code)
            .with_component("database")
    }
}
