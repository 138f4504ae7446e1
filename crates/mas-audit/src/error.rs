//! Audit error types.

use std::path::PathBuf;

use mas_core::enums::{ErrorCategory, Severity};
use mas_core::errors::{CoreError, MasError};
use mas_db::error::DatabaseError;
use thiserror::Error;

/// Errors from the audit logger.
///
/// `log_event` only surfaces [`AuditError::Validation`]; storage failures while
/// logging go to the emergency file instead.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Bad category, severity, action or context.
    #[error("Invalid audit event: {0}")]
    Validation(String),

    /// No record with this identifier.
    #[error("Audit record not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Export/emergency file I/O failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuditError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<CoreError> for AuditError {
    fn from(error: CoreError) -> Self {
        Self::Validation(error.to_string())
    }
}

impl From<libsql::Error> for AuditError {
    fn from(error: libsql::Error) -> Self {
        Self::Database(DatabaseError::LibSql(error))
    }
}

impl From<AuditError> for MasError {
    #[track_caller]
    fn from(error: AuditError) -> Self {
        let (category, severity, code) = match &error {
            AuditError::Validation(_) => (ErrorCategory::Validation, Severity::Medium, "AUDIT_VALIDATION"),
            AuditError::NotFound(_) => (ErrorCategory::Validation, Severity::Low, "AUDIT_NOT_FOUND"),
            AuditError::Database(_) => (ErrorCategory::Database, Severity::High, "AUDIT_DATABASE"),
            AuditError::Io { path, .. } => {
                return Self::new(error.to_string())
                    .with_category(ErrorCategory::General)
                    .with_severity(Severity::High)
                    .with_code("AUDIT_IO")
                    .with_component("audit")
                    .with_context("path", path.display().to_string());
            }
            AuditError::Serialization(_) => (ErrorCategory::General, Severity::Medium, "AUDIT_SERIALIZATION"),
        };
        Self::new(error.to_string())
            .with_category(category)
            .with_severity(severity)
            .with_code(code)
            .with_component("audit")
    }
}
