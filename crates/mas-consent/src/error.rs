//! Consent error types.

use mas_audit::AuditError;
use mas_core::enums::{ErrorCategory, Severity};
use mas_core::errors::{CoreError, MasError};
use mas_db::error::DatabaseError;
use thiserror::Error;

/// Errors from the consent manager.
#[derive(Debug, Error)]
pub enum ConsentError {
    /// Missing or malformed definition fields.
    #[error("Invalid consent data: {0}")]
    Validation(String),

    /// `create_definition` with a code that already exists.
    #[error("Consent definition '{0}' already exists")]
    DuplicateCode(String),

    #[error("Consent definition '{0}' not found")]
    DefinitionNotFound(String),

    /// Consent cannot be recorded against an inactive definition.
    #[error("Consent definition '{0}' is inactive")]
    InactiveDefinition(String),

    /// Revoke without a currently active consent.
    #[error("Customer {customer_id} has no active consent for '{code}'")]
    NoActiveConsent { customer_id: i64, code: String },

    #[error("Consent log entry {0} not found")]
    LogEntryNotFound(i64),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// The audit logger rejected the consent event.
    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConsentError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "CONSENT_VALIDATION",
            Self::DuplicateCode(_) => "CONSENT_DUPLICATE_CODE",
            Self::DefinitionNotFound(_) => "CONSENT_DEFINITION_NOT_FOUND",
            Self::InactiveDefinition(_) => "CONSENT_DEFINITION_INACTIVE",
            Self::NoActiveConsent { .. } => "CONSENT_NOT_ACTIVE",
            Self::LogEntryNotFound(_) => "CONSENT_LOG_NOT_FOUND",
            Self::Database(_) => "CONSENT_DATABASE",
            Self::Audit(_) => "CONSENT_AUDIT",
            Self::Serialization(_) => "CONSENT_SERIALIZATION",
        }
    }
}

impl From<CoreError> for ConsentError {
    fn from(error: CoreError) -> Self {
        Self::Validation(error.to_string())
    }
}

impl From<libsql::Error> for ConsentError {
    fn from(error: libsql::Error) -> Self {
        Self::Database(DatabaseError::LibSql(error))
    }
}

impl From<ConsentError> for MasError {
    #[track_caller]
    fn from(error: ConsentError) -> Self {
        let (category, severity) = match &error {
            ConsentError::Validation(_) | ConsentError::DuplicateCode(_) => {
                (ErrorCategory::Validation, Severity::Medium)
            }
            ConsentError::Database(_) => (ErrorCategory::Database, Severity::High),
            ConsentError::Audit(_) => (ErrorCategory::General, Severity::High),
            ConsentError::Serialization(_) => (ErrorCategory::General, Severity::Medium),
            _ => (ErrorCategory::Consent, Severity::Medium),
        };
        let mut mas = Self::new(error.to_string())
            .with_category(category)
            .with_severity(severity)
            .with_code(error.code())
            .with_component("consent");
        match &error {
            ConsentError::DuplicateCode(code)
            | ConsentError::DefinitionNotFound(code)
            | ConsentError::InactiveDefinition(code) => {
                mas = mas.with_context("consent_code", code.as_str());
            }
            ConsentError::NoActiveConsent { customer_id, code } => {
                mas = mas
                    .with_operation("revoke_consent")
                    .with_context("customer_id", *customer_id)
                    .with_context("consent_code", code.as_str());
            }
            _ => {}
        }
        mas
    }
}
