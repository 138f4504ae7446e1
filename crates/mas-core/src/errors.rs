//! Cross-cutting error types for MAS.
//!
//! [`CoreError`] covers failures raised by this crate's own helpers.
//! [`MasError`] is the structured exception every crate error converts into at
//! its boundary: it carries the taxonomy (category × severity), the component
//! and operation that failed, an open context map enriched with runtime facts,
//! and an optional cause chain.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use thiserror::Error;

use crate::enums::{ErrorCategory, Severity};
use crate::runtime;

/// Errors raised by mas-core helpers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A string did not name a member of a closed enumeration.
    #[error("Invalid {kind}: '{value}'")]
    InvalidEnum { kind: &'static str, value: String },

    /// Data failed validation (schema, format, constraints).
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Open key/value context attached to a [`MasError`].
pub type ErrorContext = BTreeMap<String, Value>;

/// Structured failure record propagated through all MAS layers.
///
/// Built at the failure site, optionally enriched through the `with_*`
/// methods, then returned. It is never persisted itself; boundary code logs
/// or reports it via [`MasError::to_value`].
#[derive(Debug, Clone)]
pub struct MasError {
    id: String,
    message: String,
    code: String,
    category: ErrorCategory,
    severity: Severity,
    component: String,
    operation: String,
    context: ErrorContext,
    file: &'static str,
    line: u32,
    timestamp: DateTime<Utc>,
    alert: bool,
    previous: Option<Box<MasError>>,
}

impl MasError {
    /// Create an error with an empty caller context.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_context_map(message, ErrorContext::new())
    }

    /// Create an error with a caller-supplied context.
    ///
    /// `timestamp`, `memory_usage` and `request_id` are added only when the
    /// caller has not supplied them.
    #[track_caller]
    pub fn with_context_map(message: impl Into<String>, mut context: ErrorContext) -> Self {
        let location = Location::caller();
        let timestamp = Utc::now();

        context
            .entry("timestamp".to_string())
            .or_insert_with(|| Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)));
        if let Some(bytes) = runtime::resident_memory_bytes() {
            context
                .entry("memory_usage".to_string())
                .or_insert_with(|| json!(bytes));
        }
        context
            .entry("request_id".to_string())
            .or_insert_with(|| Value::String(runtime::current_request_id().to_string()));

        Self {
            id: runtime::generate_id(runtime::PREFIX_ERROR),
            message: message.into(),
            code: "MAS_ERROR".to_string(),
            category: ErrorCategory::General,
            severity: Severity::Medium,
            component: "mas".to_string(),
            operation: String::new(),
            context,
            file: location.file(),
            line: location.line(),
            timestamp,
            alert: false,
            previous: None,
        }
    }

    #[must_use]
    pub const fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Insert one context entry, replacing any previous value for `key`.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Flag the error for alerting regardless of severity.
    #[must_use]
    pub const fn with_alert(mut self, alert: bool) -> Self {
        self.alert = alert;
        self
    }

    #[must_use]
    pub fn caused_by(mut self, previous: Self) -> Self {
        self.previous = Some(Box::new(previous));
        self
    }

    /// Set the category from its string form.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidEnum` if `category` is not a known category.
    pub fn set_category(&mut self, category: &str) -> Result<(), CoreError> {
        self.category = category.parse()?;
        Ok(())
    }

    /// Set the severity from its string form.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidEnum` if `severity` is not low/medium/high/critical.
    pub fn set_severity(&mut self, severity: &str) -> Result<(), CoreError> {
        self.severity = severity.parse()?;
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn previous(&self) -> Option<&Self> {
        self.previous.as_deref()
    }

    /// Source file and line where the error was constructed.
    #[must_use]
    pub const fn location(&self) -> (&'static str, u32) {
        (self.file, self.line)
    }

    /// Critical severity or an explicit alert flag.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical || self.alert
    }

    /// Validation, config and provider errors carry messages safe to show users.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        self.category.is_user_facing()
    }

    /// Full structured dump, suitable for an audit sink or JSON export.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            "message": self.message,
            "code": self.code,
            "category": self.category.as_str(),
            "severity": self.severity.as_str(),
            "component": self.component,
            "operation": self.operation,
            "file": self.file,
            "line": self.line,
            "context": self.context,
            "flags": {
                "critical": self.is_critical(),
                "user_facing": self.is_user_facing(),
                "alert": self.alert,
            },
            "previous": self.previous.as_ref().map(|p| p.to_value()),
        })
    }
}

impl fmt::Display for MasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operation.is_empty() {
            write!(f, "[{}/{}] {}", self.category, self.severity, self.message)
        } else {
            write!(
                f,
                "[{}/{}] {}::{}: {}",
                self.category, self.severity, self.component, self.operation, self.message
            )
        }
    }
}

impl std::error::Error for MasError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.previous
            .as_deref()
            .map(|p| p as &(dyn std::error::Error + 'static))
    }
}

impl From<CoreError> for MasError {
    #[track_caller]
    fn from(error: CoreError) -> Self {
        Self::new(error.to_string())
            .with_category(ErrorCategory::Validation)
            .with_severity(Severity::Low)
            .with_code("CORE_VALIDATION")
            .with_component("core")
    }
}
