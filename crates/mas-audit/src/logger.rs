//! The audit logging pipeline.
//!
//! `log_event` validates, enriches, masks, bounds and checksums an event,
//! persists it, updates counters, notifies listeners and raises alerts.
//! Storage failures never reach the caller: the event goes to the emergency
//! JSONL file and the outcome says so.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use chrono::{SubsecRound, Utc};
use mas_config::AuditConfig;
use mas_core::entities::{AuditEvent, RequestContext};
use mas_core::enums::{AuditCategory, ConsentAction, Severity};
use mas_core::events::{Event, EventDispatcher};
use mas_core::runtime::{self, PREFIX_EVENT};
use mas_db::MasDb;
use serde_json::{Map, Value, json};

use crate::emergency::{EmergencyLog, EmergencyRecord};
use crate::error::AuditError;
use crate::masking::{self, Masker};
use crate::record;
use crate::stats::{AuditStats, Counters};

/// Event names dispatched by the logger.
pub const EVENT_LOGGED: &str = "audit.event_logged";
pub const EVENT_ALERT: &str = "audit.alert";

const MAX_ACTION_LEN: usize = 100;

/// What happened to a logged event.
#[derive(Debug, Clone, PartialEq)]
pub enum LogOutcome {
    /// Stored in `audit_log`.
    Persisted(AuditEvent),
    /// The database rejected it; it went to the emergency file.
    Emergency { event_id: String, error: String },
    /// Logging is switched off.
    Disabled,
}

impl LogOutcome {
    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Persisted(event) => Some(&event.event_id),
            Self::Emergency { event_id, .. } => Some(event_id),
            Self::Disabled => None,
        }
    }

    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted(_))
    }
}

/// Records structured, masked, checksummed audit events.
pub struct AuditLogger {
    pub(crate) db: Arc<MasDb>,
    pub(crate) config: AuditConfig,
    events: Arc<EventDispatcher>,
    masker: Masker,
    emergency: EmergencyLog,
    request: RwLock<RequestContext>,
    counters: Mutex<Counters>,
}

impl AuditLogger {
    pub fn new(db: Arc<MasDb>, config: AuditConfig, events: Arc<EventDispatcher>) -> Self {
        let masker = Masker::new(&config.sensitive_fields, &config.redact_fields);
        let emergency = EmergencyLog::new(&config.emergency_log_path);
        Self {
            db,
            config,
            events,
            masker,
            emergency,
            request: RwLock::new(RequestContext::default()),
            counters: Mutex::new(Counters::default()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuditConfig {
        &self.config
    }

    #[must_use]
    pub const fn emergency_log(&self) -> &EmergencyLog {
        &self.emergency
    }

    /// Replace the request facts attached to subsequent events.
    pub fn set_request_context(&self, context: RequestContext) {
        *self.request.write().unwrap_or_else(PoisonError::into_inner) = context;
    }

    #[must_use]
    pub fn request_context(&self) -> RequestContext {
        self.request
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Counters since this logger was created.
    #[must_use]
    pub fn stats(&self) -> AuditStats {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Record one event.
    ///
    /// `context` must be a JSON object (or `null`). Numeric `user_id` /
    /// `customer_id` keys in it override the request context's ids.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Validation` for an empty or malformed action or a
    /// non-object context. Storage failures are reported through
    /// [`LogOutcome::Emergency`], not as errors.
    pub async fn log_event(
        &self,
        category: AuditCategory,
        action: &str,
        context: Value,
        severity: Severity,
    ) -> Result<LogOutcome, AuditError> {
        if !self.config.enabled {
            return Ok(LogOutcome::Disabled);
        }
        let started = Instant::now();
        let action = validate_action(action)?;
        let context = match context {
            Value::Null => Value::Object(Map::new()),
            Value::Object(_) => context,
            other => {
                return Err(AuditError::validation(format!(
                    "context must be a JSON object, got {}",
                    json_type(&other)
                )));
            }
        };

        let event = self.build_event(category, action, context, severity);

        // Outside the guard, the insert could land inside another writer's
        // open transaction and vanish with its rollback.
        let inserted = {
            let _guard = self.db.lock_writes().await;
            record::insert_event(self.db.conn(), &event).await
        };
        if let Err(error) = inserted {
            return Ok(self.divert(&event, &error.to_string()));
        }

        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(category, severity, started.elapsed());

        self.events.dispatch(&Event::new(
            EVENT_LOGGED,
            json!({
                "event_id": event.event_id,
                "category": event.category,
                "action": event.action,
                "severity": event.severity,
            }),
        ));

        if self.should_alert(&event) {
            if let Err(error) = self.raise_alert(&event).await {
                tracing::warn!(event_id = %event.event_id, %error, "failed to record audit alert");
            }
        }

        tracing::debug!(
            event_id = %event.event_id,
            key = %event.event_key(),
            severity = %severity,
            "audit event logged"
        );
        Ok(LogOutcome::Persisted(event))
    }

    /// [`Self::log_event`] with category and severity given as strings.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Validation` for an unknown category or severity.
    pub async fn log_event_raw(
        &self,
        category: &str,
        action: &str,
        context: Value,
        severity: &str,
    ) -> Result<LogOutcome, AuditError> {
        let category: AuditCategory = category.parse()?;
        let severity: Severity = severity.parse()?;
        self.log_event(category, action, context, severity).await
    }

    fn build_event(
        &self,
        category: AuditCategory,
        action: String,
        context: Value,
        severity: Severity,
    ) -> AuditEvent {
        let request = self.request_context();
        let user_id = context.get("user_id").and_then(Value::as_i64).or(request.user_id);
        let customer_id = context
            .get("customer_id")
            .and_then(Value::as_i64)
            .or(request.customer_id);

        let masked = if self.config.masking_enabled {
            self.masker.mask(category, &context)
        } else {
            context
        };

        let mut event = AuditEvent {
            event_id: runtime::generate_id(PREFIX_EVENT),
            category,
            action,
            severity,
            user_id,
            customer_id,
            ip_address: request.ip_address,
            session_id: request.session_id,
            request_id: request.request_id,
            context: masking::bound_context(masked, self.config.max_context_bytes),
            checksum: String::new(),
            created_at: Utc::now().trunc_subsecs(6),
        };
        event.checksum = event.compute_checksum();
        event
    }

    /// Write an event the database rejected to the emergency file.
    fn divert(&self, event: &AuditEvent, error: &str) -> LogOutcome {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_emergency();

        let record = EmergencyRecord {
            event_id: event.event_id.clone(),
            category: event.category.as_str().to_string(),
            action: event.action.clone(),
            severity: event.severity.as_str().to_string(),
            context: event.context.clone(),
            checksum: Some(event.checksum.clone()),
            error: error.to_string(),
            created_at: event.created_at,
        };
        match self.emergency.append(&record) {
            Ok(()) => tracing::error!(
                event_id = %event.event_id,
                path = %self.emergency.path().display(),
                %error,
                "audit event diverted to emergency log"
            ),
            Err(write_error) => tracing::error!(
                event_id = %event.event_id,
                %error,
                %write_error,
                "audit event lost: emergency log unwritable"
            ),
        }
        LogOutcome::Emergency {
            event_id: event.event_id.clone(),
            error: error.to_string(),
        }
    }

    fn should_alert(&self, event: &AuditEvent) -> bool {
        event.severity == Severity::Critical || self.config.alert_events.contains(&event.event_key())
    }

    async fn raise_alert(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let message = format!(
            "{} event {} ({})",
            event.severity,
            event.event_key(),
            event.event_id
        );
        {
            let _guard = self.db.lock_writes().await;
            self.db
                .conn()
                .execute(
                    "INSERT INTO audit_alerts (event_id, category, action, severity, message, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    libsql::params![
                        event.event_id.as_str(),
                        event.category.as_str(),
                        event.action.as_str(),
                        event.severity.as_str(),
                        message.as_str(),
                        mas_db::helpers::format_datetime(&event.created_at)
                    ],
                )
                .await?;
        }

        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_alert();
        self.events.dispatch(&Event::new(
            EVENT_ALERT,
            json!({
                "event_id": event.event_id,
                "key": event.event_key(),
                "severity": event.severity,
                "message": message,
            }),
        ));
        if self.config.real_time_alerts {
            tracing::warn!(event_id = %event.event_id, key = %event.event_key(), "{message}");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Convenience entry points
    // -----------------------------------------------------------------------

    /// Login, logout, password reset and similar. Failures are logged as
    /// `<action>_failed` at medium severity.
    ///
    /// # Errors
    ///
    /// As [`Self::log_event`].
    pub async fn log_authentication(
        &self,
        action: &str,
        user_id: Option<i64>,
        success: bool,
        context: Value,
    ) -> Result<LogOutcome, AuditError> {
        let action = if success || action.ends_with("_failed") {
            action.to_string()
        } else {
            format!("{action}_failed")
        };
        let severity = if success { Severity::Low } else { Severity::Medium };
        let context = merge(context, json!({"user_id": user_id, "success": success}));
        self.log_event(AuditCategory::Authentication, &action, context, severity)
            .await
    }

    /// A read of personal or business data.
    ///
    /// # Errors
    ///
    /// As [`Self::log_event`].
    pub async fn log_data_access(
        &self,
        resource: &str,
        record_id: Option<&str>,
        context: Value,
    ) -> Result<LogOutcome, AuditError> {
        let context = merge(context, json!({"resource": resource, "record_id": record_id}));
        self.log_event(AuditCategory::DataAccess, "read", context, Severity::Low)
            .await
    }

    /// A create/update/delete of stored data, with optional before/after images.
    ///
    /// # Errors
    ///
    /// As [`Self::log_event`].
    pub async fn log_data_modification(
        &self,
        resource: &str,
        operation: &str,
        before: Option<Value>,
        after: Option<Value>,
        context: Value,
    ) -> Result<LogOutcome, AuditError> {
        let severity = if operation == "delete" {
            Severity::Medium
        } else {
            Severity::Low
        };
        let context = merge(
            context,
            json!({"resource": resource, "before": before, "after": after}),
        );
        self.log_event(AuditCategory::DataModification, operation, context, severity)
            .await
    }

    /// # Errors
    ///
    /// As [`Self::log_event`].
    pub async fn log_security_event(
        &self,
        action: &str,
        severity: Severity,
        context: Value,
    ) -> Result<LogOutcome, AuditError> {
        self.log_event(AuditCategory::Security, action, context, severity)
            .await
    }

    /// A consent lifecycle change for one customer.
    ///
    /// # Errors
    ///
    /// As [`Self::log_event`].
    pub async fn log_consent_event(
        &self,
        customer_id: i64,
        code: &str,
        action: ConsentAction,
        context: Value,
    ) -> Result<LogOutcome, AuditError> {
        let context = merge(context, json!({"customer_id": customer_id, "consent_code": code}));
        self.log_event(AuditCategory::Consent, action.as_str(), context, Severity::Low)
            .await
    }

    /// A data-subject request (`data_export`, `data_erasure`, ...) and its
    /// status (`requested`, `completed`).
    ///
    /// # Errors
    ///
    /// As [`Self::log_event`].
    pub async fn log_gdpr_request(
        &self,
        customer_id: i64,
        request_type: &str,
        status: &str,
        context: Value,
    ) -> Result<LogOutcome, AuditError> {
        let severity = if request_type == "data_erasure" {
            Severity::High
        } else {
            Severity::Medium
        };
        let context = merge(context, json!({"customer_id": customer_id, "status": status}));
        self.log_event(AuditCategory::Gdpr, request_type, context, severity)
            .await
    }

    /// # Errors
    ///
    /// As [`Self::log_event`].
    pub async fn log_configuration_change(
        &self,
        key: &str,
        old_value: Value,
        new_value: Value,
        context: Value,
    ) -> Result<LogOutcome, AuditError> {
        let context = merge(
            context,
            json!({"key": key, "old_value": old_value, "new_value": new_value}),
        );
        self.log_event(AuditCategory::Configuration, "update", context, Severity::Medium)
            .await
    }

    /// # Errors
    ///
    /// As [`Self::log_event`].
    pub async fn log_system_event(
        &self,
        action: &str,
        severity: Severity,
        context: Value,
    ) -> Result<LogOutcome, AuditError> {
        self.log_event(AuditCategory::System, action, context, severity)
            .await
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("db", &self.db)
            .field("enabled", &self.config.enabled)
            .finish_non_exhaustive()
    }
}

fn validate_action(action: &str) -> Result<String, AuditError> {
    let action = action.trim();
    if action.is_empty() {
        return Err(AuditError::validation("action must not be empty"));
    }
    if action.len() > MAX_ACTION_LEN {
        return Err(AuditError::validation(format!(
            "action longer than {MAX_ACTION_LEN} characters"
        )));
    }
    if !action
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(AuditError::validation(format!(
            "action '{action}' may only contain letters, digits, '_', '.' and '-'"
        )));
    }
    Ok(action.to_string())
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Add `extra`'s keys to `context` without overwriting caller-supplied ones.
fn merge(context: Value, extra: Value) -> Value {
    let mut base = match context {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    if let Value::Object(extra) = extra {
        for (key, value) in extra {
            base.entry(key).or_insert(value);
        }
    }
    Value::Object(base)
}
