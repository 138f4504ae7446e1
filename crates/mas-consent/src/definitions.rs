//! Consent definitions: create, update, cached lookup.

use std::time::Duration;

use chrono::{SubsecRound, Utc};
use mas_core::entities::ConsentDefinition;
use mas_core::enums::{AuditCategory, Severity};
use mas_db::helpers::format_datetime;
use serde_json::json;

use crate::error::ConsentError;
use crate::manager::{ConsentManager, EVENT_DEFINITION_CHANGED};
use crate::rows::{DEFINITION_COLUMNS, row_to_definition};
use crate::types::{ConsentDefinitionUpdate, NewConsentDefinition};

const CACHE_PREFIX: &str = "consent:definition";
const MAX_CODE_LEN: usize = 64;
const MAX_NAME_LEN: usize = 255;
/// Longest accepted expiry period, in months.
const MAX_EXPIRY_MONTHS: u32 = 120;

fn definition_key(code: &str) -> String {
    format!("{CACHE_PREFIX}:{code}")
}

fn list_key(active_only: bool) -> String {
    format!("{CACHE_PREFIX}s:{}", if active_only { "active" } else { "all" })
}

fn validate_code(code: &str) -> Result<(), ConsentError> {
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return Err(ConsentError::validation(format!(
            "code must be 1-{MAX_CODE_LEN} characters"
        )));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(ConsentError::validation(format!(
            "code '{code}' may only contain lowercase letters, digits and '_'"
        )));
    }
    Ok(())
}

fn validate_fields(name: &str, expiry_period: Option<u32>) -> Result<(), ConsentError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ConsentError::validation("name is required"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ConsentError::validation(format!(
            "name longer than {MAX_NAME_LEN} characters"
        )));
    }
    match expiry_period {
        Some(0) => Err(ConsentError::validation("expiry_period must be at least one month")),
        Some(months) if months > MAX_EXPIRY_MONTHS => Err(ConsentError::validation(format!(
            "expiry_period longer than {MAX_EXPIRY_MONTHS} months"
        ))),
        _ => Ok(()),
    }
}

impl ConsentManager {
    /// Create a definition at version 1.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Validation` for a malformed code, empty name or
    /// bad expiry period, and `ConsentError::DuplicateCode` if the code exists.
    pub async fn create_definition(
        &self,
        new: NewConsentDefinition,
    ) -> Result<ConsentDefinition, ConsentError> {
        validate_code(&new.code)?;
        validate_fields(&new.name, new.expiry_period)?;

        let now = Utc::now().trunc_subsecs(6);
        let definition = ConsentDefinition {
            code: new.code,
            name: new.name.trim().to_string(),
            description: new.description,
            version: 1,
            category: new.category,
            legal_basis: new.legal_basis,
            required: new.required,
            expiry_period: new.expiry_period,
            data_categories: new.data_categories,
            recipients: new.recipients,
            active: new.active,
            created_at: now,
            updated_at: now,
        };

        {
            let _guard = self.db.lock_writes().await;
            let exists = self
                .db
                .scalar_i64(
                    "SELECT COUNT(*) FROM consent_definitions WHERE code = ?1",
                    vec![libsql::Value::Text(definition.code.clone())],
                )
                .await?;
            if exists > 0 {
                return Err(ConsentError::DuplicateCode(definition.code));
            }
            self.db
                .conn()
                .execute(
                    &format!(
                        "INSERT INTO consent_definitions ({DEFINITION_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                    ),
                    libsql::params![
                        definition.code.as_str(),
                        definition.name.as_str(),
                        definition.description.as_str(),
                        i64::from(definition.version),
                        definition.category.as_str(),
                        definition.legal_basis.as_str(),
                        i64::from(definition.required),
                        definition.expiry_period.map(i64::from),
                        serde_json::to_string(&definition.data_categories)?,
                        serde_json::to_string(&definition.recipients)?,
                        i64::from(definition.active),
                        format_datetime(&definition.created_at),
                        format_datetime(&definition.updated_at)
                    ],
                )
                .await?;
        }

        self.invalidate_definitions();
        self.audit
            .log_event(
                AuditCategory::Consent,
                "definition_create",
                json!({"consent_code": definition.code, "version": definition.version}),
                Severity::Medium,
            )
            .await?;
        self.notify(
            EVENT_DEFINITION_CHANGED,
            json!({"code": definition.code, "version": definition.version, "created": true}),
        );
        tracing::info!(code = %definition.code, "consent definition created");
        Ok(definition)
    }

    /// Apply `update`. The version increments when a changed field is listed
    /// in `significant_fields`.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::DefinitionNotFound` for an unknown code and
    /// `ConsentError::Validation` for invalid new values.
    pub async fn update_definition(
        &self,
        code: &str,
        update: &ConsentDefinitionUpdate,
    ) -> Result<ConsentDefinition, ConsentError> {
        let (definition, changed, bumped) = {
            let _guard = self.db.lock_writes().await;
            let mut definition = self.load_definition(code).await?;
            let changed = update.apply(&mut definition);
            if changed.is_empty() {
                return Ok(definition);
            }
            validate_fields(&definition.name, definition.expiry_period)?;

            let bumped = changed.iter().any(|field| self.config.is_significant(field));
            if bumped {
                definition.version += 1;
            }
            definition.updated_at = Utc::now().trunc_subsecs(6);

            self.db
                .conn()
                .execute(
                    "UPDATE consent_definitions SET name = ?2, description = ?3, version = ?4,
                         category = ?5, legal_basis = ?6, required = ?7, expiry_period = ?8,
                         data_categories = ?9, recipients = ?10, active = ?11, updated_at = ?12
                     WHERE code = ?1",
                    libsql::params![
                        definition.code.as_str(),
                        definition.name.as_str(),
                        definition.description.as_str(),
                        i64::from(definition.version),
                        definition.category.as_str(),
                        definition.legal_basis.as_str(),
                        i64::from(definition.required),
                        definition.expiry_period.map(i64::from),
                        serde_json::to_string(&definition.data_categories)?,
                        serde_json::to_string(&definition.recipients)?,
                        i64::from(definition.active),
                        format_datetime(&definition.updated_at)
                    ],
                )
                .await?;
            (definition, changed, bumped)
        };

        self.invalidate_definitions();
        self.audit
            .log_event(
                AuditCategory::Consent,
                "definition_update",
                json!({
                    "consent_code": definition.code,
                    "changed": changed,
                    "version": definition.version,
                    "version_bumped": bumped,
                }),
                Severity::Medium,
            )
            .await?;
        self.notify(
            EVENT_DEFINITION_CHANGED,
            json!({"code": definition.code, "version": definition.version, "changed": changed}),
        );
        tracing::info!(code, version = definition.version, bumped, "consent definition updated");
        Ok(definition)
    }

    /// Look up one definition, through the cache.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::DefinitionNotFound` for an unknown code.
    pub async fn get_definition(&self, code: &str) -> Result<ConsentDefinition, ConsentError> {
        let key = definition_key(code);
        if let Some(cached) = self.cache.get(&key) {
            match serde_json::from_value(cached) {
                Ok(definition) => return Ok(definition),
                Err(error) => {
                    tracing::warn!(%key, %error, "discarding unreadable cached definition");
                    self.cache.delete(&key);
                }
            }
        }
        let definition = self.load_definition(code).await?;
        self.cache
            .set(&key, serde_json::to_value(&definition)?, Some(self.cache_ttl()));
        Ok(definition)
    }

    /// Every definition ordered by code, optionally only active ones.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if the query fails.
    pub async fn list_definitions(
        &self,
        active_only: bool,
    ) -> Result<Vec<ConsentDefinition>, ConsentError> {
        let key = list_key(active_only);
        if let Some(definitions) = self
            .cache
            .get(&key)
            .and_then(|cached| serde_json::from_value(cached).ok())
        {
            return Ok(definitions);
        }

        let filter = if active_only { "WHERE active = 1" } else { "" };
        let mut rows = self
            .db
            .conn()
            .query(
                &format!("SELECT {DEFINITION_COLUMNS} FROM consent_definitions {filter} ORDER BY code"),
                (),
            )
            .await?;
        let mut definitions = Vec::new();
        while let Some(row) = rows.next().await? {
            definitions.push(row_to_definition(&row)?);
        }
        self.cache
            .set(&key, serde_json::to_value(&definitions)?, Some(self.cache_ttl()));
        Ok(definitions)
    }

    async fn load_definition(&self, code: &str) -> Result<ConsentDefinition, ConsentError> {
        let mut rows = self
            .db
            .conn()
            .query(
                &format!("SELECT {DEFINITION_COLUMNS} FROM consent_definitions WHERE code = ?1"),
                [code],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| ConsentError::DefinitionNotFound(code.to_string()))?;
        Ok(row_to_definition(&row)?)
    }

    fn invalidate_definitions(&self) {
        let removed = self.cache.delete_prefix(CACHE_PREFIX);
        tracing::debug!(removed, "consent definition cache invalidated");
    }

    const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.definition_cache_ttl_secs)
    }
}
