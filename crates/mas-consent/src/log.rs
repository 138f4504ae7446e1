//! The consent log: recording, revoking and querying consent state.

use chrono::{DateTime, Months, SubsecRound, Utc};
use mas_core::entities::{ConsentDefinition, ConsentExpiry, ConsentLogEntry, ExpiryStatus};
use mas_core::enums::ConsentAction;
use mas_db::helpers::format_datetime;
use serde_json::{Value, json};

use crate::error::ConsentError;
use crate::manager::{ConsentManager, EVENT_ACCEPTED, EVENT_EXPIRED, EVENT_REVOKED};
use crate::proof;
use crate::rows::{LOG_COLUMNS, row_to_log_entry};
use crate::types::{ConsentMetadata, ConsentReceipt};

/// Cancel any scheduled expiry for the pair. Runs inside the caller's transaction.
pub(crate) async fn cancel_scheduled_expiry(
    conn: &libsql::Connection,
    customer_id: i64,
    code: &str,
    now: &str,
) -> Result<u64, ConsentError> {
    Ok(conn
        .execute(
            "UPDATE consent_expiry SET status = 'cancelled', updated_at = ?3
             WHERE customer_id = ?1 AND code = ?2 AND status = 'scheduled'",
            libsql::params![customer_id, code, now],
        )
        .await?)
}

/// Append one consent log row and return it with its id.
pub(crate) async fn insert_log_entry(
    conn: &libsql::Connection,
    mut entry: ConsentLogEntry,
) -> Result<ConsentLogEntry, ConsentError> {
    conn.execute(
        "INSERT INTO consent_log (customer_id, code, version, action, metadata, ip_address, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        libsql::params![
            entry.customer_id,
            entry.code.as_str(),
            i64::from(entry.version),
            entry.action.as_str(),
            entry.metadata.to_string(),
            entry.ip_address.as_str(),
            entry.user_agent.as_str(),
            format_datetime(&entry.created_at)
        ],
    )
    .await?;
    entry.id = conn.last_insert_rowid();
    Ok(entry)
}

fn validate_customer(customer_id: i64) -> Result<(), ConsentError> {
    if customer_id <= 0 {
        return Err(ConsentError::validation(format!(
            "customer_id must be positive, got {customer_id}"
        )));
    }
    Ok(())
}

/// `accepted_at + months`, clamped to the end of shorter months.
fn expiry_after(accepted_at: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>, ConsentError> {
    accepted_at
        .checked_add_months(Months::new(months))
        .ok_or_else(|| ConsentError::validation(format!("expiry of {months} months overflows")))
}

impl ConsentManager {
    /// Record an `accept` for `customer_id`.
    ///
    /// Writes the log row, a proof of record (when enabled) and the expiry
    /// schedule in one transaction. A previous scheduled expiry for the pair
    /// is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::DefinitionNotFound` or
    /// `ConsentError::InactiveDefinition` when the definition cannot be
    /// consented to.
    pub async fn record_consent(
        &self,
        customer_id: i64,
        code: &str,
        metadata: &ConsentMetadata,
    ) -> Result<ConsentReceipt, ConsentError> {
        validate_customer(customer_id)?;
        let definition = self.get_definition(code).await?;
        if !definition.active {
            return Err(ConsentError::InactiveDefinition(code.to_string()));
        }

        let request = self.audit.request_context();
        let (ip_address, user_agent, stored) = metadata.enrich(&request);
        let now = Utc::now().trunc_subsecs(6);
        let now_text = format_datetime(&now);
        let expires_at = definition
            .expiry_period
            .map(|months| expiry_after(now, months))
            .transpose()?;

        let receipt = {
            let _guard = self.db.lock_writes().await;
            let tx = self.db.conn().transaction().await?;

            let entry = insert_log_entry(
                &tx,
                ConsentLogEntry {
                    id: 0,
                    customer_id,
                    code: code.to_string(),
                    version: definition.version,
                    action: ConsentAction::Accept,
                    metadata: stored,
                    ip_address,
                    user_agent,
                    created_at: now,
                },
            )
            .await?;

            cancel_scheduled_expiry(&tx, customer_id, code, &now_text).await?;

            let expiry = match expires_at {
                Some(expires_at) => {
                    tx.execute(
                        "INSERT INTO consent_expiry
                             (customer_id, code, consent_log_id, expires_at, status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, 'scheduled', ?5, ?5)",
                        libsql::params![
                            customer_id,
                            code,
                            entry.id,
                            format_datetime(&expires_at),
                            now_text.as_str()
                        ],
                    )
                    .await?;
                    Some(ConsentExpiry {
                        id: tx.last_insert_rowid(),
                        customer_id,
                        code: code.to_string(),
                        consent_log_id: entry.id,
                        expires_at,
                        status: ExpiryStatus::Scheduled,
                    })
                }
                None => None,
            };

            let proof = if self.config.proof_of_record {
                Some(proof::insert_proof(&tx, &entry).await?)
            } else {
                None
            };

            tx.commit().await?;
            ConsentReceipt {
                entry,
                proof,
                expiry,
            }
        };

        self.after_change(&receipt.entry, &definition, receipt.expiry.as_ref().map(|e| e.expires_at))
            .await?;
        Ok(receipt)
    }

    /// Record a `revoke`. Cancels the scheduled expiry.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::NoActiveConsent` unless the customer currently
    /// has consent for `code`.
    pub async fn revoke_consent(
        &self,
        customer_id: i64,
        code: &str,
        metadata: &ConsentMetadata,
    ) -> Result<ConsentLogEntry, ConsentError> {
        validate_customer(customer_id)?;
        let definition = self.get_definition(code).await?;
        let Some(entry) = self
            .close_consent(customer_id, &definition, ConsentAction::Revoke, metadata)
            .await?
        else {
            return Err(ConsentError::NoActiveConsent {
                customer_id,
                code: code.to_string(),
            });
        };
        self.after_change(&entry, &definition, None).await?;
        Ok(entry)
    }

    /// Withdraw every active consent of a customer (GDPR Art. 7(3)).
    /// Returns the withdrawn codes.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if a write fails; codes withdrawn
    /// before the failure stay withdrawn.
    pub async fn withdraw_all(
        &self,
        customer_id: i64,
        metadata: &ConsentMetadata,
    ) -> Result<Vec<String>, ConsentError> {
        validate_customer(customer_id)?;
        let mut withdrawn = Vec::new();
        for definition in self.list_definitions(false).await? {
            let Some(entry) = self
                .close_consent(customer_id, &definition, ConsentAction::Withdraw, metadata)
                .await?
            else {
                continue;
            };
            self.after_change(&entry, &definition, None).await?;
            withdrawn.push(definition.code);
        }
        tracing::info!(customer_id, count = withdrawn.len(), "consents withdrawn");
        Ok(withdrawn)
    }

    /// Write a closing row (`revoke` / `withdraw`) and cancel the expiry.
    ///
    /// Returns `None` without writing when the customer holds no active
    /// consent. The check runs under the writer lock so two closers cannot
    /// both see the same `accept`.
    async fn close_consent(
        &self,
        customer_id: i64,
        definition: &ConsentDefinition,
        action: ConsentAction,
        metadata: &ConsentMetadata,
    ) -> Result<Option<ConsentLogEntry>, ConsentError> {
        let request = self.audit.request_context();
        let (ip_address, user_agent, stored) = metadata.enrich(&request);

        let _guard = self.db.lock_writes().await;
        let now = Utc::now().trunc_subsecs(6);
        if !self.has_consent_at(customer_id, &definition.code, now).await? {
            return Ok(None);
        }
        let tx = self.db.conn().transaction().await?;
        let entry = insert_log_entry(
            &tx,
            ConsentLogEntry {
                id: 0,
                customer_id,
                code: definition.code.clone(),
                version: definition.version,
                action,
                metadata: stored,
                ip_address,
                user_agent,
                created_at: now,
            },
        )
        .await?;
        cancel_scheduled_expiry(&tx, customer_id, &definition.code, &format_datetime(&now)).await?;
        tx.commit().await?;
        Ok(Some(entry))
    }

    /// Audit, notify and log a committed consent change.
    pub(crate) async fn after_change(
        &self,
        entry: &ConsentLogEntry,
        definition: &ConsentDefinition,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), ConsentError> {
        self.audit
            .log_consent_event(
                entry.customer_id,
                &entry.code,
                entry.action,
                json!({
                    "consent_log_id": entry.id,
                    "version": entry.version,
                    "method": entry.metadata.get("method").cloned().unwrap_or(Value::Null),
                }),
            )
            .await?;

        let name = match entry.action {
            ConsentAction::Accept => EVENT_ACCEPTED,
            ConsentAction::Expire => EVENT_EXPIRED,
            _ => EVENT_REVOKED,
        };
        self.notify(
            name,
            json!({
                "customer_id": entry.customer_id,
                "code": entry.code,
                "action": entry.action,
                "version": entry.version,
                "category": definition.category,
                "consent_log_id": entry.id,
                "expires_at": expires_at.map(|at| format_datetime(&at)),
            }),
        );
        tracing::info!(
            customer_id = entry.customer_id,
            code = %entry.code,
            action = %entry.action,
            "consent changed"
        );
        Ok(())
    }

    /// Whether the customer currently consents to `code`.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if a query fails.
    pub async fn has_consent(&self, customer_id: i64, code: &str) -> Result<bool, ConsentError> {
        self.has_consent_at(customer_id, code, Utc::now()).await
    }

    /// [`Self::has_consent`] evaluated at `now`: the latest action is
    /// `accept` and no scheduled expiry for the pair has passed.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if a query fails.
    pub async fn has_consent_at(
        &self,
        customer_id: i64,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ConsentError> {
        let Some(latest) = self.latest_entry(customer_id, code).await? else {
            return Ok(false);
        };
        if latest.action != ConsentAction::Accept {
            return Ok(false);
        }
        let passed = self
            .db
            .scalar_i64(
                "SELECT COUNT(*) FROM consent_expiry
                 WHERE customer_id = ?1 AND code = ?2 AND status = 'scheduled' AND expires_at <= ?3",
                vec![
                    libsql::Value::Integer(customer_id),
                    libsql::Value::Text(code.to_string()),
                    libsql::Value::Text(format_datetime(&now)),
                ],
            )
            .await?;
        Ok(passed == 0)
    }

    /// The most recent log row for the pair.
    pub(crate) async fn latest_entry(
        &self,
        customer_id: i64,
        code: &str,
    ) -> Result<Option<ConsentLogEntry>, ConsentError> {
        let mut rows = self
            .db
            .conn()
            .query(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM consent_log WHERE customer_id = ?1 AND code = ?2
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                libsql::params![customer_id, code],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_log_entry(&row)?)),
            None => Ok(None),
        }
    }

    /// A customer's consent log in chronological order, optionally for one code.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if the query fails.
    pub async fn consent_history(
        &self,
        customer_id: i64,
        code: Option<&str>,
    ) -> Result<Vec<ConsentLogEntry>, ConsentError> {
        let mut params = vec![libsql::Value::Integer(customer_id)];
        let mut sql = format!("SELECT {LOG_COLUMNS} FROM consent_log WHERE customer_id = ?1");
        if let Some(code) = code {
            params.push(libsql::Value::Text(code.to_string()));
            sql.push_str(" AND code = ?2");
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut rows = self
            .db
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut history = Vec::new();
        while let Some(row) = rows.next().await? {
            history.push(row_to_log_entry(&row)?);
        }
        Ok(history)
    }

    /// Fetch one log row.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::LogEntryNotFound` for an unknown id.
    pub async fn get_log_entry(&self, log_id: i64) -> Result<ConsentLogEntry, ConsentError> {
        let mut rows = self
            .db
            .conn()
            .query(
                &format!("SELECT {LOG_COLUMNS} FROM consent_log WHERE id = ?1"),
                [log_id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or(ConsentError::LogEntryNotFound(log_id))?;
        Ok(row_to_log_entry(&row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expiry_clamps_to_month_end() {
        let accepted = Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap();
        let expires = expiry_after(accepted, 1).unwrap();
        assert_eq!(expires, Utc.with_ymd_and_hms(2026, 2, 28, 12, 0, 0).unwrap());
        let yearly = expiry_after(accepted, 12).unwrap();
        assert_eq!(yearly, Utc.with_ymd_and_hms(2027, 1, 31, 12, 0, 0).unwrap());
    }

    #[test]
    fn customers_must_be_positive() {
        assert!(validate_customer(0).is_err());
        assert!(validate_customer(-3).is_err());
        assert!(validate_customer(42).is_ok());
    }
}
