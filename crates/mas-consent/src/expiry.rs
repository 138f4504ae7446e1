//! Expiry schedule sweeps.

use chrono::{DateTime, SubsecRound, Utc};
use mas_core::entities::{ConsentExpiry, ConsentLogEntry, ExpiryStatus};
use mas_core::enums::ConsentAction;
use mas_db::helpers::format_datetime;
use serde_json::json;

use crate::error::ConsentError;
use crate::log::insert_log_entry;
use crate::manager::ConsentManager;
use crate::rows::{EXPIRY_COLUMNS, row_to_expiry};

impl ConsentManager {
    /// Scheduled expiries for a customer (or all customers) that are still
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if the query fails.
    pub async fn scheduled_expiries(
        &self,
        customer_id: Option<i64>,
    ) -> Result<Vec<ConsentExpiry>, ConsentError> {
        self.expiries_where(
            "status = 'scheduled' AND (?1 IS NULL OR customer_id = ?1)",
            vec![customer_id.map_or(libsql::Value::Null, libsql::Value::Integer)],
        )
        .await
    }

    /// Every expiry row of a customer, any status.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if the query fails.
    pub async fn customer_expiries(&self, customer_id: i64) -> Result<Vec<ConsentExpiry>, ConsentError> {
        self.expiries_where("customer_id = ?1", vec![libsql::Value::Integer(customer_id)])
            .await
    }

    /// Write an `expire` row for every scheduled expiry due at `now` and mark
    /// it processed. Returns the processed rows.
    ///
    /// Queries already treat a passed expiry as lapsed, so calling this is
    /// only needed to make the history explicit.
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Database` if a write fails. Rows processed
    /// before the failure stay processed.
    pub async fn process_expired(&self, now: DateTime<Utc>) -> Result<Vec<ConsentExpiry>, ConsentError> {
        let due = self
            .expiries_where(
                "status = 'scheduled' AND expires_at <= ?1",
                vec![libsql::Value::Text(format_datetime(&now))],
            )
            .await?;

        let mut processed = Vec::with_capacity(due.len());
        for mut expiry in due {
            let accepted = self.get_log_entry(expiry.consent_log_id).await?;
            let definition = self.get_definition(&expiry.code).await?;
            let written_at = Utc::now().trunc_subsecs(6);

            let entry = {
                let _guard = self.db.lock_writes().await;
                let tx = self.db.conn().transaction().await?;
                let changed = tx
                    .execute(
                        "UPDATE consent_expiry SET status = 'processed', updated_at = ?2
                         WHERE id = ?1 AND status = 'scheduled'",
                        libsql::params![expiry.id, format_datetime(&written_at)],
                    )
                    .await?;
                if changed == 0 {
                    // Cancelled or processed since it was read.
                    continue;
                }
                let entry = insert_log_entry(
                    &tx,
                    ConsentLogEntry {
                        id: 0,
                        customer_id: expiry.customer_id,
                        code: expiry.code.clone(),
                        version: accepted.version,
                        action: ConsentAction::Expire,
                        metadata: json!({
                            "method": "expiry",
                            "expired_at": format_datetime(&expiry.expires_at),
                            "accepted_log_id": accepted.id,
                        }),
                        ip_address: String::new(),
                        user_agent: String::new(),
                        // Dated when the consent lapsed, never past the clock and never
                        // before the accept it closes.
                        created_at: expiry.expires_at.min(written_at).max(accepted.created_at),
                    },
                )
                .await?;
                tx.commit().await?;
                entry
            };

            self.after_change(&entry, &definition, Some(expiry.expires_at))
                .await?;
            expiry.status = ExpiryStatus::Processed;
            processed.push(expiry);
        }

        if !processed.is_empty() {
            tracing::info!(count = processed.len(), "consent expiries processed");
        }
        Ok(processed)
    }

    async fn expiries_where(
        &self,
        condition: &str,
        params: Vec<libsql::Value>,
    ) -> Result<Vec<ConsentExpiry>, ConsentError> {
        let mut rows = self
            .db
            .conn()
            .query(
                &format!(
                    "SELECT {EXPIRY_COLUMNS} FROM consent_expiry WHERE {condition} ORDER BY expires_at, id"
                ),
                libsql::params_from_iter(params),
            )
            .await?;
        let mut expiries = Vec::new();
        while let Some(row) = rows.next().await? {
            expiries.push(row_to_expiry(&row)?);
        }
        Ok(expiries)
    }
}
