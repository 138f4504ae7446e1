//! Alert records raised by the logging pipeline.

use chrono::{DateTime, Utc};
use mas_core::enums::{AuditCategory, Severity};
use mas_db::error::DatabaseError;
use mas_db::helpers::{get_bool, parse_datetime, parse_enum};
use serde::Serialize;

use crate::error::AuditError;
use crate::logger::AuditLogger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditAlert {
    pub id: i64,
    pub event_id: String,
    pub category: AuditCategory,
    pub action: String,
    pub severity: Severity,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
}

fn row_to_alert(row: &libsql::Row) -> Result<AuditAlert, DatabaseError> {
    Ok(AuditAlert {
        id: row.get::<i64>(0)?,
        event_id: row.get::<String>(1)?,
        category: parse_enum(&row.get::<String>(2)?)?,
        action: row.get::<String>(3)?,
        severity: parse_enum(&row.get::<String>(4)?)?,
        message: row.get::<String>(5)?,
        created_at: parse_datetime(&row.get::<String>(6)?)?,
        acknowledged: get_bool(row, 7)?,
    })
}

impl AuditLogger {
    /// Open alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Database` if the query fails.
    pub async fn unacknowledged_alerts(&self, limit: u32) -> Result<Vec<AuditAlert>, AuditError> {
        let mut rows = self
            .db
            .conn()
            .query(
                "SELECT id, event_id, category, action, severity, message, created_at, acknowledged
                 FROM audit_alerts WHERE acknowledged = 0
                 ORDER BY created_at DESC, id DESC LIMIT ?1",
                [i64::from(limit)],
            )
            .await?;
        let mut alerts = Vec::new();
        while let Some(row) = rows.next().await? {
            alerts.push(row_to_alert(&row)?);
        }
        Ok(alerts)
    }

    /// Mark an alert as reviewed. Returns whether an open alert was updated.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Database` if the update fails.
    pub async fn acknowledge_alert(&self, alert_id: i64) -> Result<bool, AuditError> {
        let _guard = self.db.lock_writes().await;
        let changed = self
            .db
            .conn()
            .execute(
                "UPDATE audit_alerts SET acknowledged = 1 WHERE id = ?1 AND acknowledged = 0",
                [alert_id],
            )
            .await?;
        if changed > 0 {
            tracing::info!(alert_id, "audit alert acknowledged");
        }
        Ok(changed > 0)
    }
}
