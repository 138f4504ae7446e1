//! Row mapping for `audit_log` / `audit_log_archive`.

use mas_core::entities::AuditEvent;
use mas_db::error::DatabaseError;
use mas_db::helpers::{format_datetime, get_opt_i64, parse_datetime, parse_enum, parse_json};
use serde::Serialize;

/// Column list shared by every `audit_log` read, in [`row_to_record`] order.
pub(crate) const EVENT_COLUMNS: &str = "id, event_id, category, action, severity, user_id, customer_id, \
     ip_address, session_id, request_id, context, checksum, created_at";

/// A stored event with its row id and a fresh integrity check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub id: i64,
    #[serde(flatten)]
    pub event: AuditEvent,
    /// Whether the stored checksum still matches the stored fields.
    pub integrity_ok: bool,
}

pub(crate) fn row_to_record(row: &libsql::Row) -> Result<AuditRecord, DatabaseError> {
    let event = AuditEvent {
        event_id: row.get::<String>(1)?,
        category: parse_enum(&row.get::<String>(2)?)?,
        action: row.get::<String>(3)?,
        severity: parse_enum(&row.get::<String>(4)?)?,
        user_id: get_opt_i64(row, 5)?,
        customer_id: get_opt_i64(row, 6)?,
        ip_address: row.get::<String>(7)?,
        session_id: row.get::<String>(8)?,
        request_id: row.get::<String>(9)?,
        context: parse_json(&row.get::<String>(10)?)?,
        checksum: row.get::<String>(11)?,
        created_at: parse_datetime(&row.get::<String>(12)?)?,
    };
    Ok(AuditRecord {
        id: row.get::<i64>(0)?,
        integrity_ok: event.verify_checksum(),
        event,
    })
}

/// Insert one event into `audit_log`.
pub(crate) async fn insert_event(
    conn: &libsql::Connection,
    event: &AuditEvent,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO audit_log (event_id, category, action, severity, user_id, customer_id,
                                ip_address, session_id, request_id, context, checksum, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        libsql::params![
            event.event_id.as_str(),
            event.category.as_str(),
            event.action.as_str(),
            event.severity.as_str(),
            event.user_id,
            event.customer_id,
            event.ip_address.as_str(),
            event.session_id.as_str(),
            event.request_id.as_str(),
            event.context.to_string(),
            event.checksum.as_str(),
            format_datetime(&event.created_at)
        ],
    )
    .await?;
    Ok(())
}
