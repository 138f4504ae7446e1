//! Filtered, paginated reads over the live audit log.

use std::time::Instant;

use chrono::{DateTime, Utc};
use mas_core::enums::{AuditCategory, Severity};
use mas_db::helpers::format_datetime;
use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::logger::AuditLogger;
use crate::record::{AuditRecord, EVENT_COLUMNS, row_to_record};

/// Upper bound on a single search page.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Filter criteria for audit queries. Empty fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub category: Option<AuditCategory>,
    /// Substring of the action.
    pub action: Option<String>,
    /// Any of these severities.
    #[serde(default)]
    pub severities: Vec<Severity>,
    pub user_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub ip_address: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
    /// Free text matched against context, action and event id.
    pub search: Option<String>,
}

impl AuditFilter {
    #[must_use]
    pub fn category(mut self, category: AuditCategory) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    /// Render as a `WHERE` clause (possibly empty) plus positional params.
    pub(crate) fn to_sql(&self) -> (String, Vec<libsql::Value>) {
        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(category) = self.category {
            params.push(libsql::Value::Text(category.as_str().to_string()));
            conditions.push(format!("category = ?{}", params.len()));
        }
        if let Some(ref action) = self.action {
            params.push(libsql::Value::Text(like_pattern(action)));
            conditions.push(format!("action LIKE ?{} ESCAPE '\\'", params.len()));
        }
        if !self.severities.is_empty() {
            let mut slots = Vec::with_capacity(self.severities.len());
            for severity in &self.severities {
                params.push(libsql::Value::Text(severity.as_str().to_string()));
                slots.push(format!("?{}", params.len()));
            }
            conditions.push(format!("severity IN ({})", slots.join(", ")));
        }
        if let Some(user_id) = self.user_id {
            params.push(libsql::Value::Integer(user_id));
            conditions.push(format!("user_id = ?{}", params.len()));
        }
        if let Some(customer_id) = self.customer_id {
            params.push(libsql::Value::Integer(customer_id));
            conditions.push(format!("customer_id = ?{}", params.len()));
        }
        if let Some(ref ip) = self.ip_address {
            params.push(libsql::Value::Text(ip.clone()));
            conditions.push(format!("ip_address = ?{}", params.len()));
        }
        if let Some(from) = self.from {
            params.push(libsql::Value::Text(format_datetime(&from)));
            conditions.push(format!("created_at >= ?{}", params.len()));
        }
        if let Some(to) = self.to {
            params.push(libsql::Value::Text(format_datetime(&to)));
            conditions.push(format!("created_at < ?{}", params.len()));
        }
        if let Some(ref text) = self.search {
            params.push(libsql::Value::Text(like_pattern(text)));
            let n = params.len();
            conditions.push(format!(
                "(context LIKE ?{n} ESCAPE '\\' OR action LIKE ?{n} ESCAPE '\\' OR event_id LIKE ?{n} ESCAPE '\\')"
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (where_clause, params)
    }
}

/// `%text%` with LIKE metacharacters escaped.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub records: Vec<AuditRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub elapsed_ms: u64,
}

/// Result of re-checking stored checksums.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub checked: u64,
    pub valid: u64,
    /// Event ids whose checksum no longer matches.
    pub invalid: Vec<String>,
}

impl IntegrityReport {
    #[must_use]
    pub const fn is_intact(&self) -> bool {
        self.invalid.is_empty()
    }
}

impl AuditLogger {
    /// Newest-first page of events matching `filter`. `page` is 1-based;
    /// `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Database` if a query fails.
    pub async fn search_logs(
        &self,
        filter: &AuditFilter,
        page: u32,
        limit: u32,
    ) -> Result<AuditPage, AuditError> {
        let started = Instant::now();
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let (where_clause, params) = filter.to_sql();

        let total = self
            .db
            .scalar_i64(
                &format!("SELECT COUNT(*) FROM audit_log {where_clause}"),
                params.clone(),
            )
            .await?;
        let total = u64::try_from(total).unwrap_or_default();

        let offset = u64::from(page - 1) * u64::from(limit);
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM audit_log {where_clause}
             ORDER BY created_at DESC, id DESC LIMIT {limit} OFFSET {offset}"
        );
        let mut rows = self
            .db
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_record(&row)?);
        }

        let total_pages = u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(total, page, limit, elapsed_ms, "audit search");

        Ok(AuditPage {
            records,
            total,
            page,
            limit,
            total_pages,
            elapsed_ms,
        })
    }

    /// Fetch one stored event.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` if no live event has this id.
    pub async fn get_event(&self, event_id: &str) -> Result<AuditRecord, AuditError> {
        let mut rows = self
            .db
            .conn()
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM audit_log WHERE event_id = ?1"),
                [event_id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| AuditError::NotFound(event_id.to_string()))?;
        Ok(row_to_record(&row)?)
    }

    /// Whether a stored event's checksum still matches its fields.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` if no live event has this id.
    pub async fn verify_event(&self, event_id: &str) -> Result<bool, AuditError> {
        Ok(self.get_event(event_id).await?.integrity_ok)
    }

    /// Re-check every event matching `filter`, page by page.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Database` if a query fails.
    pub async fn verify_range(&self, filter: &AuditFilter) -> Result<IntegrityReport, AuditError> {
        let mut report = IntegrityReport::default();
        self.scan(filter, |record| {
            report.checked += 1;
            if record.integrity_ok {
                report.valid += 1;
            } else {
                report.invalid.push(record.event.event_id.clone());
            }
            Ok(())
        })
        .await?;
        if !report.is_intact() {
            tracing::warn!(invalid = report.invalid.len(), "audit integrity check failed");
        }
        Ok(report)
    }

    /// Visit every event matching `filter` in id order, `export_batch_size`
    /// rows at a time.
    pub(crate) async fn scan<F>(&self, filter: &AuditFilter, mut visit: F) -> Result<u64, AuditError>
    where
        F: FnMut(&AuditRecord) -> Result<(), AuditError>,
    {
        let (where_clause, params) = filter.to_sql();
        let batch = self.config.export_batch_size.max(1);
        let cursor_slot = params.len() + 1;
        let cursor_clause = if where_clause.is_empty() {
            format!("WHERE id > ?{cursor_slot}")
        } else {
            format!("{where_clause} AND id > ?{cursor_slot}")
        };
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM audit_log {cursor_clause} ORDER BY id ASC LIMIT {batch}"
        );

        let mut last_id = 0_i64;
        let mut visited = 0_u64;
        loop {
            let mut page_params = params.clone();
            page_params.push(libsql::Value::Integer(last_id));
            let mut rows = self
                .db
                .conn()
                .query(&sql, libsql::params_from_iter(page_params))
                .await?;
            let mut fetched = 0_u32;
            while let Some(row) = rows.next().await? {
                let record = row_to_record(&row)?;
                last_id = record.id;
                visit(&record)?;
                fetched += 1;
                visited += 1;
            }
            if fetched < batch {
                break;
            }
        }
        Ok(visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_filter_has_no_where() {
        let (sql, params) = AuditFilter::default().to_sql();
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn params_are_numbered_in_order() {
        let filter = AuditFilter {
            category: Some(AuditCategory::Security),
            severities: vec![Severity::High, Severity::Critical],
            customer_id: Some(7),
            search: Some("50%_off".into()),
            ..AuditFilter::default()
        };
        let (sql, params) = filter.to_sql();
        assert_eq!(
            sql,
            "WHERE category = ?1 AND severity IN (?2, ?3) AND customer_id = ?4 AND \
             (context LIKE ?5 ESCAPE '\\' OR action LIKE ?5 ESCAPE '\\' OR event_id LIKE ?5 ESCAPE '\\')"
        );
        assert_eq!(params.len(), 5);
        assert!(matches!(&params[4], libsql::Value::Text(t) if t == "%50\\%\\_off%"));
    }
}
