//! Moving old events from the live log into `audit_log_archive`.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use mas_db::helpers::format_datetime;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::AuditError;
use crate::export::{ExportFormat, ExportOptions, ExportSummary};
use crate::logger::AuditLogger;
use crate::search::AuditFilter;

const ARCHIVE_COLUMNS: &str = "id, event_id, category, action, severity, user_id, customer_id, \
     ip_address, session_id, request_id, context, checksum, created_at";

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Rows per transaction; `None` uses `archive_batch_size`.
    pub batch_size: Option<u32>,
    /// Export the archived range first, in this format.
    pub export: Option<ExportFormat>,
    pub compress: bool,
    /// Where the export goes; `None` uses the export default.
    pub output_dir: Option<PathBuf>,
}

/// What an archive run moved.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub cutoff: DateTime<Utc>,
    pub archived: u64,
    pub batches: u32,
    /// SHA-256 over the archived checksums, in id order.
    pub integrity_hash: String,
    pub export: Option<ExportSummary>,
    pub duration_ms: u64,
}

impl AuditLogger {
    /// Archive every live event older than `days` days.
    ///
    /// Each batch is copied and deleted in one transaction, so a failure
    /// leaves earlier batches archived and later ones live.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Database` if a batch fails, or `AuditError::Io` if
    /// the requested export fails (nothing is archived in that case).
    pub async fn archive_logs(
        &self,
        days: u32,
        options: &ArchiveOptions,
    ) -> Result<ArchiveReport, AuditError> {
        let started = Instant::now();
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let batch = options
            .batch_size
            .unwrap_or(self.config.archive_batch_size)
            .max(1);

        let export = match options.export {
            Some(format) => {
                let mut export_options = ExportOptions {
                    compress: options.compress,
                    file_stem: Some(format!("archive-{}", cutoff.format("%Y%m%dT%H%M%SZ"))),
                    ..ExportOptions::default()
                };
                if let Some(dir) = &options.output_dir {
                    export_options.output_dir.clone_from(dir);
                }
                let filter = AuditFilter {
                    to: Some(cutoff),
                    ..AuditFilter::default()
                };
                Some(self.export_to_format(&filter, format, &export_options).await?)
            }
            None => None,
        };

        let cutoff_text = format_datetime(&cutoff);
        let mut hasher = Sha256::new();
        let mut archived = 0_u64;
        let mut batches = 0_u32;

        loop {
            let _guard = self.db.lock_writes().await;

            let mut rows = self
                .db
                .conn()
                .query(
                    &format!(
                        "SELECT id, checksum FROM audit_log WHERE created_at < ?1 ORDER BY id ASC LIMIT {batch}"
                    ),
                    [cutoff_text.as_str()],
                )
                .await?;
            let mut max_id = None;
            let mut count = 0_u64;
            while let Some(row) = rows.next().await? {
                max_id = Some(row.get::<i64>(0)?);
                hasher.update(row.get::<String>(1)?.as_bytes());
                hasher.update(b"\n");
                count += 1;
            }
            drop(rows);
            let Some(max_id) = max_id else { break };

            let archived_at = format_datetime(&Utc::now());
            let tx = self.db.conn().transaction().await?;
            tx.execute(
                &format!(
                    "INSERT INTO audit_log_archive ({ARCHIVE_COLUMNS}, archived_at)
                     SELECT {ARCHIVE_COLUMNS}, ?3 FROM audit_log
                     WHERE created_at < ?1 AND id <= ?2"
                ),
                libsql::params![cutoff_text.as_str(), max_id, archived_at.as_str()],
            )
            .await?;
            tx.execute(
                "DELETE FROM audit_log WHERE created_at < ?1 AND id <= ?2",
                libsql::params![cutoff_text.as_str(), max_id],
            )
            .await?;
            tx.commit().await?;

            archived += count;
            batches += 1;
            tracing::debug!(batch = batches, rows = count, "audit archive batch committed");
            if count < u64::from(batch) {
                break;
            }
        }

        let report = ArchiveReport {
            cutoff,
            archived,
            batches,
            integrity_hash: hex::encode(hasher.finalize()),
            export,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        tracing::info!(archived, batches, cutoff = %cutoff_text, "audit log archived");
        Ok(report)
    }

    /// Archive everything older than the configured `retention_days`.
    ///
    /// # Errors
    ///
    /// As [`Self::archive_logs`].
    pub async fn apply_retention(&self) -> Result<ArchiveReport, AuditError> {
        self.archive_logs(self.config.retention_days, &ArchiveOptions::default())
            .await
    }

    /// Number of rows in the archive table.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Database` if the count fails.
    pub async fn archived_count(&self) -> Result<u64, AuditError> {
        let n = self
            .db
            .scalar_i64("SELECT COUNT(*) FROM audit_log_archive", Vec::new())
            .await?;
        Ok(u64::try_from(n).unwrap_or_default())
    }
}
