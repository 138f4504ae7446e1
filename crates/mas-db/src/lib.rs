//! # mas-db
//!
//! libSQL storage for the MAS audit and consent stores.
//!
//! Holds the audit log, its archive and alert tables, and the consent
//! definitions, log, expiry schedule and proofs. Migrations are embedded and
//! run on open.

pub mod error;
pub mod helpers;
mod migrations;

use error::DatabaseError;
use libsql::Builder;
use tokio::sync::{Mutex, MutexGuard};

/// Central database handle shared by the audit logger and consent manager.
///
/// Reads go straight to the connection. Every write takes
/// [`MasDb::lock_writes`] first. Transactions live on the shared connection,
/// so an unguarded statement issued while one is open would join it. The
/// guard is not reentrant: never log an audit event while holding it.
pub struct MasDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
    writer: Mutex<()>,
    path: String,
}

impl MasDb {
    /// Open a local database at the given path, or `":memory:"`.
    ///
    /// Runs migrations automatically on first open. Parent directories of a
    /// file path are created.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let parent = (path != ":memory:")
            .then(|| std::path::Path::new(path).parent())
            .flatten()
            .filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::Migration(format!("create {}: {e}", parent.display())))?;
        }

        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys (must be per-connection in SQLite)
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let mas_db = Self {
            db,
            conn,
            writer: Mutex::new(()),
            path: path.to_string(),
        };
        mas_db.run_migrations().await?;
        tracing::debug!(path, "database opened");
        Ok(mas_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Location this database was opened from.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Serialize a multi-statement write. Hold the guard for its duration.
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    /// Run a query returning a single integer (`COUNT(*)`, `MAX(id)`, ...).
    ///
    /// SQL NULL reads as `0`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn scalar_i64(
        &self,
        sql: &str,
        params: Vec<libsql::Value>,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self.conn.query(sql, libsql::params_from_iter(params)).await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<Option<i64>>(0)?.unwrap_or(0))
    }
}

impl std::fmt::Debug for MasDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasDb").field("path", &self.path).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpers::format_datetime;

    async fn test_db() -> MasDb {
        MasDb::open_local(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn open_local_creates_schema() {
        let db = test_db().await;
        let tables = [
            "audit_log",
            "audit_log_archive",
            "audit_alerts",
            "consent_definitions",
            "consent_log",
            "consent_expiry",
            "consent_proofs",
        ];
        for table in &tables {
            let mut rows = db
                .conn()
                .query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap();
            assert!(row.is_some(), "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn idempotent_migrations() {
        let db = test_db().await;
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn audit_event_id_is_unique() {
        let db = test_db().await;
        let now = format_datetime(&chrono::Utc::now());
        let insert = "INSERT INTO audit_log (event_id, category, action, severity, checksum, created_at)
                      VALUES ('evt-1', 'system', 'boot', 'low', 'abc', ?1)";
        db.conn().execute(insert, [now.as_str()]).await.unwrap();
        assert!(db.conn().execute(insert, [now.as_str()]).await.is_err());
    }

    #[tokio::test]
    async fn consent_log_requires_definition() {
        let db = test_db().await;
        let now = format_datetime(&chrono::Utc::now());
        let result = db
            .conn()
            .execute(
                "INSERT INTO consent_log (customer_id, code, version, action, created_at)
                 VALUES (1, 'missing', 1, 'accept', ?1)",
                [now.as_str()],
            )
            .await;
        assert!(result.is_err(), "foreign key on consent_log.code should hold");
    }

    #[tokio::test]
    async fn scalar_counts_rows() {
        let db = test_db().await;
        assert_eq!(
            db.scalar_i64("SELECT COUNT(*) FROM audit_log", Vec::new())
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            db.scalar_i64("SELECT MAX(id) FROM audit_log", Vec::new())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn file_database_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/store/mas.db");
        let db = MasDb::open_local(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), path.to_str().unwrap());
    }
}
