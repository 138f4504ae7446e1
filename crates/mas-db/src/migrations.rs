//! Database migration runner.
//!
//! Embeds the SQL migration files at compile time and executes them on
//! database open. All statements use `IF NOT EXISTS` for idempotent re-running.

use crate::MasDb;
use crate::error::DatabaseError;

/// Audit log, archive and alert tables.
const MIGRATION_001: &str = include_str!("../migrations/001_audit.sql");
/// Consent definitions, log, expiry schedule and proofs.
const MIGRATION_002: &str = include_str!("../migrations/002_consent.sql");

const MIGRATIONS: [(&str, &str); 2] = [("001_audit", MIGRATION_001), ("002_consent", MIGRATION_002)];

impl MasDb {
    /// Run all embedded migrations in sequence.
    pub(crate) async fn run_migrations(&self) -> Result<(), DatabaseError> {
        for (name, sql) in MIGRATIONS {
            self.conn
                .execute_batch(sql)
                .await
                .map_err(|e| DatabaseError::Migration(format!("{name}: {e}")))?;
            tracing::debug!(migration = name, "migration applied");
        }
        Ok(())
    }
}
