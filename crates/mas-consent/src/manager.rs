//! `ConsentManager` construction and shared plumbing.

use std::sync::Arc;

use mas_audit::AuditLogger;
use mas_config::ConsentConfig;
use mas_core::cache::Cache;
use mas_core::events::{Event, EventDispatcher};
use mas_db::MasDb;
use serde_json::Value;

/// Event names dispatched by the consent manager.
pub const EVENT_ACCEPTED: &str = "consent.accepted";
pub const EVENT_REVOKED: &str = "consent.revoked";
pub const EVENT_EXPIRED: &str = "consent.expired";
pub const EVENT_DEFINITION_CHANGED: &str = "consent.definition_changed";

/// Consent lifecycle per (customer, code):
///
/// ```text
/// no-record → accepted ⇄ revoked
///             accepted → expired | withdrawn
/// ```
///
/// State is the latest row of the append-only `consent_log`. Expiry is
/// evaluated lazily against `consent_expiry` at query time;
/// [`ConsentManager::process_expired`] writes the matching `expire` rows on
/// demand.
pub struct ConsentManager {
    pub(crate) db: Arc<MasDb>,
    pub(crate) audit: Arc<AuditLogger>,
    pub(crate) cache: Arc<dyn Cache>,
    events: Arc<EventDispatcher>,
    pub(crate) config: ConsentConfig,
}

impl ConsentManager {
    pub fn new(
        db: Arc<MasDb>,
        audit: Arc<AuditLogger>,
        cache: Arc<dyn Cache>,
        events: Arc<EventDispatcher>,
        config: ConsentConfig,
    ) -> Self {
        Self {
            db,
            audit,
            cache,
            events,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ConsentConfig {
        &self.config
    }

    pub(crate) fn notify(&self, name: &str, payload: Value) {
        let delivered = self.events.dispatch(&Event::new(name, payload));
        tracing::trace!(event = name, delivered, "consent event dispatched");
    }
}

impl std::fmt::Debug for ConsentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentManager")
            .field("db", &self.db)
            .field("proof_of_record", &self.config.proof_of_record)
            .finish_non_exhaustive()
    }
}
