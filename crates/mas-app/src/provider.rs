//! Service providers: units of container registration.

use std::sync::Arc;

use mas_audit::AuditLogger;
use mas_config::MasConfig;
use mas_consent::ConsentManager;
use mas_container::{ContainerError, Definition, ServiceContainer, ServiceOptions};
use mas_core::cache::Cache;
use mas_core::events::EventDispatcher;
use mas_db::MasDb;

/// Canonical service ids.
pub mod services {
    pub const CONFIG: &str = "mas.config";
    pub const DB: &str = "mas.db";
    pub const CACHE: &str = "mas.cache";
    pub const EVENTS: &str = "mas.events";
    pub const AUDIT_LOGGER: &str = "mas.audit_logger";
    pub const CONSENT_MANAGER: &str = "mas.consent_manager";
}

/// Tags attached to core registrations.
pub mod tags {
    /// Infrastructure every other service builds on.
    pub const CORE: &str = "mas.core";
    /// Services that produce regulatory evidence.
    pub const COMPLIANCE: &str = "mas.compliance";
}

const ALIASES: [(&str, &str); 6] = [
    ("config", services::CONFIG),
    ("db", services::DB),
    ("cache", services::CACHE),
    ("events", services::EVENTS),
    ("audit", services::AUDIT_LOGGER),
    ("consent", services::CONSENT_MANAGER),
];

/// Registers a group of services into a container.
///
/// [`crate::Mas`] runs each provider once, keyed by [`ServiceProvider::name`].
pub trait ServiceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns `ContainerError` if any registration is rejected.
    fn register(&self, container: &ServiceContainer) -> Result<(), ContainerError>;
}

/// Registers the MAS core: configuration, database, cache, events, the audit
/// logger and the consent manager.
///
/// Infrastructure is registered as ready instances. The audit logger and
/// consent manager are lazy singletons resolved through their dependencies.
pub struct MasServiceProvider {
    config: Arc<MasConfig>,
    db: Arc<MasDb>,
    cache: Arc<dyn Cache>,
    events: Arc<EventDispatcher>,
}

impl MasServiceProvider {
    pub fn new(
        config: Arc<MasConfig>,
        db: Arc<MasDb>,
        cache: Arc<dyn Cache>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            config,
            db,
            cache,
            events,
        }
    }
}

impl ServiceProvider for MasServiceProvider {
    fn name(&self) -> &str {
        "mas"
    }

    fn register(&self, container: &ServiceContainer) -> Result<(), ContainerError> {
        container.set(
            services::CONFIG,
            Definition::shared(Arc::clone(&self.config)),
            core_options("Layered MAS configuration"),
        )?;
        container.set(
            services::DB,
            Definition::shared(Arc::clone(&self.db)),
            core_options("libSQL audit and consent store").meta("path", self.db.path()),
        )?;
        // Stored as `Arc<dyn Cache>`; resolve with `get::<Arc<dyn Cache>>`.
        container.set(
            services::CACHE,
            Definition::instance(Arc::clone(&self.cache)),
            core_options("Key/value cache with TTL"),
        )?;
        container.set(
            services::EVENTS,
            Definition::shared(Arc::clone(&self.events)),
            core_options("In-process event dispatcher"),
        )?;

        container.set(
            services::AUDIT_LOGGER,
            Definition::factory(|r| {
                let config = r.get::<MasConfig>(services::CONFIG)?;
                let db = r.get::<MasDb>(services::DB)?;
                let events = r.get::<EventDispatcher>(services::EVENTS)?;
                Ok(AuditLogger::new(db, config.audit.clone(), events))
            }),
            compliance_options("Masked, checksummed audit trail"),
        )?;
        container.set(
            services::CONSENT_MANAGER,
            Definition::factory(|r| {
                let config = r.get::<MasConfig>(services::CONFIG)?;
                let db = r.get::<MasDb>(services::DB)?;
                let cache = r.get::<Arc<dyn Cache>>(services::CACHE)?.as_ref().clone();
                let events = r.get::<EventDispatcher>(services::EVENTS)?;
                let audit = r.get::<AuditLogger>(services::AUDIT_LOGGER)?;
                Ok(ConsentManager::new(
                    db,
                    audit,
                    cache,
                    events,
                    config.consent.clone(),
                ))
            }),
            compliance_options("GDPR consent records and proofs"),
        )?;

        for (alias, id) in ALIASES {
            container.alias(alias, id)?;
        }
        tracing::debug!(provider = self.name(), "core services registered");
        Ok(())
    }
}

fn core_options(description: &str) -> ServiceOptions {
    ServiceOptions::singleton()
        .tag(tags::CORE)
        .meta("description", description)
}

fn compliance_options(description: &str) -> ServiceOptions {
    ServiceOptions::singleton()
        .tag(tags::COMPLIANCE)
        .meta("description", description)
}
