//! The `Mas` lifecycle object.

use std::collections::BTreeSet;
use std::sync::Arc;

use mas_audit::AuditLogger;
use mas_config::MasConfig;
use mas_consent::ConsentManager;
use mas_container::ServiceContainer;
use mas_core::cache::{Cache, MemoryCache};
use mas_core::events::EventDispatcher;
use mas_db::MasDb;

use crate::error::AppError;
use crate::provider::{MasServiceProvider, ServiceProvider, services};

/// A booted MAS core.
///
/// Owns the container and keeps typed handles to the services every caller
/// needs. Providers run once per `Mas`; there is no process-wide boot flag,
/// so two instances (tests, multi-store hosts) never interfere.
pub struct Mas {
    container: ServiceContainer,
    providers: BTreeSet<String>,
    config: Arc<MasConfig>,
    db: Arc<MasDb>,
    cache: Arc<dyn Cache>,
    events: Arc<EventDispatcher>,
    audit: Arc<AuditLogger>,
    consent: Arc<ConsentManager>,
}

/// Optional collaborators for [`Mas::boot`].
pub struct MasBuilder {
    config: MasConfig,
    cache: Option<Arc<dyn Cache>>,
    events: Option<Arc<EventDispatcher>>,
    providers: Vec<Box<dyn ServiceProvider>>,
}

impl MasBuilder {
    /// Use a host-provided cache instead of an in-process [`MemoryCache`].
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share an existing dispatcher, e.g. one with listeners attached.
    #[must_use]
    pub fn events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run an additional provider after the core one.
    #[must_use]
    pub fn provider(mut self, provider: impl ServiceProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Validate configuration, open the database and register every provider.
    ///
    /// # Errors
    ///
    /// - `AppError::Config` if the configuration is invalid.
    /// - `AppError::Database` if the database cannot be opened or migrated.
    /// - `AppError::Container` if a registration or the initial resolution fails.
    /// - `AppError::ProviderAlreadyRegistered` for two providers with one name.
    pub async fn boot(self) -> Result<Mas, AppError> {
        self.config.validate()?;
        let config = Arc::new(self.config);
        let db = Arc::new(MasDb::open_local(&config.database.path).await?);
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new()) as Arc<dyn Cache>);
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(EventDispatcher::new()));

        let container = ServiceContainer::new();
        let core = MasServiceProvider::new(
            Arc::clone(&config),
            Arc::clone(&db),
            Arc::clone(&cache),
            Arc::clone(&events),
        );
        let mut providers = BTreeSet::new();
        register_once(&container, &mut providers, &core)?;
        for provider in &self.providers {
            register_once(&container, &mut providers, provider.as_ref())?;
        }

        let audit = container.get::<AuditLogger>(services::AUDIT_LOGGER)?;
        let consent = container.get::<ConsentManager>(services::CONSENT_MANAGER)?;

        tracing::info!(
            db = db.path(),
            services = container.service_ids().len(),
            providers = providers.len(),
            "mas booted"
        );
        Ok(Mas {
            container,
            providers,
            config,
            db,
            cache,
            events,
            audit,
            consent,
        })
    }
}

fn register_once(
    container: &ServiceContainer,
    registered: &mut BTreeSet<String>,
    provider: &dyn ServiceProvider,
) -> Result<(), AppError> {
    let name = provider.name().to_string();
    if registered.contains(&name) {
        return Err(AppError::ProviderAlreadyRegistered(name));
    }
    provider.register(container)?;
    tracing::debug!(provider = %name, "service provider registered");
    registered.insert(name);
    Ok(())
}

impl Mas {
    #[must_use]
    pub fn builder(config: MasConfig) -> MasBuilder {
        MasBuilder {
            config,
            cache: None,
            events: None,
            providers: Vec::new(),
        }
    }

    /// Boot with the default cache and dispatcher.
    ///
    /// # Errors
    ///
    /// See [`MasBuilder::boot`].
    pub async fn boot(config: MasConfig) -> Result<Self, AppError> {
        Self::builder(config).boot().await
    }

    /// Run a provider against the live container.
    ///
    /// # Errors
    ///
    /// `AppError::ProviderAlreadyRegistered` if a provider with the same name
    /// already ran, or `AppError::Container` if a registration is rejected.
    pub fn register(&mut self, provider: &dyn ServiceProvider) -> Result<(), AppError> {
        register_once(&self.container, &mut self.providers, provider)
    }

    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        self.providers.iter().map(String::as_str).collect()
    }

    #[must_use]
    pub const fn container(&self) -> &ServiceContainer {
        &self.container
    }

    #[must_use]
    pub fn config(&self) -> &MasConfig {
        &self.config
    }

    #[must_use]
    pub const fn db(&self) -> &Arc<MasDb> {
        &self.db
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    #[must_use]
    pub const fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    #[must_use]
    pub const fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    #[must_use]
    pub const fn consent(&self) -> &Arc<ConsentManager> {
        &self.consent
    }
}

impl std::fmt::Debug for Mas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mas")
            .field("db", &self.db)
            .field("providers", &self.providers)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}
