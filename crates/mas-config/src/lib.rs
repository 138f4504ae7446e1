//! # mas-config
//!
//! Layered configuration loading for MAS using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`MAS_<SECTION>_<KEY>`)
//! 2. Store-specific overrides supplied by the host (settings of one store)
//! 3. TOML file: explicit path, or `.mas/config.toml` over `~/.config/mas/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! The first underscore after the prefix separates the section from the key:
//! `MAS_AUDIT_RETENTION_DAYS` -> `audit.retention_days`,
//! `MAS_DATABASE_PATH` -> `database.path`. Section names never contain an
//! underscore, keys may.
//!
//! # Usage
//!
//! ```no_run
//! use mas_config::MasConfig;
//!
//! let config = MasConfig::load_with_dotenv().expect("config");
//! println!("retention: {} days", config.audit.retention_days);
//! ```

mod audit;
mod cache;
mod consent;
mod database;
mod error;
mod general;

pub use audit::AuditConfig;
pub use cache::CacheConfig;
pub use consent::ConsentConfig;
pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use general::GeneralConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MAS_";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MasConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub consent: ConsentConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

const SECTIONS: [&str; 5] = ["general", "database", "audit", "consent", "cache"];

/// Store overrides are per-section objects. Anything else would be merged
/// into nothing and silently ignored.
fn check_store_override(store: &serde_json::Value) -> Result<(), ConfigError> {
    let serde_json::Value::Object(sections) = store else {
        return Err(ConfigError::StoreOverride {
            section: None,
            reason: "expected a JSON object keyed by section".into(),
        });
    };
    for (section, value) in sections {
        if !SECTIONS.contains(&section.as_str()) {
            return Err(ConfigError::StoreOverride {
                section: Some(section.clone()),
                reason: format!("unknown section, expected one of {}", SECTIONS.join(", ")),
            });
        }
        if !value.is_object() {
            return Err(ConfigError::StoreOverride {
                section: Some(section.clone()),
                reason: "section overrides must be a JSON object".into(),
            });
        }
    }
    Ok(())
}

impl MasConfig {
    /// Load configuration from the default file locations and the environment.
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` loading.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None, None)
    }

    /// Load with an explicit file and/or store overrides.
    ///
    /// `store` is a nested JSON object shaped like the config itself, e.g.
    /// `{"audit": {"retention_days": 90}}`.
    pub fn load_from(
        file: Option<&Path>,
        store: Option<&serde_json::Value>,
    ) -> Result<Self, ConfigError> {
        if let Some(store) = store {
            check_store_override(store)?;
        }
        let config: Self = Self::figment_with(file, store).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` file support.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Default provider chain without store overrides.
    pub fn figment() -> Figment {
        Self::figment_with(None, None)
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment or add providers on top.
    pub fn figment_with(file: Option<&Path>, store: Option<&serde_json::Value>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match file {
            Some(path) => {
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(global_path) = Self::global_config_path() {
                    if global_path.exists() {
                        figment = figment.merge(Toml::file(global_path));
                    }
                }
                let local_path = PathBuf::from(".mas/config.toml");
                if local_path.exists() {
                    figment = figment.merge(Toml::file(local_path));
                }
            }
        }

        if let Some(store) = store {
            figment = figment.merge(Serialized::defaults(store));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).map(|key| key.as_str().replacen('_', ".", 1).into()))
    }

    /// Reject values that would make the services misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audit.export_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audit.export_batch_size".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.audit.archive_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audit.archive_batch_size".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.audit.compliance_pass_threshold > 100 {
            return Err(ConfigError::InvalidValue {
                field: "audit.compliance_pass_threshold".into(),
                reason: "must be between 0 and 100".into(),
            });
        }
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "database.path".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mas").join("config.toml"))
    }
}
