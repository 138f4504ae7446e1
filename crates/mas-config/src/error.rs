//! Errors raised while assembling [`crate::MasConfig`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file, store or environment layer could not be read or extracted.
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    /// Store overrides handed in by the host are not shaped like the config.
    #[error("Invalid store override{}: {reason}", .section.as_deref().map(|s| format!(" '{s}'")).unwrap_or_default())]
    StoreOverride {
        section: Option<String>,
        reason: String,
    },

    /// A loaded value that would make the audit or consent services misbehave.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
