//! Bootstrap error types.

use mas_config::ConfigError;
use mas_container::ContainerError;
use mas_core::enums::{ErrorCategory, Severity};
use mas_core::errors::MasError;
use mas_db::error::DatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    /// A provider with this name already ran against the container.
    #[error("Service provider '{0}' is already registered")]
    ProviderAlreadyRegistered(String),
}

impl From<AppError> for MasError {
    #[track_caller]
    fn from(error: AppError) -> Self {
        match error {
            AppError::Config(config) => {
                let mut mas = Self::new(config.to_string())
                    .with_category(ErrorCategory::Config)
                    .with_severity(Severity::Critical)
                    .with_code("CONFIG_INVALID")
                    .with_component("config")
                    .with_operation("load");
                match &config {
                    ConfigError::InvalidValue { field, .. } => {
                        mas = mas.with_context("field", field.as_str());
                    }
                    ConfigError::StoreOverride {
                        section: Some(section),
                        ..
                    } => {
                        mas = mas.with_context("section", section.as_str());
                    }
                    _ => {}
                }
                mas
            }
            AppError::Database(db) => Self::from(db).with_operation("boot"),
            AppError::Container(container) => Self::from(container),
            AppError::ProviderAlreadyRegistered(name) => {
                Self::new(format!("Service provider '{name}' is already registered"))
                    .with_category(ErrorCategory::Config)
                    .with_severity(Severity::Medium)
                    .with_code("PROVIDER_DUPLICATE")
                    .with_component("app")
                    .with_operation("register")
                    .with_context("provider", name)
            }
        }
    }
}
