//! Container error types.

use mas_core::enums::{ErrorCategory, Severity};
use mas_core::errors::MasError;
use thiserror::Error;

/// Errors from registering or resolving services.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// No service (or alias) is registered under `id`.
    #[error("Service not found: '{id}' (resolution chain: {})", chain.join(" -> "))]
    NotFound { id: String, chain: Vec<String> },

    /// `set` was called for an id that is already registered.
    #[error("Service '{id}' is already registered; use extend() to decorate it")]
    AlreadyRegistered { id: String },

    /// The definition has an unusable shape.
    #[error("Invalid definition for service '{id}': {reason}")]
    InvalidDefinition { id: String, reason: String },

    /// Resolution re-entered a service already being built.
    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency { id: String, chain: Vec<String> },

    /// Following aliases leads back to an alias already visited.
    #[error("Circular alias detected: {}", chain.join(" -> "))]
    CircularAlias { alias: String, chain: Vec<String> },

    /// The alias name is already taken by a service or another alias.
    #[error("Alias '{alias}' conflicts with an existing service or alias")]
    AliasConflict { alias: String },

    /// The resolved service is not of the requested type.
    #[error("Service '{id}' is not a {expected}")]
    TypeMismatch { id: String, expected: &'static str },

    /// A factory, constructor or decorator failed.
    #[error("Failed to construct service '{id}': {source}")]
    Construction {
        id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ContainerError {
    /// Wrap any error raised while building `id`.
    pub fn construction(
        id: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Construction {
            id: id.into(),
            source: source.into(),
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "CONTAINER_NOT_FOUND",
            Self::AlreadyRegistered { .. } => "CONTAINER_DUPLICATE",
            Self::InvalidDefinition { .. } => "CONTAINER_INVALID_DEFINITION",
            Self::CircularDependency { .. } => "CONTAINER_CIRCULAR_DEPENDENCY",
            Self::CircularAlias { .. } => "CONTAINER_CIRCULAR_ALIAS",
            Self::AliasConflict { .. } => "CONTAINER_ALIAS_CONFLICT",
            Self::TypeMismatch { .. } => "CONTAINER_TYPE_MISMATCH",
            Self::Construction { .. } => "CONTAINER_CONSTRUCTION",
        }
    }
}

impl From<ContainerError> for MasError {
    #[track_caller]
    fn from(error: ContainerError) -> Self {
        let mut mas = Self::new(error.to_string())
            .with_category(ErrorCategory::General)
            .with_severity(Severity::High)
            .with_code(error.code())
            .with_component("container");
        match &error {
            ContainerError::NotFound { id, chain } | ContainerError::CircularDependency { id, chain } => {
                mas = mas
                    .with_operation("get")
                    .with_context("service_id", id.as_str())
                    .with_context("chain", chain.clone());
            }
            ContainerError::CircularAlias { alias, chain } => {
                mas = mas
                    .with_operation("alias")
                    .with_context("alias", alias.as_str())
                    .with_context("chain", chain.clone());
            }
            ContainerError::AliasConflict { alias } => {
                mas = mas.with_operation("alias").with_context("alias", alias.as_str());
            }
            ContainerError::AlreadyRegistered { id } | ContainerError::InvalidDefinition { id, .. } => {
                mas = mas
                    .with_operation("set")
                    .with_category(ErrorCategory::Config)
                    .with_context("service_id", id.as_str());
            }
            ContainerError::TypeMismatch { id, expected } => {
                mas = mas
                    .with_operation("get")
                    .with_context("service_id", id.as_str())
                    .with_context("expected", *expected);
            }
            ContainerError::Construction { id, .. } => {
                mas = mas.with_operation("get").with_context("service_id", id.as_str());
            }
        }
        mas
    }
}
