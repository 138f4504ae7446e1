//! # mas-app
//!
//! Wires the MAS core into one [`mas_container::ServiceContainer`].
//!
//! [`Mas::boot`] opens the database, runs every [`ServiceProvider`] exactly
//! once and hands back typed access to the audit logger, consent manager,
//! event dispatcher, cache and configuration.

pub mod error;
pub mod mas;
pub mod provider;

pub use error::AppError;
pub use mas::{Mas, MasBuilder};
pub use provider::{MasServiceProvider, ServiceProvider, services, tags};
