//! # mas-container
//!
//! String-keyed dependency-injection container.
//!
//! Services are registered as factories, ready instances, or class references
//! resolved through registered constructors. Singletons are built once and
//! cached; transients are rebuilt on every `get`. Aliases, tags and decorators
//! (`extend`) layer on top, and every build is timed into [`ResolutionStats`].
//!
//! Resolution is cycle-checked: a factory asking (directly or transitively)
//! for the service it is building fails with
//! [`ContainerError::CircularDependency`] carrying the full chain.

pub mod container;
pub mod definition;
pub mod error;
pub mod stats;

pub use container::{Resolver, ServiceContainer};
pub use definition::{Definition, Service, ServiceOptions};
pub use error::ContainerError;
pub use stats::{ContainerSummary, ResolutionStats};
