//! # mas-core
//!
//! Core types shared by every MAS crate.
//!
//! This crate provides:
//! - Closed enumerations (error taxonomy, audit categories, consent vocabulary)
//! - The structured [`errors::MasError`] exception model
//! - Entity structs for audit events and consent records
//! - Runtime helpers (prefixed IDs, request id, memory probe)
//! - An in-process [`events::EventDispatcher`]
//! - The [`cache::Cache`] collaborator trait with an in-memory TTL implementation

pub mod cache;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod events;
pub mod runtime;
