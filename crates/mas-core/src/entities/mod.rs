//! Entity structs for audit and consent records.

mod audit;
mod consent;
mod request;

pub use audit::{AuditEvent, canonical_json, sha256_hex};
pub use consent::{ConsentDefinition, ConsentExpiry, ConsentLogEntry, ConsentProof, ExpiryStatus};
pub use request::RequestContext;
