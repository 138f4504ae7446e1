//! # mas-consent
//!
//! GDPR consent management on top of the audit logger.
//!
//! Definitions describe one kind of permission (code, legal basis, expiry).
//! Every decision a customer makes is appended to `consent_log`; the latest
//! row decides the current state. Accepted consents can carry a proof of
//! record and an expiry schedule. Every change is audited and dispatched as
//! a `consent.*` event.

mod definitions;
pub mod error;
mod expiry;
mod log;
pub mod manager;
mod proof;
mod rows;
mod summary;
pub mod types;

pub use error::ConsentError;
pub use manager::{ConsentManager, EVENT_ACCEPTED, EVENT_DEFINITION_CHANGED, EVENT_EXPIRED, EVENT_REVOKED};
pub use types::{
    BulkFailure, BulkOutcome, ConsentDefinitionUpdate, ConsentMetadata, ConsentReceipt, ConsentStatus,
    ConsentSummary, CustomerConsentExport, NewConsentDefinition,
};
