//! # mas-audit
//!
//! Tamper-evident audit logging.
//!
//! Every event is validated, enriched with the current [`RequestContext`],
//! masked, size-bounded and sealed with a SHA-256 checksum before it reaches
//! `audit_log`. When the database refuses a write the event is appended to an
//! emergency JSONL file instead, so logging never fails the caller's
//! operation.
//!
//! On top of the log sit filtered search, integrity verification, streaming
//! export (CSV, JSON, XML, optionally gzipped), batched archival and
//! per-regulation compliance reports.
//!
//! [`RequestContext`]: mas_core::entities::RequestContext

pub mod alerts;
pub mod archive;
pub mod compliance;
pub mod emergency;
pub mod error;
pub mod export;
pub mod logger;
pub mod masking;
pub(crate) mod record;
pub mod search;
pub mod stats;

pub use alerts::AuditAlert;
pub use archive::{ArchiveOptions, ArchiveReport};
pub use compliance::{
    ComplianceCheck, ComplianceReport, ComplianceStatistics, DateRange, Regulation, ReportOptions,
    Verdict,
};
pub use emergency::{EmergencyLog, EmergencyRecord};
pub use error::AuditError;
pub use export::{ExportFormat, ExportOptions, ExportSummary, file_sha256};
pub use logger::{AuditLogger, LogOutcome};
pub use record::AuditRecord;
pub use search::{AuditFilter, AuditPage, IntegrityReport};
pub use stats::AuditStats;
