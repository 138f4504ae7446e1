//! Audit logger configuration.

use serde::{Deserialize, Serialize};

const fn default_true() -> bool {
    true
}

fn default_sensitive_fields() -> Vec<String> {
    [
        "password",
        "passwd",
        "token",
        "secret",
        "api_key",
        "card_number",
        "credit_card",
        "cvv",
        "ssn",
        "iban",
        "private_key",
        "authorization",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_redact_fields() -> Vec<String> {
    ["password", "passwd", "secret", "cvv", "private_key"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_alert_events() -> Vec<String> {
    [
        "security.breach_attempt",
        "security.permission_escalation",
        "authentication.brute_force",
        "gdpr.data_erasure",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

const fn default_retention_days() -> u32 {
    365
}

fn default_emergency_log_path() -> String {
    ".mas/audit-emergency.jsonl".to_string()
}

const fn default_export_batch_size() -> u32 {
    1000
}

const fn default_archive_batch_size() -> u32 {
    500
}

const fn default_max_context_bytes() -> usize {
    65_535
}

const fn default_compliance_pass_threshold() -> u8 {
    80
}

const fn default_failed_login_threshold() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Master switch; when off, `log_event` records nothing.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Mask sensitive context values before they are stored.
    #[serde(default = "default_true")]
    pub masking_enabled: bool,

    /// Case-insensitive key substrings whose values are masked.
    #[serde(default = "default_sensitive_fields")]
    pub sensitive_fields: Vec<String>,

    /// Key substrings whose values are always fully redacted.
    #[serde(default = "default_redact_fields")]
    pub redact_fields: Vec<String>,

    /// Live-store retention before archival.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// `category.action` keys that raise an alert record.
    #[serde(default = "default_alert_events")]
    pub alert_events: Vec<String>,

    /// Emit a warn-level log record for every alert.
    #[serde(default = "default_true")]
    pub real_time_alerts: bool,

    /// JSONL file receiving events that could not be persisted.
    #[serde(default = "default_emergency_log_path")]
    pub emergency_log_path: String,

    /// Rows fetched per page while exporting.
    #[serde(default = "default_export_batch_size")]
    pub export_batch_size: u32,

    /// Rows moved per transaction while archiving.
    #[serde(default = "default_archive_batch_size")]
    pub archive_batch_size: u32,

    /// Serialized context larger than this is truncated.
    #[serde(default = "default_max_context_bytes")]
    pub max_context_bytes: usize,

    /// Minimum compliance score (0-100) for a `compliant` verdict.
    #[serde(default = "default_compliance_pass_threshold")]
    pub compliance_pass_threshold: u8,

    /// PCI-DSS check: failed logins tolerated in a report window.
    #[serde(default = "default_failed_login_threshold")]
    pub failed_login_threshold: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            masking_enabled: true,
            sensitive_fields: default_sensitive_fields(),
            redact_fields: default_redact_fields(),
            retention_days: default_retention_days(),
            alert_events: default_alert_events(),
            real_time_alerts: true,
            emergency_log_path: default_emergency_log_path(),
            export_batch_size: default_export_batch_size(),
            archive_batch_size: default_archive_batch_size(),
            max_context_bytes: default_max_context_bytes(),
            compliance_pass_threshold: default_compliance_pass_threshold(),
            failed_login_threshold: default_failed_login_threshold(),
        }
    }
}
