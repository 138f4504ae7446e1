use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{ConsentAction, ConsentCategory, LegalBasis};

/// Template for one type of customer permission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ConsentDefinition {
    pub code: String,
    pub name: String,
    pub description: String,
    pub version: u32,
    pub category: ConsentCategory,
    pub legal_basis: LegalBasis,
    pub required: bool,
    /// Months after acceptance until the consent lapses. `None` never expires.
    pub expiry_period: Option<u32>,
    pub data_categories: Vec<String>,
    pub recipients: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only row of a customer's consent history.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ConsentLogEntry {
    pub id: i64,
    pub customer_id: i64,
    pub code: String,
    pub version: u32,
    pub action: ConsentAction,
    pub metadata: serde_json::Value,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a scheduled expiry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    Scheduled,
    Cancelled,
    Processed,
}

impl ExpiryStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Cancelled => "cancelled",
            Self::Processed => "processed",
        }
    }
}

/// Scheduled lapse of an accepted consent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ConsentExpiry {
    pub id: i64,
    pub customer_id: i64,
    pub code: String,
    pub consent_log_id: i64,
    pub expires_at: DateTime<Utc>,
    pub status: ExpiryStatus,
}

/// Tamper-evident proof that a consent event happened as recorded.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ConsentProof {
    pub consent_log_id: i64,
    pub customer_id: i64,
    pub code: String,
    pub proof_hash: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
