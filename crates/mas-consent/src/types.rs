//! Inputs and reports of the consent manager.

use chrono::{DateTime, Utc};
use mas_core::entities::{ConsentDefinition, ConsentExpiry, ConsentLogEntry, ConsentProof, RequestContext};
use mas_core::enums::{ConsentAction, ConsentCategory, LegalBasis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConsentError;

const fn default_true() -> bool {
    true
}

/// Fields for a new consent definition. Version always starts at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConsentDefinition {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: ConsentCategory,
    pub legal_basis: LegalBasis,
    #[serde(default)]
    pub required: bool,
    /// Months until an acceptance lapses.
    #[serde(default)]
    pub expiry_period: Option<u32>,
    #[serde(default)]
    pub data_categories: Vec<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl NewConsentDefinition {
    /// Minimal definition; everything else takes its default.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: ConsentCategory,
        legal_basis: LegalBasis,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: String::new(),
            category,
            legal_basis,
            required: false,
            expiry_period: None,
            data_categories: Vec::new(),
            recipients: Vec::new(),
            active: true,
        }
    }

    /// Parse an untyped payload (CLI, HTTP body).
    ///
    /// # Errors
    ///
    /// Returns `ConsentError::Validation` naming the missing or invalid field.
    pub fn from_value(value: Value) -> Result<Self, ConsentError> {
        serde_json::from_value(value).map_err(|e| ConsentError::validation(e.to_string()))
    }
}

/// Partial update of a definition. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentDefinitionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<ConsentCategory>,
    pub legal_basis: Option<LegalBasis>,
    pub required: Option<bool>,
    /// `Some(None)` removes the expiry period.
    #[serde(default, with = "double_option")]
    pub expiry_period: Option<Option<u32>>,
    pub data_categories: Option<Vec<String>>,
    pub recipients: Option<Vec<String>>,
    pub active: Option<bool>,
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Option<u32>>, s: S) -> Result<S::Ok, S::Error> {
        value.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<u32>>, D::Error> {
        Option::<u32>::deserialize(d).map(Some)
    }
}

impl ConsentDefinitionUpdate {
    /// Apply to `definition`, returning the names of fields that changed.
    pub(crate) fn apply(&self, definition: &mut ConsentDefinition) -> Vec<&'static str> {
        let mut changed = Vec::new();
        macro_rules! set {
            ($field:ident) => {
                if let Some(value) = &self.$field {
                    if *value != definition.$field {
                        definition.$field = value.clone();
                        changed.push(stringify!($field));
                    }
                }
            };
        }
        set!(name);
        set!(description);
        set!(category);
        set!(legal_basis);
        set!(required);
        set!(expiry_period);
        set!(data_categories);
        set!(recipients);
        set!(active);
        changed
    }
}

/// How and where a consent decision was captured.
///
/// Missing network fields are filled from the current request context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    /// Capture method: `checkbox`, `banner`, `api`, `import`, ...
    pub method: Option<String>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl ConsentMetadata {
    #[must_use]
    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }

    /// Resolve against the request: `(ip_address, user_agent, stored metadata)`.
    pub(crate) fn enrich(&self, request: &RequestContext) -> (String, String, Value) {
        let ip = self
            .ip_address
            .clone()
            .unwrap_or_else(|| request.ip_address.clone());
        let agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| request.user_agent.clone());
        let mut stored = self.extra.clone();
        stored.insert(
            "session_id".into(),
            Value::String(
                self.session_id
                    .clone()
                    .unwrap_or_else(|| request.session_id.clone()),
            ),
        );
        stored.insert(
            "method".into(),
            Value::String(self.method.clone().unwrap_or_else(|| "unspecified".into())),
        );
        stored.insert("request_id".into(), Value::String(request.request_id.clone()));
        (ip, agent, Value::Object(stored))
    }
}

/// Result of a successful `record_consent`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsentReceipt {
    pub entry: ConsentLogEntry,
    pub proof: Option<ConsentProof>,
    pub expiry: Option<ConsentExpiry>,
}

/// Current state of one definition for one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsentStatus {
    pub code: String,
    pub name: String,
    pub category: ConsentCategory,
    pub required: bool,
    pub granted: bool,
    pub last_action: Option<ConsentAction>,
    pub last_changed_at: Option<DateTime<Utc>>,
    /// Definition version the customer last acted on.
    pub consented_version: Option<u32>,
    pub current_version: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConsentStatus {
    /// Granted against an older definition version.
    #[must_use]
    pub fn needs_renewal(&self) -> bool {
        self.granted && self.consented_version.is_some_and(|v| v < self.current_version)
    }
}

/// Per-customer overview across every active definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsentSummary {
    pub customer_id: i64,
    pub consents: Vec<ConsentStatus>,
    pub granted: usize,
    /// Required definitions without a current grant.
    pub missing_required: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Data-portability bundle for one customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerConsentExport {
    pub customer_id: i64,
    pub exported_at: DateTime<Utc>,
    pub summary: ConsentSummary,
    pub history: Vec<ConsentLogEntry>,
    pub proofs: Vec<ConsentProof>,
    pub expiries: Vec<ConsentExpiry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub customer_id: i64,
    pub error: String,
}

/// Per-customer breakdown of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub succeeded: Vec<i64>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
