use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::enums::{AuditCategory, Severity};

/// One structured, masked, checksummed record of a significant action.
///
/// Append-only: never mutated after it is written. `checksum` covers every
/// field except itself and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AuditEvent {
    pub event_id: String,
    pub category: AuditCategory,
    pub action: String,
    pub severity: Severity,
    pub user_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub ip_address: String,
    pub session_id: String,
    pub request_id: String,
    /// Masked, size-bounded business context (always a JSON object).
    pub context: Value,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// The record the checksum is computed over.
    #[must_use]
    pub fn checksum_payload(&self) -> Value {
        json!({
            "event_id": self.event_id,
            "category": self.category.as_str(),
            "action": self.action,
            "severity": self.severity.as_str(),
            "user_id": self.user_id,
            "customer_id": self.customer_id,
            "ip_address": self.ip_address,
            "session_id": self.session_id,
            "request_id": self.request_id,
            "context": self.context,
        })
    }

    /// SHA-256 (hex) over the canonical JSON of [`Self::checksum_payload`].
    #[must_use]
    pub fn compute_checksum(&self) -> String {
        sha256_hex(canonical_json(&self.checksum_payload()).as_bytes())
    }

    /// Whether the stored checksum matches the rest of the record.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// `category.action`, the key used for alert matching.
    #[must_use]
    pub fn event_key(&self) -> String {
        format!("{}.{}", self.category, self.action)
    }
}

/// Serialize with object keys sorted at every depth.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for key in keys {
                    out.insert(key.clone(), sorted(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// Lowercase hex SHA-256 digest.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AuditEvent {
        let mut event = AuditEvent {
            event_id: "evt-0011223344556677".into(),
            category: AuditCategory::Consent,
            action: "accept".into(),
            severity: Severity::Low,
            user_id: None,
            customer_id: Some(42),
            ip_address: "10.0.0.1".into(),
            session_id: "sess-1".into(),
            request_id: "req-1".into(),
            context: json!({"b": 1, "a": {"z": true, "y": [2, 1]}}),
            checksum: String::new(),
            created_at: Utc::now(),
        };
        event.checksum = event.compute_checksum();
        event
    }

    #[test]
    fn checksum_validates_and_ignores_created_at() {
        let mut event = sample();
        assert!(event.verify_checksum());
        event.created_at = DateTime::<Utc>::MIN_UTC;
        assert!(event.verify_checksum());
    }

    #[test]
    fn tampering_breaks_checksum() {
        let mut event = sample();
        event.customer_id = Some(43);
        assert!(!event.verify_checksum());

        let mut event = sample();
        event.context["b"] = json!(2);
        assert!(!event.verify_checksum());
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let a = json!({"b": 1, "a": {"d": 1, "c": 2}});
        assert_eq!(canonical_json(&a), r#"{"a":{"c":2,"d":1},"b":1}"#);
    }

    #[test]
    fn event_key_joins_category_and_action() {
        assert_eq!(sample().event_key(), "consent.accept");
    }
}
