//! Serde roundtrip and JsonSchema validation tests for entity types.

use chrono::Utc;
use mas_core::entities::*;
use mas_core::enums::*;
use schemars::schema_for;
use serde_json::json;

/// Validate a JSON value against a schemars-generated schema.
fn validate_against_schema(
    schema: &serde_json::Value,
    instance: &serde_json::Value,
) -> Vec<String> {
    let validator = jsonschema::validator_for(schema).expect("schema should be valid");
    validator
        .iter_errors(instance)
        .map(|e| format!("{e}"))
        .collect()
}

macro_rules! roundtrip_and_validate {
    ($name:ident, $ty:ty, $instance:expr) => {
        #[test]
        fn $name() {
            let val: $ty = $instance;

            let json_str = serde_json::to_string_pretty(&val).unwrap();
            let recovered: $ty = serde_json::from_str(&json_str).unwrap();
            assert_eq!(
                recovered,
                val,
                "serde roundtrip failed for {}",
                stringify!($ty)
            );

            let schema = serde_json::to_value(schema_for!($ty)).unwrap();
            let instance = serde_json::to_value(&val).unwrap();
            let errors = validate_against_schema(&schema, &instance);
            assert!(
                errors.is_empty(),
                "Schema validation failed for {}: {:?}",
                stringify!($ty),
                errors
            );
        }
    };
}

roundtrip_and_validate!(
    audit_event_roundtrip,
    AuditEvent,
    AuditEvent {
        event_id: "evt-a3f8b2c1d4e5f601".into(),
        category: AuditCategory::DataModification,
        action: "customer_updated".into(),
        severity: Severity::Medium,
        user_id: Some(1),
        customer_id: Some(42),
        ip_address: "192.168.1.20".into(),
        session_id: "sess-abc".into(),
        request_id: "req-0102030405060708".into(),
        context: json!({"field": "email", "password": "se*****23"}),
        checksum: "00".repeat(32),
        created_at: Utc::now(),
    }
);

roundtrip_and_validate!(
    consent_definition_roundtrip,
    ConsentDefinition,
    ConsentDefinition {
        code: "marketing_email".into(),
        name: "Marketing".into(),
        description: "Newsletters and offers".into(),
        version: 2,
        category: ConsentCategory::Marketing,
        legal_basis: LegalBasis::Consent,
        required: false,
        expiry_period: Some(12),
        data_categories: vec!["email".into()],
        recipients: vec!["mailer".into()],
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
);

roundtrip_and_validate!(
    consent_log_roundtrip,
    ConsentLogEntry,
    ConsentLogEntry {
        id: 7,
        customer_id: 42,
        code: "marketing_email".into(),
        version: 1,
        action: ConsentAction::Revoke,
        metadata: json!({"method": "preference_center"}),
        ip_address: "10.0.0.2".into(),
        user_agent: "Mozilla/5.0".into(),
        created_at: Utc::now(),
    }
);

roundtrip_and_validate!(
    consent_expiry_roundtrip,
    ConsentExpiry,
    ConsentExpiry {
        id: 1,
        customer_id: 42,
        code: "analytics".into(),
        consent_log_id: 3,
        expires_at: Utc::now(),
        status: ExpiryStatus::Scheduled,
    }
);

roundtrip_and_validate!(
    request_context_roundtrip,
    RequestContext,
    RequestContext::system()
);

#[test]
fn audit_event_serializes_snake_case_enums() {
    let value = serde_json::to_value(AuditCategory::DataAccess).unwrap();
    assert_eq!(value, json!("data_access"));
    let value = serde_json::to_value(ExpiryStatus::Cancelled).unwrap();
    assert_eq!(value, json!("cancelled"));
}
