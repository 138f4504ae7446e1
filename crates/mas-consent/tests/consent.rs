use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Months, TimeDelta, Utc};
use mas_audit::{AuditFilter, AuditLogger};
use mas_config::{AuditConfig, ConsentConfig};
use mas_core::cache::MemoryCache;
use mas_core::entities::ExpiryStatus;
use mas_core::enums::{AuditCategory, ConsentAction, ConsentCategory, LegalBasis};
use mas_core::events::EventDispatcher;
use mas_consent::{
    ConsentDefinitionUpdate, ConsentError, ConsentManager, ConsentMetadata, EVENT_ACCEPTED,
    EVENT_REVOKED, NewConsentDefinition,
};
use mas_db::MasDb;
use mas_db::helpers::format_datetime;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct Harness {
    consent: ConsentManager,
    audit: Arc<AuditLogger>,
    db: Arc<MasDb>,
    events: Arc<EventDispatcher>,
    _dir: TempDir,
}

async fn harness_with(config: ConsentConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(MasDb::open_local(":memory:").await.unwrap());
    let events = Arc::new(EventDispatcher::new());
    let audit = Arc::new(AuditLogger::new(
        Arc::clone(&db),
        AuditConfig {
            emergency_log_path: dir.path().join("emergency.jsonl").display().to_string(),
            ..AuditConfig::default()
        },
        Arc::clone(&events),
    ));
    let consent = ConsentManager::new(
        Arc::clone(&db),
        Arc::clone(&audit),
        Arc::new(MemoryCache::new()),
        Arc::clone(&events),
        config,
    );
    Harness {
        consent,
        audit,
        db,
        events,
        _dir: dir,
    }
}

async fn harness() -> Harness {
    harness_with(ConsentConfig::default()).await
}

fn marketing_email() -> NewConsentDefinition {
    NewConsentDefinition {
        description: "Promotional e-mails".into(),
        ..NewConsentDefinition::new(
            "marketing_email",
            "Marketing",
            ConsentCategory::Marketing,
            LegalBasis::Consent,
        )
    }
}

fn checkbox() -> ConsentMetadata {
    ConsentMetadata::method("checkbox")
}

#[tokio::test]
async fn duplicate_code_is_rejected() {
    let h = harness().await;
    let created = h.consent.create_definition(marketing_email()).await.unwrap();
    assert_eq!(created.version, 1);
    assert!(created.active);

    let err = h.consent.create_definition(marketing_email()).await.unwrap_err();
    assert!(matches!(err, ConsentError::DuplicateCode(ref code) if code == "marketing_email"));
}

#[tokio::test]
async fn invalid_definitions_are_rejected() {
    let h = harness().await;
    let mut bad = marketing_email();
    bad.code = "Marketing Email".into();
    assert!(matches!(
        h.consent.create_definition(bad).await,
        Err(ConsentError::Validation(_))
    ));

    let mut bad = marketing_email();
    bad.name = "  ".into();
    assert!(matches!(
        h.consent.create_definition(bad).await,
        Err(ConsentError::Validation(_))
    ));
}

#[tokio::test]
async fn record_then_revoke() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();

    let receipt = h
        .consent
        .record_consent(42, "marketing_email", &checkbox())
        .await
        .unwrap();
    assert_eq!(receipt.entry.action, ConsentAction::Accept);
    assert!(receipt.proof.is_some());
    assert!(receipt.expiry.is_none());
    assert!(h.consent.has_consent(42, "marketing_email").await.unwrap());

    h.consent
        .revoke_consent(42, "marketing_email", &checkbox())
        .await
        .unwrap();
    assert!(!h.consent.has_consent(42, "marketing_email").await.unwrap());

    let history = h.consent.consent_history(42, None).await.unwrap();
    let actions: Vec<_> = history.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![ConsentAction::Accept, ConsentAction::Revoke]);
    assert_eq!(history[0].metadata["method"], "checkbox");
}

#[tokio::test]
async fn revoke_without_consent_fails() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    let err = h
        .consent
        .revoke_consent(7, "marketing_email", &checkbox())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::NoActiveConsent { customer_id: 7, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_revokes_close_consent_once() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();

    let (meta_a, meta_b) = (checkbox(), checkbox());
    let (first, second) = tokio::join!(
        h.consent.revoke_consent(42, "marketing_email", &meta_a),
        h.consent.revoke_consent(42, "marketing_email", &meta_b),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(ConsentError::NoActiveConsent { customer_id: 42, .. })
    )));
    let actions: Vec<_> = h
        .consent
        .consent_history(42, None)
        .await
        .unwrap()
        .iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, vec![ConsentAction::Accept, ConsentAction::Revoke]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_withdrawals_write_one_row_per_consent() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();

    let (meta_a, meta_b) = (checkbox(), checkbox());
    let (first, second) = tokio::join!(
        h.consent.withdraw_all(42, &meta_a),
        h.consent.withdraw_all(42, &meta_b),
    );

    let total = first.unwrap().len() + second.unwrap().len();
    assert_eq!(total, 1);
    let history = h.consent.consent_history(42, None).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn missing_or_inactive_definitions_refuse_consent() {
    let h = harness().await;
    let err = h
        .consent
        .record_consent(1, "nope", &checkbox())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::DefinitionNotFound(_)));

    h.consent
        .create_definition(NewConsentDefinition {
            active: false,
            ..marketing_email()
        })
        .await
        .unwrap();
    let err = h
        .consent
        .record_consent(1, "marketing_email", &checkbox())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::InactiveDefinition(_)));
}

#[tokio::test]
async fn expiry_lapses_consent() {
    let h = harness().await;
    h.consent
        .create_definition(NewConsentDefinition {
            expiry_period: Some(12),
            ..marketing_email()
        })
        .await
        .unwrap();
    let receipt = h
        .consent
        .record_consent(42, "marketing_email", &checkbox())
        .await
        .unwrap();
    let expiry = receipt.expiry.unwrap();
    assert_eq!(expiry.status, ExpiryStatus::Scheduled);
    assert_eq!(
        expiry.expires_at,
        receipt.entry.created_at.checked_add_months(Months::new(12)).unwrap()
    );

    let later = Utc::now().checked_add_months(Months::new(13)).unwrap();
    assert!(h.consent.has_consent(42, "marketing_email").await.unwrap());
    assert!(!h.consent.has_consent_at(42, "marketing_email", later).await.unwrap());

    assert!(h.consent.process_expired(Utc::now()).await.unwrap().is_empty());
    let processed = h.consent.process_expired(later).await.unwrap();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].status, ExpiryStatus::Processed);

    assert!(!h.consent.has_consent(42, "marketing_email").await.unwrap());
    let history = h.consent.consent_history(42, Some("marketing_email")).await.unwrap();
    assert_eq!(history.last().map(|e| e.action), Some(ConsentAction::Expire));
    assert!(h.consent.process_expired(later).await.unwrap().is_empty());
}

#[tokio::test]
async fn expire_rows_are_dated_when_the_consent_lapsed() {
    let h = harness().await;
    h.consent
        .create_definition(NewConsentDefinition {
            expiry_period: Some(12),
            ..marketing_email()
        })
        .await
        .unwrap();
    let receipt = h
        .consent
        .record_consent(42, "marketing_email", &checkbox())
        .await
        .unwrap();
    let lapsed_at = receipt.entry.created_at + TimeDelta::milliseconds(1);
    h.db.conn()
        .execute(
            "UPDATE consent_expiry SET expires_at = ?1 WHERE consent_log_id = ?2",
            libsql::params![format_datetime(&lapsed_at), receipt.entry.id],
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let far_future = Utc::now().checked_add_months(Months::new(24)).unwrap();
    assert_eq!(h.consent.process_expired(far_future).await.unwrap().len(), 1);

    let history = h.consent.consent_history(42, Some("marketing_email")).await.unwrap();
    let expired = history.last().unwrap();
    assert_eq!(expired.action, ConsentAction::Expire);
    assert_eq!(expired.created_at, lapsed_at);
    assert!(!h.consent.has_consent(42, "marketing_email").await.unwrap());
}

#[tokio::test]
async fn processing_a_future_now_never_postdates_the_row() {
    let h = harness().await;
    h.consent
        .create_definition(NewConsentDefinition {
            expiry_period: Some(1),
            ..marketing_email()
        })
        .await
        .unwrap();
    h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();

    let later = Utc::now().checked_add_months(Months::new(2)).unwrap();
    h.consent.process_expired(later).await.unwrap();

    let history = h.consent.consent_history(42, Some("marketing_email")).await.unwrap();
    assert_eq!(history.last().map(|e| e.action), Some(ConsentAction::Expire));
    assert!(history.iter().all(|e| e.created_at <= Utc::now()));
}

#[tokio::test]
async fn reaccept_replaces_scheduled_expiry() {
    let h = harness().await;
    h.consent
        .create_definition(NewConsentDefinition {
            expiry_period: Some(6),
            ..marketing_email()
        })
        .await
        .unwrap();
    h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();
    let second = h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();

    let scheduled = h.consent.scheduled_expiries(Some(42)).await.unwrap();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].consent_log_id, second.entry.id);

    h.consent.revoke_consent(42, "marketing_email", &checkbox()).await.unwrap();
    assert!(h.consent.scheduled_expiries(Some(42)).await.unwrap().is_empty());
    let all = h.consent.customer_expiries(42).await.unwrap();
    assert!(all.iter().all(|e| e.status == ExpiryStatus::Cancelled));
}

#[tokio::test]
async fn proofs_detect_tampering() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    let receipt = h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();
    let log_id = receipt.entry.id;
    assert!(h.consent.verify_proof(log_id).await.unwrap());

    h.db.conn()
        .execute("UPDATE consent_log SET ip_address = '6.6.6.6' WHERE id = ?1", [log_id])
        .await
        .unwrap();
    assert!(!h.consent.verify_proof(log_id).await.unwrap());

    assert!(matches!(
        h.consent.verify_proof(9999).await,
        Err(ConsentError::LogEntryNotFound(9999))
    ));
}

#[tokio::test]
async fn proof_of_record_can_be_disabled() {
    let h = harness_with(ConsentConfig {
        proof_of_record: false,
        ..ConsentConfig::default()
    })
    .await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    let receipt = h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();
    assert!(receipt.proof.is_none());
    assert!(!h.consent.verify_proof(receipt.entry.id).await.unwrap());
}

#[tokio::test]
async fn bulk_isolates_failures() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    let outcome = h
        .consent
        .bulk_record_consent(&[1, -5, 3], "marketing_email", &checkbox())
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, vec![1, 3]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].customer_id, -5);
    assert_eq!(outcome.total(), 3);
    assert!(!outcome.is_complete());
    assert!(h.consent.has_consent(3, "marketing_email").await.unwrap());

    let err = h
        .consent
        .bulk_record_consent(&[1], "unknown", &checkbox())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::DefinitionNotFound(_)));
}

#[tokio::test]
async fn significant_changes_bump_version() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();

    let renamed = h
        .consent
        .update_definition(
            "marketing_email",
            &ConsentDefinitionUpdate {
                name: Some("Marketing e-mail".into()),
                ..ConsentDefinitionUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.version, 1);

    let widened = h
        .consent
        .update_definition(
            "marketing_email",
            &ConsentDefinitionUpdate {
                recipients: Some(vec!["partner-mailer".into()]),
                ..ConsentDefinitionUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(widened.version, 2);

    let cached = h.consent.get_definition("marketing_email").await.unwrap();
    assert_eq!(cached.version, 2);
    assert_eq!(cached.name, "Marketing e-mail");

    let summary = h.consent.get_customer_consent_summary(42).await.unwrap();
    let status = &summary.consents[0];
    assert!(status.granted);
    assert_eq!(status.consented_version, Some(1));
    assert!(status.needs_renewal());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_updates_keep_every_change() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    let recipients = ConsentDefinitionUpdate {
        recipients: Some(vec!["partner-mailer".into()]),
        ..ConsentDefinitionUpdate::default()
    };
    let data_categories = ConsentDefinitionUpdate {
        data_categories: Some(vec!["email".into(), "purchase_history".into()]),
        ..ConsentDefinitionUpdate::default()
    };

    let (first, second) = tokio::join!(
        h.consent.update_definition("marketing_email", &recipients),
        h.consent.update_definition("marketing_email", &data_categories),
    );
    let mut versions = vec![first.unwrap().version, second.unwrap().version];
    versions.sort_unstable();
    assert_eq!(versions, vec![2, 3]);

    let stored = h.consent.get_definition("marketing_email").await.unwrap();
    assert_eq!(stored.version, 3);
    assert_eq!(stored.recipients, vec!["partner-mailer".to_string()]);
    assert_eq!(
        stored.data_categories,
        vec!["email".to_string(), "purchase_history".to_string()]
    );
}

#[tokio::test]
async fn summary_lists_missing_required_consents() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    h.consent
        .create_definition(NewConsentDefinition {
            required: true,
            ..NewConsentDefinition::new(
                "terms",
                "Terms of service",
                ConsentCategory::Necessary,
                LegalBasis::Contract,
            )
        })
        .await
        .unwrap();
    h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();

    let summary = h.consent.get_customer_consent_summary(42).await.unwrap();
    assert_eq!(summary.consents.len(), 2);
    assert_eq!(summary.granted, 1);
    assert_eq!(summary.missing_required, vec!["terms".to_string()]);
}

#[tokio::test]
async fn withdraw_all_closes_every_active_consent() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    h.consent
        .create_definition(NewConsentDefinition::new(
            "analytics",
            "Analytics",
            ConsentCategory::Analytics,
            LegalBasis::Consent,
        ))
        .await
        .unwrap();
    h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();
    h.consent.record_consent(42, "analytics", &checkbox()).await.unwrap();

    let withdrawn = h.consent.withdraw_all(42, &checkbox()).await.unwrap();
    assert_eq!(withdrawn, vec!["analytics".to_string(), "marketing_email".to_string()]);
    assert!(!h.consent.has_consent(42, "analytics").await.unwrap());
    assert!(h.consent.withdraw_all(42, &checkbox()).await.unwrap().is_empty());
}

#[tokio::test]
async fn changes_are_dispatched_and_audited() {
    let h = harness().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    for name in [EVENT_ACCEPTED, EVENT_REVOKED] {
        let seen = Arc::clone(&seen);
        h.events.listen(name, move |event| {
            seen.lock().unwrap().push(event.name.clone());
        });
    }

    h.consent.create_definition(marketing_email()).await.unwrap();
    h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();
    h.consent.revoke_consent(42, "marketing_email", &checkbox()).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![EVENT_ACCEPTED.to_string(), EVENT_REVOKED.to_string()]
    );

    let filter = AuditFilter {
        customer_id: Some(42),
        ..AuditFilter::default().category(AuditCategory::Consent)
    };
    let page = h.audit.search_logs(&filter, 1, 10).await.unwrap();
    let mut actions: Vec<_> = page.records.iter().map(|r| r.event.action.clone()).collect();
    actions.sort();
    assert_eq!(actions, vec!["accept".to_string(), "revoke".to_string()]);
}

#[tokio::test]
async fn customer_export_bundles_history_and_proofs() {
    let h = harness().await;
    h.consent.create_definition(marketing_email()).await.unwrap();
    h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();
    h.consent.revoke_consent(42, "marketing_email", &checkbox()).await.unwrap();
    h.consent.record_consent(42, "marketing_email", &checkbox()).await.unwrap();

    let export = h.consent.export_customer_data(42).await.unwrap();
    assert_eq!(export.history.len(), 3);
    assert_eq!(export.proofs.len(), 2);
    assert_eq!(export.summary.granted, 1);

    let gdpr = AuditFilter::default().category(AuditCategory::Gdpr);
    let page = h.audit.search_logs(&gdpr, 1, 10).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].event.action, "data_export");
    assert_eq!(page.records[0].event.context["status"], "completed");
}
