use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use flate2::read::GzDecoder;
use mas_audit::{
    ArchiveOptions, AuditError, AuditFilter, AuditLogger, DateRange, ExportFormat, ExportOptions,
    LogOutcome, Regulation, ReportOptions, Verdict, file_sha256,
};
use mas_audit::logger::{EVENT_ALERT, EVENT_LOGGED};
use mas_config::AuditConfig;
use mas_core::entities::RequestContext;
use mas_core::enums::{AuditCategory, ConsentAction, Severity};
use mas_core::events::EventDispatcher;
use mas_db::MasDb;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;

struct Harness {
    logger: AuditLogger,
    db: Arc<MasDb>,
    events: Arc<EventDispatcher>,
    dir: TempDir,
}

async fn harness_with(configure: impl FnOnce(&mut AuditConfig)) -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(MasDb::open_local(":memory:").await.unwrap());
    let events = Arc::new(EventDispatcher::new());
    let mut config = AuditConfig {
        emergency_log_path: dir.path().join("emergency.jsonl").display().to_string(),
        export_batch_size: 2,
        archive_batch_size: 2,
        ..AuditConfig::default()
    };
    configure(&mut config);
    let logger = AuditLogger::new(Arc::clone(&db), config, Arc::clone(&events));
    Harness {
        logger,
        db,
        events,
        dir,
    }
}

async fn harness() -> Harness {
    harness_with(|_| {}).await
}

fn persisted(outcome: LogOutcome) -> mas_core::entities::AuditEvent {
    match outcome {
        LogOutcome::Persisted(event) => event,
        other => panic!("expected a persisted event, got {other:?}"),
    }
}

#[tokio::test]
async fn sensitive_values_are_masked_before_storage() {
    let h = harness().await;
    let event = persisted(
        h.logger
            .log_event(
                AuditCategory::Authentication,
                "login",
                json!({"username": "ada", "password": "secret123", "api_key": "sk_live_abcdef"}),
                Severity::Low,
            )
            .await
            .unwrap(),
    );

    let stored = h.logger.get_event(&event.event_id).await.unwrap();
    assert_eq!(stored.event.context["username"], "ada");
    assert_eq!(stored.event.context["password"], "[REDACTED]");
    assert_ne!(stored.event.context["api_key"], "sk_live_abcdef");
    assert!(stored.integrity_ok);
}

#[tokio::test]
async fn stored_checksums_verify_and_detect_tampering() {
    let h = harness().await;
    let event = persisted(
        h.logger
            .log_system_event("boot", Severity::Low, json!({"version": "1.0"}))
            .await
            .unwrap(),
    );
    assert!(h.logger.verify_event(&event.event_id).await.unwrap());

    h.db.conn()
        .execute(
            "UPDATE audit_log SET context = '{\"version\":\"6.6\"}' WHERE event_id = ?1",
            [event.event_id.as_str()],
        )
        .await
        .unwrap();

    assert!(!h.logger.verify_event(&event.event_id).await.unwrap());
    let report = h.logger.verify_range(&AuditFilter::default()).await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.invalid, vec![event.event_id]);
}

#[tokio::test]
async fn context_ids_override_request_context() {
    let h = harness().await;
    h.logger.set_request_context(RequestContext {
        ip_address: "10.0.0.7".into(),
        customer_id: Some(5),
        user_id: Some(1),
        ..RequestContext::default()
    });

    let event = persisted(
        h.logger
            .log_data_access("customer", Some("9"), json!({"customer_id": 9}))
            .await
            .unwrap(),
    );
    assert_eq!(event.customer_id, Some(9));
    assert_eq!(event.user_id, Some(1));
    assert_eq!(event.ip_address, "10.0.0.7");
    assert_eq!(event.action, "read");
}

#[tokio::test]
async fn invalid_events_are_rejected() {
    let h = harness().await;
    let err = h
        .logger
        .log_event(AuditCategory::System, "", json!({}), Severity::Low)
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::Validation(_)));

    let err = h
        .logger
        .log_event(AuditCategory::System, "boot", json!([1, 2]), Severity::Low)
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::Validation(_)));

    let err = h
        .logger
        .log_event_raw("nonsense", "boot", Value::Null, "low")
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::Validation(_)));
    assert_eq!(h.logger.stats().total_events, 0);
}

#[tokio::test]
async fn disabled_logger_records_nothing() {
    let h = harness_with(|c| c.enabled = false).await;
    let outcome = h
        .logger
        .log_system_event("boot", Severity::Low, json!({}))
        .await
        .unwrap();
    assert!(matches!(outcome, LogOutcome::Disabled));
    let page = h.logger.search_logs(&AuditFilter::default(), 1, 10).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn alerts_are_raised_for_configured_keys_and_critical_events() {
    let h = harness().await;
    let alerts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&alerts);
    h.events.listen(EVENT_ALERT, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    h.logger
        .log_security_event("breach_attempt", Severity::High, json!({"ip": "1.2.3.4"}))
        .await
        .unwrap();
    h.logger
        .log_system_event("disk_full", Severity::Critical, json!({}))
        .await
        .unwrap();
    h.logger
        .log_system_event("boot", Severity::Low, json!({}))
        .await
        .unwrap();

    let open = h.logger.unacknowledged_alerts(10).await.unwrap();
    assert_eq!(open.len(), 2);
    assert_eq!(alerts.load(Ordering::SeqCst), 2);
    assert_eq!(h.logger.stats().alerts_raised, 2);

    let first = open[0].id;
    assert!(h.logger.acknowledge_alert(first).await.unwrap());
    assert!(!h.logger.acknowledge_alert(first).await.unwrap());
    assert_eq!(h.logger.unacknowledged_alerts(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn logged_events_are_dispatched() {
    let h = harness().await;
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    h.events.listen(EVENT_LOGGED, move |event| {
        assert_eq!(event.payload["category"], "consent");
        seen.fetch_add(1, Ordering::SeqCst);
    });

    h.logger
        .log_consent_event(42, "marketing_email", ConsentAction::Accept, Value::Null)
        .await
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let stats = h.logger.stats();
    assert_eq!(stats.total_events, 1);
    assert_eq!(stats.by_category.get("consent"), Some(&1));
}

#[tokio::test]
async fn storage_failure_diverts_to_emergency_log() {
    let h = harness().await;
    h.db.conn().execute("DROP TABLE audit_log", ()).await.unwrap();

    let outcome = h
        .logger
        .log_authentication("login", Some(3), false, json!({"password": "hunter22"}))
        .await
        .unwrap();
    let LogOutcome::Emergency { event_id, .. } = outcome else {
        panic!("expected emergency outcome");
    };

    let records = h.logger.emergency_log().read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_id, event_id);
    assert_eq!(records[0].action, "login_failed");
    assert_eq!(records[0].context["password"], "[REDACTED]");
    assert!(h.dir.path().join("emergency.jsonl").exists());
    assert_eq!(h.logger.stats().emergency_writes, 1);
}

#[tokio::test]
async fn events_survive_a_concurrent_rollback() {
    let h = harness().await;
    let guard = h.db.lock_writes().await;
    let tx = h.db.conn().transaction().await.unwrap();

    let (outcome, ()) = tokio::join!(
        h.logger.log_event(
            AuditCategory::Security,
            "login_failed",
            json!({"user_id": 3}),
            Severity::High,
        ),
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.rollback().await.unwrap();
            drop(guard);
        }
    );

    let event = persisted(outcome.unwrap());
    let stored = h.logger.get_event(&event.event_id).await.unwrap();
    assert!(stored.integrity_ok);
    assert!(h.logger.emergency_log().read_all().unwrap().is_empty());
}

#[tokio::test]
async fn search_filters_and_pages() {
    let h = harness().await;
    for i in 0..5 {
        h.logger
            .log_data_modification("product", "update", None, Some(json!({"sku": i})), json!({}))
            .await
            .unwrap();
    }
    h.logger
        .log_authentication("login", Some(7), true, json!({"note": "from_mobile"}))
        .await
        .unwrap();

    let filter = AuditFilter::default().category(AuditCategory::DataModification);
    let page = h.logger.search_logs(&filter, 2, 2).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.records.len(), 2);

    let last = h.logger.search_logs(&filter, 3, 2).await.unwrap();
    assert_eq!(last.records.len(), 1);

    let text = AuditFilter::default().search("from_mobile");
    let found = h.logger.search_logs(&text, 1, 50).await.unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.records[0].event.user_id, Some(7));

    let by_user = AuditFilter {
        user_id: Some(7),
        severities: vec![Severity::Low],
        ..AuditFilter::default()
    };
    assert_eq!(h.logger.search_logs(&by_user, 1, 50).await.unwrap().total, 1);
}

#[tokio::test]
async fn exports_are_hashed_and_complete() {
    let h = harness().await;
    for action in ["a", "b", "c"] {
        h.logger
            .log_system_event(action, Severity::Low, json!({"text": "x,y \"z\""}))
            .await
            .unwrap();
    }
    let out = h.dir.path().join("exports");

    let json_export = h
        .logger
        .export_to_format(
            &AuditFilter::default(),
            ExportFormat::Json,
            &ExportOptions {
                output_dir: out.clone(),
                compress: false,
                file_stem: Some("plain".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(json_export.records, 3);
    assert_eq!(json_export.sha256, file_sha256(&json_export.path).unwrap());
    let parsed: Vec<Value> =
        serde_json::from_str(&std::fs::read_to_string(&json_export.path).unwrap()).unwrap();
    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed[0]["integrity_ok"], true);

    let csv_export = h
        .logger
        .export_to_format(
            &AuditFilter::default(),
            ExportFormat::Csv,
            &ExportOptions {
                output_dir: out,
                compress: true,
                file_stem: Some("packed".into()),
            },
        )
        .await
        .unwrap();
    assert!(csv_export.path.to_string_lossy().ends_with("packed.csv.gz"));
    assert_eq!(csv_export.sha256, file_sha256(&csv_export.path).unwrap());

    let mut csv = String::new();
    GzDecoder::new(std::fs::File::open(&csv_export.path).unwrap())
        .read_to_string(&mut csv)
        .unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.starts_with("id,event_id,created_at"));
}

#[tokio::test]
async fn archive_moves_rows_and_keeps_checksums() {
    let h = harness().await;
    for i in 0..5 {
        h.logger
            .log_system_event("tick", Severity::Low, json!({"n": i}))
            .await
            .unwrap();
    }
    let before: Vec<String> = h
        .logger
        .search_logs(&AuditFilter::default(), 1, 50)
        .await
        .unwrap()
        .records
        .into_iter()
        .map(|r| r.event.checksum)
        .collect();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = h
        .logger
        .archive_logs(
            0,
            &ArchiveOptions {
                export: Some(ExportFormat::Json),
                output_dir: Some(h.dir.path().join("archive")),
                ..ArchiveOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(report.archived, 5);
    assert_eq!(report.batches, 3);
    assert_eq!(report.export.as_ref().map(|e| e.records), Some(5));
    assert_eq!(report.integrity_hash.len(), 64);

    assert_eq!(h.logger.search_logs(&AuditFilter::default(), 1, 50).await.unwrap().total, 0);
    assert_eq!(h.logger.archived_count().await.unwrap(), 5);

    let mut rows = h
        .db
        .conn()
        .query("SELECT checksum FROM audit_log_archive", ())
        .await
        .unwrap();
    let mut archived = Vec::new();
    while let Some(row) = rows.next().await.unwrap() {
        archived.push(row.get::<String>(0).unwrap());
    }
    for checksum in before {
        assert!(archived.contains(&checksum));
    }
}

#[tokio::test]
async fn archive_keeps_recent_rows() {
    let h = harness().await;
    h.logger
        .log_system_event("tick", Severity::Low, json!({}))
        .await
        .unwrap();
    let report = h.logger.apply_retention().await.unwrap();
    assert_eq!(report.archived, 0);
    assert_eq!(report.batches, 0);
    assert_eq!(h.logger.search_logs(&AuditFilter::default(), 1, 10).await.unwrap().total, 1);
}

#[tokio::test]
async fn gdpr_report_scores_checks() {
    let h = harness().await;
    h.logger
        .log_consent_event(42, "newsletter", ConsentAction::Accept, json!({}))
        .await
        .unwrap();
    h.logger
        .log_gdpr_request(42, "data_export", "requested", json!({}))
        .await
        .unwrap();
    h.logger
        .log_gdpr_request(42, "data_export", "completed", json!({}))
        .await
        .unwrap();

    let range = DateRange::last_days(1);
    let report = h
        .logger
        .generate_compliance_report(Regulation::Gdpr, range, &ReportOptions::default())
        .await
        .unwrap();
    assert_eq!(report.total, 5);
    assert_eq!(report.passed, 5);
    assert!((report.score - 100.0).abs() < f64::EPSILON);
    assert_eq!(report.verdict, Verdict::Compliant);
    assert_eq!(report.statistics.total_events, 3);
    assert_eq!(report.statistics.unique_customers, 1);

    h.logger
        .log_security_event("intrusion", Severity::Critical, json!({}))
        .await
        .unwrap();
    let range = DateRange {
        from: range.from,
        to: Utc::now() + chrono::Duration::seconds(1),
    };
    let strict = h
        .logger
        .generate_compliance_report(Regulation::Gdpr, range, &ReportOptions { threshold: Some(90) })
        .await
        .unwrap();
    assert_eq!(strict.passed, 4);
    assert!((strict.score - 80.0).abs() < f64::EPSILON);
    assert_eq!(strict.verdict, Verdict::NeedsAttention);
    let failed: Vec<_> = strict.checks.iter().filter(|c| !c.passed).map(|c| c.name).collect();
    assert_eq!(failed, vec!["breach_response"]);
}

#[tokio::test]
async fn sox_report_flags_short_retention() {
    let h = harness().await;
    h.logger
        .log_authentication("login", Some(1), true, json!({}))
        .await
        .unwrap();
    h.logger
        .log_configuration_change("smtp.host", json!("a"), json!("b"), json!({}))
        .await
        .unwrap();

    let report = h
        .logger
        .generate_compliance_report(Regulation::Sox, DateRange::last_days(1), &ReportOptions::default())
        .await
        .unwrap();
    let retention = report
        .checks
        .iter()
        .find(|c| c.name == "retention_period")
        .unwrap();
    assert!(!retention.passed);
    assert_eq!(report.passed, 4);
    assert_eq!(report.verdict, Verdict::Compliant);
}

#[tokio::test]
async fn empty_report_range_is_rejected() {
    let h = harness().await;
    let now = Utc::now();
    let err = h
        .logger
        .generate_compliance_report(
            Regulation::Hipaa,
            DateRange { from: now, to: now },
            &ReportOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::Validation(_)));
}
