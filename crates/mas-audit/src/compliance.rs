//! Per-regulation compliance reports over a date range.
//!
//! Each regulation runs a fixed set of boolean checks against the audit log
//! and configuration. The score is `passed / total * 100`; a score at or
//! above the configured threshold is `compliant`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use mas_db::helpers::{format_datetime, get_opt_string, parse_datetime};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::AuditError;
use crate::logger::AuditLogger;
use crate::search::AuditFilter;

/// SOX asks for seven years of audit history.
const SOX_MIN_RETENTION_DAYS: u32 = 2555;
/// PCI-DSS requirement 10.7: at least one year.
const PCI_MIN_RETENTION_DAYS: u32 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regulation {
    #[serde(rename = "gdpr")]
    Gdpr,
    #[serde(rename = "sox")]
    Sox,
    #[serde(rename = "hipaa")]
    Hipaa,
    #[serde(rename = "pci_dss")]
    PciDss,
}

impl Regulation {
    pub const ALL: [Self; 4] = [Self::Gdpr, Self::Sox, Self::Hipaa, Self::PciDss];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gdpr => "gdpr",
            Self::Sox => "sox",
            Self::Hipaa => "hipaa",
            Self::PciDss => "pci_dss",
        }
    }
}

impl fmt::Display for Regulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Regulation {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "gdpr" => Ok(Self::Gdpr),
            "sox" => Ok(Self::Sox),
            "hipaa" => Ok(Self::Hipaa),
            "pci_dss" | "pcidss" | "pci" => Ok(Self::PciDss),
            other => Err(AuditError::validation(format!("unknown regulation '{other}'"))),
        }
    }
}

/// Half-open `[from, to)` reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// The `days` days up to now.
    #[must_use]
    pub fn last_days(days: u32) -> Self {
        let to = Utc::now();
        Self {
            from: to - Duration::days(i64::from(days)),
            to,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Overrides `compliance_pass_threshold`.
    pub threshold: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Compliant,
    NeedsAttention,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceCheck {
    pub name: &'static str,
    pub description: &'static str,
    pub passed: bool,
    pub detail: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComplianceStatistics {
    pub total_events: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
    pub unique_users: u64,
    pub unique_customers: u64,
    pub alerts: u64,
    pub unacknowledged_alerts: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub regulation: Regulation,
    pub range: DateRange,
    pub generated_at: DateTime<Utc>,
    pub statistics: ComplianceStatistics,
    pub checks: Vec<ComplianceCheck>,
    pub passed: usize,
    pub total: usize,
    /// 0-100.
    pub score: f64,
    pub threshold: u8,
    pub verdict: Verdict,
}

/// Score and verdict for a set of checks.
#[must_use]
pub fn score(checks: &[ComplianceCheck], threshold: u8) -> (usize, f64, Verdict) {
    let passed = checks.iter().filter(|c| c.passed).count();
    if checks.is_empty() {
        return (0, 0.0, Verdict::NeedsAttention);
    }
    #[allow(clippy::cast_precision_loss)]
    let score = (passed as f64 / checks.len() as f64) * 100.0;
    let score = (score * 10.0).round() / 10.0;
    let verdict = if score >= f64::from(threshold) {
        Verdict::Compliant
    } else {
        Verdict::NeedsAttention
    };
    (passed, score, verdict)
}

fn check(name: &'static str, description: &'static str, passed: bool, detail: Value) -> ComplianceCheck {
    ComplianceCheck {
        name,
        description,
        passed,
        detail,
    }
}

impl AuditLogger {
    /// Run the checks for `regulation` over `range`.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Validation` for an empty range and
    /// `AuditError::Database` if a query fails.
    pub async fn generate_compliance_report(
        &self,
        regulation: Regulation,
        range: DateRange,
        options: &ReportOptions,
    ) -> Result<ComplianceReport, AuditError> {
        if range.from >= range.to {
            return Err(AuditError::validation("report range must have from < to"));
        }
        let threshold = options
            .threshold
            .unwrap_or(self.config.compliance_pass_threshold)
            .min(100);

        let statistics = self.statistics(&range).await?;
        let checks = match regulation {
            Regulation::Gdpr => self.gdpr_checks(&range).await?,
            Regulation::Sox => self.sox_checks(&range, &statistics).await?,
            Regulation::Hipaa => self.hipaa_checks(&range, &statistics).await?,
            Regulation::PciDss => self.pci_checks(&range).await?,
        };
        let (passed, score, verdict) = score(&checks, threshold);

        tracing::info!(%regulation, passed, total = checks.len(), score, "compliance report generated");
        Ok(ComplianceReport {
            regulation,
            range,
            generated_at: Utc::now(),
            statistics,
            total: checks.len(),
            checks,
            passed,
            score,
            threshold,
            verdict,
        })
    }

    /// `COUNT(*)` of events in `range` that also satisfy `condition`.
    ///
    /// Parameters in `condition` are numbered from `?3`.
    async fn count_in_range(
        &self,
        range: &DateRange,
        condition: &str,
        extra: Vec<libsql::Value>,
    ) -> Result<u64, AuditError> {
        let mut params = vec![
            libsql::Value::Text(format_datetime(&range.from)),
            libsql::Value::Text(format_datetime(&range.to)),
        ];
        params.extend(extra);
        let n = self
            .db
            .scalar_i64(
                &format!(
                    "SELECT COUNT(*) FROM audit_log
                     WHERE created_at >= ?1 AND created_at < ?2 AND ({condition})"
                ),
                params,
            )
            .await?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    async fn count_category(&self, range: &DateRange, categories: &[&str]) -> Result<u64, AuditError> {
        let slots: Vec<String> = (0..categories.len()).map(|i| format!("?{}", i + 3)).collect();
        let params = categories
            .iter()
            .map(|c| libsql::Value::Text((*c).to_string()))
            .collect();
        self.count_in_range(range, &format!("category IN ({})", slots.join(", ")), params)
            .await
    }

    /// Alerts raised in `range` that nobody acknowledged, optionally narrowed.
    async fn open_alerts(
        &self,
        range: &DateRange,
        category: Option<&str>,
        severity: Option<&str>,
    ) -> Result<u64, AuditError> {
        let mut sql = String::from(
            "SELECT COUNT(*) FROM audit_alerts
             WHERE acknowledged = 0 AND created_at >= ?1 AND created_at < ?2",
        );
        let mut params = vec![
            libsql::Value::Text(format_datetime(&range.from)),
            libsql::Value::Text(format_datetime(&range.to)),
        ];
        if let Some(category) = category {
            params.push(libsql::Value::Text(category.to_string()));
            sql.push_str(&format!(" AND category = ?{}", params.len()));
        }
        if let Some(severity) = severity {
            params.push(libsql::Value::Text(severity.to_string()));
            sql.push_str(&format!(" AND severity = ?{}", params.len()));
        }
        let n = self.db.scalar_i64(&sql, params).await?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    async fn integrity_check(&self, range: &DateRange) -> Result<ComplianceCheck, AuditError> {
        let filter = AuditFilter::default().between(range.from, range.to);
        let report = self.verify_range(&filter).await?;
        Ok(check(
            "audit_integrity",
            "Every audit record in the period matches its checksum",
            report.is_intact(),
            json!({"checked": report.checked, "invalid": report.invalid}),
        ))
    }

    async fn oldest_live_event(&self) -> Result<Option<DateTime<Utc>>, AuditError> {
        let mut rows = self
            .db
            .conn()
            .query("SELECT MIN(created_at) FROM audit_log", ())
            .await?;
        match rows.next().await? {
            Some(row) => match get_opt_string(&row, 0)? {
                Some(text) => Ok(Some(parse_datetime(&text)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    fn masking_check(&self) -> ComplianceCheck {
        check(
            "data_masking",
            "Sensitive fields are masked before storage",
            self.config.masking_enabled && !self.config.sensitive_fields.is_empty(),
            json!({
                "masking_enabled": self.config.masking_enabled,
                "sensitive_fields": self.config.sensitive_fields.len(),
            }),
        )
    }

    fn retention_minimum_check(&self, minimum: u32) -> ComplianceCheck {
        check(
            "retention_period",
            "Audit retention meets the regulation's minimum",
            self.config.retention_days >= minimum,
            json!({"retention_days": self.config.retention_days, "minimum_days": minimum}),
        )
    }

    async fn gdpr_checks(&self, range: &DateRange) -> Result<Vec<ComplianceCheck>, AuditError> {
        let consent_events = self.count_category(range, &["consent"]).await?;
        let status = |s: &str| {
            (
                "category = 'gdpr' AND json_extract(context, '$.status') = ?3",
                vec![libsql::Value::Text(s.to_string())],
            )
        };
        let (cond, params) = status("requested");
        let requested = self.count_in_range(range, cond, params).await?;
        let (cond, params) = status("completed");
        let completed = self.count_in_range(range, cond, params).await?;

        let oldest = self.oldest_live_event().await?;
        let limit = Utc::now() - Duration::days(i64::from(self.config.retention_days));
        let within_retention = oldest.is_none_or(|at| at >= limit);
        let critical_open = self.open_alerts(range, None, Some("critical")).await?;

        Ok(vec![
            check(
                "consent_tracking",
                "Consent changes are recorded in the audit log",
                consent_events > 0,
                json!({"consent_events": consent_events}),
            ),
            check(
                "data_subject_requests",
                "Every data subject request in the period was completed",
                requested <= completed,
                json!({"requested": requested, "completed": completed}),
            ),
            self.integrity_check(range).await?,
            check(
                "storage_limitation",
                "No live audit data is older than the retention period",
                within_retention,
                json!({
                    "retention_days": self.config.retention_days,
                    "oldest_event": oldest.map(|at| format_datetime(&at)),
                }),
            ),
            check(
                "breach_response",
                "No critical alert is left unacknowledged",
                critical_open == 0,
                json!({"unacknowledged_critical_alerts": critical_open}),
            ),
        ])
    }

    async fn sox_checks(
        &self,
        range: &DateRange,
        statistics: &ComplianceStatistics,
    ) -> Result<Vec<ComplianceCheck>, AuditError> {
        let access = self
            .count_category(range, &["authorization", "authentication"])
            .await?;
        let changes = self
            .count_category(range, &["configuration", "data_modification"])
            .await?;
        Ok(vec![
            check(
                "audit_trail_present",
                "The period has an audit trail",
                statistics.total_events > 0,
                json!({"total_events": statistics.total_events}),
            ),
            self.integrity_check(range).await?,
            check(
                "access_control_monitoring",
                "Access control decisions are logged",
                access > 0,
                json!({"access_events": access}),
            ),
            check(
                "change_management",
                "Configuration and data changes are logged",
                changes > 0,
                json!({"change_events": changes}),
            ),
            self.retention_minimum_check(SOX_MIN_RETENTION_DAYS),
        ])
    }

    async fn hipaa_checks(
        &self,
        range: &DateRange,
        statistics: &ComplianceStatistics,
    ) -> Result<Vec<ComplianceCheck>, AuditError> {
        let access = self.count_category(range, &["data_access"]).await?;
        let auth = self.count_category(range, &["authentication"]).await?;
        Ok(vec![
            check(
                "phi_access_logged",
                "Access to protected data is logged",
                access > 0,
                json!({"data_access_events": access}),
            ),
            self.integrity_check(range).await?,
            check(
                "alerts_reviewed",
                "Every alert in the period was reviewed",
                statistics.unacknowledged_alerts == 0,
                json!({"unacknowledged_alerts": statistics.unacknowledged_alerts}),
            ),
            check(
                "authentication_tracked",
                "Logins and logouts are logged",
                auth > 0,
                json!({"authentication_events": auth}),
            ),
            self.masking_check(),
        ])
    }

    async fn pci_checks(&self, range: &DateRange) -> Result<Vec<ComplianceCheck>, AuditError> {
        let failed_logins = self
            .count_in_range(
                range,
                "category = 'authentication' AND action LIKE '%\\_failed' ESCAPE '\\'",
                Vec::new(),
            )
            .await?;
        let threshold = u64::from(self.config.failed_login_threshold);
        let critical_security = self
            .open_alerts(range, Some("security"), Some("critical"))
            .await?;
        Ok(vec![
            self.masking_check(),
            check(
                "failed_login_monitoring",
                "Failed logins stay below the alert threshold",
                failed_logins < threshold,
                json!({"failed_logins": failed_logins, "threshold": threshold}),
            ),
            self.integrity_check(range).await?,
            check(
                "security_incidents",
                "No critical security alert is left unacknowledged",
                critical_security == 0,
                json!({"unacknowledged_critical_security_alerts": critical_security}),
            ),
            self.retention_minimum_check(PCI_MIN_RETENTION_DAYS),
        ])
    }

    async fn statistics(&self, range: &DateRange) -> Result<ComplianceStatistics, AuditError> {
        let bounds = || {
            vec![
                libsql::Value::Text(format_datetime(&range.from)),
                libsql::Value::Text(format_datetime(&range.to)),
            ]
        };
        let window = "created_at >= ?1 AND created_at < ?2";

        let mut stats = ComplianceStatistics {
            total_events: self.count_in_range(range, "1 = 1", Vec::new()).await?,
            ..ComplianceStatistics::default()
        };
        for (column, target) in [("category", &mut stats.by_category), ("severity", &mut stats.by_severity)] {
            let mut rows = self
                .db
                .conn()
                .query(
                    &format!(
                        "SELECT {column}, COUNT(*) FROM audit_log WHERE {window} GROUP BY {column} ORDER BY {column}"
                    ),
                    libsql::params_from_iter(bounds()),
                )
                .await?;
            while let Some(row) = rows.next().await? {
                let n = u64::try_from(row.get::<i64>(1)?).unwrap_or_default();
                target.insert(row.get::<String>(0)?, n);
            }
        }

        let distinct = |column: &str| {
            format!("SELECT COUNT(DISTINCT {column}) FROM audit_log WHERE {window} AND {column} IS NOT NULL")
        };
        stats.unique_users =
            u64::try_from(self.db.scalar_i64(&distinct("user_id"), bounds()).await?).unwrap_or_default();
        stats.unique_customers =
            u64::try_from(self.db.scalar_i64(&distinct("customer_id"), bounds()).await?).unwrap_or_default();
        stats.alerts = u64::try_from(
            self.db
                .scalar_i64(&format!("SELECT COUNT(*) FROM audit_alerts WHERE {window}"), bounds())
                .await?,
        )
        .unwrap_or_default();
        stats.unacknowledged_alerts = self.open_alerts(range, None, None).await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn checks(results: &[bool]) -> Vec<ComplianceCheck> {
        results
            .iter()
            .map(|passed| check("c", "d", *passed, Value::Null))
            .collect()
    }

    #[rstest]
    #[case(&[true, true, true, true, true], 100.0, Verdict::Compliant)]
    #[case(&[true, true, true, true, false], 80.0, Verdict::Compliant)]
    #[case(&[true, true, true, false, false], 60.0, Verdict::NeedsAttention)]
    #[case(&[true, true, false], 66.7, Verdict::NeedsAttention)]
    #[case(&[], 0.0, Verdict::NeedsAttention)]
    fn score_arithmetic(#[case] results: &[bool], #[case] expected: f64, #[case] verdict: Verdict) {
        let (passed, score, got) = score(&checks(results), 80);
        assert_eq!(passed, results.iter().filter(|p| **p).count());
        assert!((score - expected).abs() < f64::EPSILON, "{score} != {expected}");
        assert_eq!(got, verdict);
    }

    #[rstest]
    #[case("GDPR", Regulation::Gdpr)]
    #[case("pci-dss", Regulation::PciDss)]
    #[case("PCI_DSS", Regulation::PciDss)]
    #[case("hipaa", Regulation::Hipaa)]
    fn regulation_parsing(#[case] raw: &str, #[case] expected: Regulation) {
        assert_eq!(raw.parse::<Regulation>().unwrap(), expected);
    }
}
