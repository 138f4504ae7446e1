//! In-memory logging counters.

use std::collections::BTreeMap;
use std::time::Duration;

use mas_core::enums::{AuditCategory, Severity};
use serde::Serialize;

/// Counters since the logger was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub total_events: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
    pub emergency_writes: u64,
    pub alerts_raised: u64,
    pub average_log_time_us: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    by_category: BTreeMap<AuditCategory, u64>,
    by_severity: BTreeMap<Severity, u64>,
    total: u64,
    emergency: u64,
    alerts: u64,
    total_time: Duration,
}

impl Counters {
    pub(crate) fn record(&mut self, category: AuditCategory, severity: Severity, elapsed: Duration) {
        *self.by_category.entry(category).or_default() += 1;
        *self.by_severity.entry(severity).or_default() += 1;
        self.total += 1;
        self.total_time += elapsed;
    }

    pub(crate) const fn record_emergency(&mut self) {
        self.emergency += 1;
    }

    pub(crate) const fn record_alert(&mut self) {
        self.alerts += 1;
    }

    pub(crate) fn snapshot(&self) -> AuditStats {
        let average = if self.total == 0 {
            0
        } else {
            u64::try_from(self.total_time.as_micros() / u128::from(self.total)).unwrap_or(u64::MAX)
        };
        AuditStats {
            total_events: self.total,
            by_category: self
                .by_category
                .iter()
                .map(|(c, n)| (c.as_str().to_string(), *n))
                .collect(),
            by_severity: self
                .by_severity
                .iter()
                .map(|(s, n)| (s.as_str().to_string(), *n))
                .collect(),
            emergency_writes: self.emergency,
            alerts_raised: self.alerts,
            average_log_time_us: average,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_aggregates() {
        let mut counters = Counters::default();
        counters.record(AuditCategory::System, Severity::Low, Duration::from_micros(10));
        counters.record(AuditCategory::System, Severity::High, Duration::from_micros(30));
        counters.record_alert();
        counters.record_emergency();

        let stats = counters.snapshot();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.by_category["system"], 2);
        assert_eq!(stats.by_severity["high"], 1);
        assert_eq!(stats.average_log_time_us, 20);
        assert_eq!((stats.alerts_raised, stats.emergency_writes), (1, 1));
    }
}
