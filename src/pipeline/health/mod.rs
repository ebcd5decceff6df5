//! Source health: three independent probes over the ingestion log, reduced
//! to a single status.
//!
//! - failed ingestions: failure rate over a trailing window
//! - stale data: sources whose last successful pull is too old
//! - API quota: observed request volume per source (from the log, not from
//!   the in-memory rate limiters)
//!
//! Probes never return errors. If the log cannot be read, the probe reports
//! `critical` with the reason in its message.

pub mod failed;
pub mod quota;
pub mod stale;
pub mod summary;

pub use failed::{FailedIngestionsCheck, FailureEntry};
pub use quota::{ApiQuotaCheck, SourceQuota};
pub use stale::{StaleDataCheck, StaleSource};
pub use summary::{format_summary_report, SummaryReport, SummaryReporter};

use crate::clock::{system_clock, Clock};
use crate::constants;
use crate::error::{IngestError, Result};
use crate::metrics::{core::time_operation, phase_metric, HealthMetrics};
use crate::pipeline::storage::IngestionLog;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }

    /// Worst of the given statuses; `Healthy` for none.
    pub fn worst<I: IntoIterator<Item = HealthStatus>>(statuses: I) -> HealthStatus {
        statuses.into_iter().max().unwrap_or(HealthStatus::Healthy)
    }

    pub(crate) fn gauge_value(&self) -> f64 {
        match self {
            HealthStatus::Healthy => 0.0,
            HealthStatus::Warning => 1.0,
            HealthStatus::Critical => 2.0,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe thresholds. Failure percentages are inclusive (`>=`), quota counts
/// are exclusive (`>`), staleness is exclusive (`>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub failure_window_hours: i64,
    pub failure_warning_percent: f64,
    pub failure_critical_percent: f64,
    pub stale_threshold_hours: i64,
    pub quota_warning_per_hour: usize,
    pub quota_critical_per_hour: usize,
    pub quota_warning_per_day: usize,
    pub quota_critical_per_day: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            failure_window_hours: constants::DEFAULT_FAILURE_WINDOW_HOURS,
            failure_warning_percent: constants::DEFAULT_FAILURE_WARNING_PERCENT,
            failure_critical_percent: constants::DEFAULT_FAILURE_CRITICAL_PERCENT,
            stale_threshold_hours: constants::DEFAULT_STALE_THRESHOLD_HOURS,
            quota_warning_per_hour: constants::DEFAULT_QUOTA_WARNING_PER_HOUR,
            quota_critical_per_hour: constants::DEFAULT_QUOTA_CRITICAL_PER_HOUR,
            quota_warning_per_day: constants::DEFAULT_QUOTA_WARNING_PER_DAY,
            quota_critical_per_day: constants::DEFAULT_QUOTA_CRITICAL_PER_DAY,
        }
    }
}

impl HealthThresholds {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.failure_window_hours <= 0 || self.stale_threshold_hours <= 0 {
            return Err(IngestError::Config(
                "health window lengths must be positive".to_string(),
            ));
        }
        if self.failure_warning_percent > self.failure_critical_percent {
            return Err(IngestError::Config(format!(
                "failure_warning_percent ({}) exceeds failure_critical_percent ({})",
                self.failure_warning_percent, self.failure_critical_percent
            )));
        }
        if self.quota_warning_per_hour > self.quota_critical_per_hour
            || self.quota_warning_per_day > self.quota_critical_per_day
        {
            return Err(IngestError::Config(
                "quota warning thresholds must not exceed critical thresholds".to_string(),
            ));
        }
        Ok(())
    }
}

/// All three probe results at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallHealth {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub failed_ingestions: FailedIngestionsCheck,
    pub stale_data: StaleDataCheck,
    pub api_quota: ApiQuotaCheck,
}

impl OverallHealth {
    pub fn from_checks(
        failed_ingestions: FailedIngestionsCheck,
        stale_data: StaleDataCheck,
        api_quota: ApiQuotaCheck,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let status = HealthStatus::worst([
            failed_ingestions.status,
            stale_data.status,
            api_quota.status,
        ]);
        Self {
            status,
            timestamp,
            failed_ingestions,
            stale_data,
            api_quota,
        }
    }
}

pub(crate) fn unavailable_message(probe: &str, err: &IngestError) -> String {
    format!("Unable to read ingestion log for {} check: {}", probe, err)
}

/// Runs the health probes against an ingestion log.
#[derive(Clone)]
pub struct HealthAggregator {
    log: Arc<dyn IngestionLog>,
    clock: Arc<dyn Clock>,
    thresholds: HealthThresholds,
}

impl HealthAggregator {
    pub fn new(log: Arc<dyn IngestionLog>) -> Self {
        Self::with_clock(log, system_clock())
    }

    pub fn with_clock(log: Arc<dyn IngestionLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            log,
            clock,
            thresholds: HealthThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    pub(crate) fn log(&self) -> &Arc<dyn IngestionLog> {
        &self.log
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn check_failed_ingestions(&self, window_hours: i64) -> FailedIngestionsCheck {
        let now = self.clock.now();
        let since = now - Duration::hours(window_hours);
        let check = match self.log.records_since(since).await {
            Ok(records) => failed::evaluate(&records, window_hours, &self.thresholds),
            Err(e) => {
                warn!(error = %e, "failed-ingestion probe could not read the log");
                FailedIngestionsCheck::unavailable(window_hours, &e)
            }
        };
        HealthMetrics::record_probe("failed_ingestions", check.status);
        check
    }

    pub async fn check_stale_data(&self, threshold_hours: i64) -> StaleDataCheck {
        let now = self.clock.now();
        let check = match self.log.latest_success_by_source().await {
            Ok(latest) => stale::evaluate(latest, now, threshold_hours),
            Err(e) => {
                warn!(error = %e, "stale-data probe could not read the log");
                StaleDataCheck::unavailable(threshold_hours, &e)
            }
        };
        HealthMetrics::record_probe("stale_data", check.status);
        check
    }

    pub async fn check_api_quota(&self) -> ApiQuotaCheck {
        let now = self.clock.now();
        let check = match self.log.records_since(now - Duration::hours(24)).await {
            Ok(records) => quota::evaluate(&records, now, &self.thresholds),
            Err(e) => {
                warn!(error = %e, "quota probe could not read the log");
                ApiQuotaCheck::unavailable(&e)
            }
        };
        HealthMetrics::record_probe("api_quota", check.status);
        check
    }

    /// Run all probes with the configured thresholds and combine them.
    pub async fn check_health(&self) -> OverallHealth {
        let timing = time_operation(phase_metric!(histogram, "health", "check_duration_seconds"));
        let (failed_ingestions, stale_data, api_quota) = tokio::join!(
            self.check_failed_ingestions(self.thresholds.failure_window_hours),
            self.check_stale_data(self.thresholds.stale_threshold_hours),
            self.check_api_quota(),
        );
        let health = OverallHealth::from_checks(
            failed_ingestions,
            stale_data,
            api_quota,
            self.clock.now(),
        );
        timing.finish();
        HealthMetrics::record_overall(health.status);
        info!(
            status = %health.status,
            failed_ingestions = %health.failed_ingestions.status,
            stale_data = %health.stale_data.status,
            api_quota = %health.api_quota.status,
            "health check complete"
        );
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pipeline::storage::{InMemoryIngestionLog, IngestionRecord, IngestionStatus};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    const ALL: [HealthStatus; 3] = [
        HealthStatus::Healthy,
        HealthStatus::Warning,
        HealthStatus::Critical,
    ];

    fn failed_with(status: HealthStatus) -> FailedIngestionsCheck {
        FailedIngestionsCheck {
            status,
            failed_count: 0,
            total_count: 0,
            failure_rate: 0.0,
            window_hours: 24,
            recent_failures: Vec::new(),
            message: String::new(),
        }
    }

    fn stale_with(status: HealthStatus) -> StaleDataCheck {
        StaleDataCheck {
            status,
            threshold_hours: 24,
            stale_sources: Vec::new(),
            last_ingestion_by_source: BTreeMap::new(),
            message: String::new(),
        }
    }

    fn quota_with(status: HealthStatus) -> ApiQuotaCheck {
        ApiQuotaCheck {
            status,
            quota_by_source: BTreeMap::new(),
            message: String::new(),
        }
    }

    #[test]
    fn test_overall_is_worst_of_all_27_combinations() {
        for f in ALL {
            for s in ALL {
                for q in ALL {
                    let overall = OverallHealth::from_checks(
                        failed_with(f),
                        stale_with(s),
                        quota_with(q),
                        Utc::now(),
                    );
                    let expected = if [f, s, q].contains(&HealthStatus::Critical) {
                        HealthStatus::Critical
                    } else if [f, s, q].contains(&HealthStatus::Warning) {
                        HealthStatus::Warning
                    } else {
                        HealthStatus::Healthy
                    };
                    assert_eq!(overall.status, expected, "combination {:?}", (f, s, q));
                }
            }
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Critical).unwrap(),
            "\"critical\""
        );
        assert!(HealthStatus::Critical > HealthStatus::Warning);
        assert!(HealthStatus::Warning > HealthStatus::Healthy);
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(HealthThresholds::default().validate().is_ok());
        let inverted = HealthThresholds {
            failure_warning_percent: 30.0,
            ..HealthThresholds::default()
        };
        assert!(inverted.validate().is_err());

        let custom = HealthThresholds {
            stale_threshold_hours: 48,
            ..HealthThresholds::default()
        };
        let aggregator = HealthAggregator::new(Arc::new(InMemoryIngestionLog::new()))
            .with_thresholds(custom.clone());
        assert_eq!(aggregator.thresholds(), &custom);
    }

    struct UnreachableLog;

    #[async_trait]
    impl IngestionLog for UnreachableLog {
        async fn records_since(&self, _since: DateTime<Utc>) -> Result<Vec<IngestionRecord>> {
            Err(IngestError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "database unreachable",
            )))
        }

        async fn all_records(&self) -> Result<Vec<IngestionRecord>> {
            self.records_since(Utc::now()).await
        }
    }

    #[tokio::test]
    async fn test_unreachable_log_degrades_to_critical() {
        let aggregator = HealthAggregator::new(Arc::new(UnreachableLog));
        let health = aggregator.check_health().await;
        assert_eq!(health.status, HealthStatus::Critical);
        assert_eq!(health.failed_ingestions.status, HealthStatus::Critical);
        assert_eq!(health.stale_data.status, HealthStatus::Critical);
        assert_eq!(health.api_quota.status, HealthStatus::Critical);
        assert!(health.api_quota.message.contains("database unreachable"));
    }

    #[tokio::test]
    async fn test_healthy_log_end_to_end() {
        let clock = ManualClock::default();
        let now = clock.now();
        let log = InMemoryIngestionLog::new();
        for source in ["serper", "google_places"] {
            for i in 0..5 {
                log.push(IngestionRecord::new(
                    source,
                    format!("https://{}.example/{}", source, i),
                    IngestionStatus::Success,
                    b"ok",
                    now - Duration::hours(i),
                ));
            }
        }

        let aggregator = HealthAggregator::with_clock(Arc::new(log), Arc::new(clock));
        let health = aggregator.check_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.failed_ingestions.total_count, 10);
        assert_eq!(health.stale_data.last_ingestion_by_source.len(), 2);
        assert_eq!(health.timestamp, now);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json["failed_ingestions"]["recent_failures"].is_array());
        assert!(json["stale_data"]["last_ingestion_by_source"].is_object());
        assert!(json["api_quota"]["quota_by_source"]["serper"].is_object());
    }
}
