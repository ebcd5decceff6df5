use super::{unavailable_message, HealthStatus, HealthThresholds};
use crate::constants::RECENT_FAILURES_LIMIT;
use crate::error::IngestError;
use crate::pipeline::storage::{IngestionRecord, IngestionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A failed ingestion, for drill-down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub id: String,
    pub source: String,
    pub source_url: String,
    pub ingested_at: DateTime<Utc>,
}

impl From<&IngestionRecord> for FailureEntry {
    fn from(r: &IngestionRecord) -> Self {
        Self {
            id: r.id.clone(),
            source: r.source.clone(),
            source_url: r.source_url.clone(),
            ingested_at: r.ingested_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedIngestionsCheck {
    pub status: HealthStatus,
    pub failed_count: usize,
    pub total_count: usize,
    /// Percentage, 0–100.
    pub failure_rate: f64,
    pub window_hours: i64,
    pub recent_failures: Vec<FailureEntry>,
    pub message: String,
}

impl FailedIngestionsCheck {
    pub(crate) fn unavailable(window_hours: i64, err: &IngestError) -> Self {
        Self {
            status: HealthStatus::Critical,
            failed_count: 0,
            total_count: 0,
            failure_rate: 0.0,
            window_hours,
            recent_failures: Vec::new(),
            message: unavailable_message("failed ingestions", err),
        }
    }
}

/// Newest failures first, at most `limit` of them.
pub(crate) fn recent_failures(records: &[IngestionRecord], limit: usize) -> Vec<FailureEntry> {
    let mut failures: Vec<&IngestionRecord> = records
        .iter()
        .filter(|r| r.status == IngestionStatus::Failed)
        .collect();
    failures.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at));
    failures.into_iter().take(limit).map(FailureEntry::from).collect()
}

/// `records` must already be restricted to the trailing window.
pub(crate) fn evaluate(
    records: &[IngestionRecord],
    window_hours: i64,
    thresholds: &HealthThresholds,
) -> FailedIngestionsCheck {
    let total_count = records.len();
    let failed_count = records
        .iter()
        .filter(|r| r.status == IngestionStatus::Failed)
        .count();
    let failure_rate = if total_count == 0 {
        0.0
    } else {
        failed_count as f64 * 100.0 / total_count as f64
    };

    let status = if failure_rate >= thresholds.failure_critical_percent {
        HealthStatus::Critical
    } else if failure_rate >= thresholds.failure_warning_percent {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };

    let message = if total_count == 0 {
        format!("No ingestions in the last {}h", window_hours)
    } else {
        format!(
            "{} of {} ingestions failed in the last {}h ({:.1}%)",
            failed_count, total_count, window_hours, failure_rate
        )
    };

    FailedIngestionsCheck {
        status,
        failed_count,
        total_count,
        failure_rate,
        window_hours,
        recent_failures: recent_failures(records, RECENT_FAILURES_LIMIT),
        message,
    }
}
