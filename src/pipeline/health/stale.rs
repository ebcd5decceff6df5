use super::{unavailable_message, HealthStatus};
use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleSource {
    pub source: String,
    pub last_success: DateTime<Utc>,
    pub hours_since: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleDataCheck {
    pub status: HealthStatus,
    pub threshold_hours: i64,
    pub stale_sources: Vec<StaleSource>,
    pub last_ingestion_by_source: BTreeMap<String, DateTime<Utc>>,
    pub message: String,
}

impl StaleDataCheck {
    pub(crate) fn unavailable(threshold_hours: i64, err: &IngestError) -> Self {
        Self {
            status: HealthStatus::Critical,
            threshold_hours,
            stale_sources: Vec::new(),
            last_ingestion_by_source: BTreeMap::new(),
            message: unavailable_message("stale data", err),
        }
    }
}

/// `latest` maps each source to its newest successful ingestion.
///
/// No successful ingestion anywhere is a warning, not critical: there is
/// nothing to be stale yet. Every source stale is critical.
pub(crate) fn evaluate(
    latest: BTreeMap<String, DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold_hours: i64,
) -> StaleDataCheck {
    if latest.is_empty() {
        return StaleDataCheck {
            status: HealthStatus::Warning,
            threshold_hours,
            stale_sources: Vec::new(),
            last_ingestion_by_source: latest,
            message: "No successful ingestions found".to_string(),
        };
    }

    let threshold = threshold_hours as f64;
    let stale_sources: Vec<StaleSource> = latest
        .iter()
        .filter_map(|(source, last)| {
            let hours_since = (now - *last).num_seconds() as f64 / 3600.0;
            (hours_since > threshold).then(|| StaleSource {
                source: source.clone(),
                last_success: *last,
                hours_since,
            })
        })
        .collect();

    let (status, message) = if stale_sources.is_empty() {
        (
            HealthStatus::Healthy,
            format!(
                "All {} sources ingested within the last {}h",
                latest.len(),
                threshold_hours
            ),
        )
    } else if stale_sources.len() == latest.len() {
        (
            HealthStatus::Critical,
            format!(
                "All {} sources are stale (no success in over {}h)",
                latest.len(),
                threshold_hours
            ),
        )
    } else {
        let names: Vec<&str> = stale_sources.iter().map(|s| s.source.as_str()).collect();
        (
            HealthStatus::Warning,
            format!(
                "{} of {} sources stale: {}",
                stale_sources.len(),
                latest.len(),
                names.join(", ")
            ),
        )
    };

    StaleDataCheck {
        status,
        threshold_hours,
        stale_sources,
        last_ingestion_by_source: latest,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn latest(ages_hours: &[(&str, i64)], now: DateTime<Utc>) -> BTreeMap<String, DateTime<Utc>> {
        ages_hours
            .iter()
            .map(|(s, h)| (s.to_string(), now - Duration::hours(*h)))
            .collect()
    }

    #[test]
    fn test_no_successes_is_warning() {
        let check = evaluate(BTreeMap::new(), Utc::now(), 24);
        assert_eq!(check.status, HealthStatus::Warning);
        assert!(check.stale_sources.is_empty());
    }

    #[test]
    fn test_some_stale_is_warning() {
        let now = Utc::now();
        let check = evaluate(latest(&[("serper", 2), ("open_street_map", 30)], now), now, 24);
        assert_eq!(check.status, HealthStatus::Warning);
        assert_eq!(check.stale_sources.len(), 1);
        assert_eq!(check.stale_sources[0].source, "open_street_map");
        assert_eq!(check.stale_sources[0].hours_since, 30.0);
        assert_eq!(check.last_ingestion_by_source.len(), 2);
    }

    #[test]
    fn test_all_stale_is_critical() {
        let now = Utc::now();
        let check = evaluate(latest(&[("serper", 25), ("google_places", 48)], now), now, 24);
        assert_eq!(check.status, HealthStatus::Critical);
        assert_eq!(check.stale_sources.len(), 2);
    }

    #[test]
    fn test_exactly_at_threshold_is_fresh() {
        let now = Utc::now();
        let check = evaluate(latest(&[("serper", 24)], now), now, 24);
        assert_eq!(check.status, HealthStatus::Healthy);
    }
}
