use super::{unavailable_message, HealthStatus, HealthThresholds};
use crate::error::IngestError;
use crate::pipeline::storage::IngestionRecord;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceQuota {
    pub requests_last_hour: usize,
    pub requests_last_day: usize,
    pub status: HealthStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiQuotaCheck {
    pub status: HealthStatus,
    pub quota_by_source: BTreeMap<String, SourceQuota>,
    pub message: String,
}

impl ApiQuotaCheck {
    pub(crate) fn unavailable(err: &IngestError) -> Self {
        Self {
            status: HealthStatus::Critical,
            quota_by_source: BTreeMap::new(),
            message: unavailable_message("API quota", err),
        }
    }
}

fn classify(hour: usize, day: usize, t: &HealthThresholds) -> HealthStatus {
    if hour > t.quota_critical_per_hour || day > t.quota_critical_per_day {
        HealthStatus::Critical
    } else if hour > t.quota_warning_per_hour || day > t.quota_warning_per_day {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Every record counts as one request, whatever its status. `records` must
/// cover at least the trailing 24 hours.
pub(crate) fn evaluate(
    records: &[IngestionRecord],
    now: DateTime<Utc>,
    thresholds: &HealthThresholds,
) -> ApiQuotaCheck {
    let hour_ago = now - Duration::hours(1);
    let day_ago = now - Duration::hours(24);

    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for r in records.iter().filter(|r| r.ingested_at >= day_ago) {
        let entry = counts.entry(r.source.clone()).or_default();
        entry.1 += 1;
        if r.ingested_at >= hour_ago {
            entry.0 += 1;
        }
    }

    let quota_by_source: BTreeMap<String, SourceQuota> = counts
        .into_iter()
        .map(|(source, (hour, day))| {
            let quota = SourceQuota {
                requests_last_hour: hour,
                requests_last_day: day,
                status: classify(hour, day, thresholds),
            };
            (source, quota)
        })
        .collect();

    let status = HealthStatus::worst(quota_by_source.values().map(|q| q.status));
    let flagged: Vec<String> = quota_by_source
        .iter()
        .filter(|(_, q)| q.status != HealthStatus::Healthy)
        .map(|(s, q)| format!("{} ({}/h, {}/day)", s, q.requests_last_hour, q.requests_last_day))
        .collect();

    let message = if quota_by_source.is_empty() {
        "No API traffic in the last 24h".to_string()
    } else if flagged.is_empty() {
        format!("{} sources within quota", quota_by_source.len())
    } else {
        format!("High request volume: {}", flagged.join(", "))
    };

    ApiQuotaCheck {
        status,
        quota_by_source,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::IngestionStatus;

    fn burst(source: &str, n: usize, age: Duration, now: DateTime<Utc>) -> Vec<IngestionRecord> {
        (0..n)
            .map(|_| {
                IngestionRecord::new(source, "u", IngestionStatus::Success, b"", now - age)
            })
            .collect()
    }

    #[test]
    fn test_no_traffic_is_healthy() {
        let check = evaluate(&[], Utc::now(), &HealthThresholds::default());
        assert_eq!(check.status, HealthStatus::Healthy);
        assert!(check.quota_by_source.is_empty());
    }

    #[test]
    fn test_hourly_thresholds() {
        let now = Utc::now();
        let t = HealthThresholds::default();

        let at_limit = burst("serper", 50, Duration::minutes(5), now);
        assert_eq!(evaluate(&at_limit, now, &t).status, HealthStatus::Healthy);

        let warn = burst("serper", 51, Duration::minutes(5), now);
        let check = evaluate(&warn, now, &t);
        assert_eq!(check.status, HealthStatus::Warning);
        assert_eq!(check.quota_by_source["serper"].requests_last_hour, 51);

        // Critical bounds are exclusive too
        let at_critical = burst("serper", 80, Duration::minutes(5), now);
        assert_eq!(evaluate(&at_critical, now, &t).status, HealthStatus::Warning);

        let crit = burst("serper", 81, Duration::minutes(5), now);
        assert_eq!(evaluate(&crit, now, &t).status, HealthStatus::Critical);
    }

    #[test]
    fn test_daily_critical_bound_is_exclusive() {
        let now = Utc::now();
        let t = HealthThresholds::default();

        let at_limit = burst("serper", 800, Duration::hours(3), now);
        let check = evaluate(&at_limit, now, &t);
        assert_eq!(check.quota_by_source["serper"].requests_last_day, 800);
        assert_eq!(check.status, HealthStatus::Warning);

        let over = burst("serper", 801, Duration::hours(3), now);
        assert_eq!(evaluate(&over, now, &t).status, HealthStatus::Critical);
    }

    #[test]
    fn test_daily_thresholds_and_per_source_flags() {
        let now = Utc::now();
        let t = HealthThresholds::default();
        let mut records = burst("google_places", 501, Duration::hours(5), now);
        records.extend(burst("open_street_map", 10, Duration::minutes(1), now));
        // Outside the day window; ignored.
        records.extend(burst("open_street_map", 900, Duration::hours(30), now));

        let check = evaluate(&records, now, &t);
        assert_eq!(check.status, HealthStatus::Warning);
        let places = &check.quota_by_source["google_places"];
        assert_eq!(places.requests_last_hour, 0);
        assert_eq!(places.requests_last_day, 501);
        assert_eq!(places.status, HealthStatus::Warning);
        assert_eq!(
            check.quota_by_source["open_street_map"].status,
            HealthStatus::Healthy
        );
        assert!(check.message.contains("google_places"));

        records.extend(burst("sport_scotland", 801, Duration::hours(2), now));
        assert_eq!(evaluate(&records, now, &t).status, HealthStatus::Critical);
    }
}
