//! Retry Metrics
//!
//! Attempts, retries and give-ups of the retry executor, plus how long it
//! slept between attempts.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use std::time::Duration;

pub struct RetryMetrics;

impl RetryMetrics {
    pub fn record_attempt(source: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "retry", "attempts"),
            "source" => source.to_string()
        )
        .increment(1);
    }

    pub fn record_retry(source: &str, delay: Duration) {
        ::metrics::counter!(
            phase_metric!(counter, "retry", "retries"),
            "source" => source.to_string()
        )
        .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "retry", "backoff_seconds"))
            .record(delay.as_secs_f64());
    }

    pub fn record_exhausted(source: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "retry", "exhausted"),
            "source" => source.to_string()
        )
        .increment(1);
    }
}

impl PhaseMetrics for RetryMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "retry", "attempts"));
        let _ = counter!(phase_metric!(counter, "retry", "retries"));
        let _ = counter!(phase_metric!(counter, "retry", "exhausted"));
        let _ = histogram!(phase_metric!(histogram, "retry", "backoff_seconds"));
    }

    fn phase_name() -> &'static str {
        "retry"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "retry", "attempts"),
                metric_type: MetricType::Counter,
                help: "Operation invocations made by the retry executor, first attempts included",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(counter, "retry", "retries"),
                metric_type: MetricType::Counter,
                help: "Failed attempts that were followed by another attempt",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(counter, "retry", "exhausted"),
                metric_type: MetricType::Counter,
                help: "Operations abandoned after every attempt failed",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "retry", "backoff_seconds"),
                metric_type: MetricType::Histogram,
                help: "Backoff delay before each retry in seconds",
                labels: vec![],
            },
        ]
    }
}
