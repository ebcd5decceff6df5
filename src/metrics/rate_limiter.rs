//! Rate Limiter Metrics
//!
//! Admission decisions per source.

use crate::error::RateWindow;
use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct RateLimiterMetrics;

impl RateLimiterMetrics {
    pub fn record_admitted(source: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "rate_limiter", "admitted"),
            "source" => source.to_string()
        )
        .increment(1);
    }

    pub fn record_denied(source: &str, window: RateWindow) {
        ::metrics::counter!(
            phase_metric!(counter, "rate_limiter", "denied"),
            "source" => source.to_string(),
            "window" => window.as_str()
        )
        .increment(1);
    }
}

impl PhaseMetrics for RateLimiterMetrics {
    fn register_metrics() {
        use metrics::counter;

        let _ = counter!(phase_metric!(counter, "rate_limiter", "admitted"));
        let _ = counter!(phase_metric!(counter, "rate_limiter", "denied"));
    }

    fn phase_name() -> &'static str {
        "rate_limiter"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "rate_limiter", "admitted"),
                metric_type: MetricType::Counter,
                help: "Requests admitted and recorded by a source rate limiter",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(counter, "rate_limiter", "denied"),
                metric_type: MetricType::Counter,
                help: "Requests denied because a sliding window was full",
                labels: vec!["source", "window"],
            },
        ]
    }
}
