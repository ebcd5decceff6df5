//! Health Metrics
//!
//! Latest status of each probe and of the overall check, encoded as
//! 0 = healthy, 1 = warning, 2 = critical.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::health::HealthStatus;

pub struct HealthMetrics;

impl HealthMetrics {
    pub fn record_probe(probe: &'static str, status: HealthStatus) {
        ::metrics::gauge!(
            phase_metric!(gauge, "health", "probe_status"),
            "probe" => probe
        )
        .set(status.gauge_value());
    }

    pub fn record_overall(status: HealthStatus) {
        ::metrics::gauge!(phase_metric!(gauge, "health", "overall_status"))
            .set(status.gauge_value());
        ::metrics::counter!(phase_metric!(counter, "health", "checks")).increment(1);
    }
}

impl PhaseMetrics for HealthMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = gauge!(phase_metric!(gauge, "health", "probe_status"));
        let _ = gauge!(phase_metric!(gauge, "health", "overall_status"));
        let _ = counter!(phase_metric!(counter, "health", "checks"));
        let _ = histogram!(phase_metric!(histogram, "health", "check_duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "health"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(gauge, "health", "probe_status"),
                metric_type: MetricType::Gauge,
                help: "Latest status of each health probe (0 healthy, 1 warning, 2 critical)",
                labels: vec!["probe"],
            },
            MetricDoc {
                name: phase_metric!(gauge, "health", "overall_status"),
                metric_type: MetricType::Gauge,
                help: "Worst status across all health probes",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "health", "checks"),
                metric_type: MetricType::Counter,
                help: "Completed full health checks",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "health", "check_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time taken by a full health check in seconds",
                labels: vec![],
            },
        ]
    }
}
