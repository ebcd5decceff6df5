//! Metrics registry for coordinating component metrics
//!
//! Registers every component's metrics and detects naming conflicts early.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{info, warn};

/// Register all metrics from all components
pub fn register_all_metrics() -> usize {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::rate_limiter::RateLimiterMetrics>(&mut all_metrics);
    register_phase_metrics::<super::retry::RetryMetrics>(&mut all_metrics);
    register_phase_metrics::<super::health::HealthMetrics>(&mut all_metrics);

    info!(
        "Registered {} total metrics across all components",
        all_metrics.len()
    );

    if std::env::var("VENUE_METRICS_DEBUG").is_ok() {
        log_metrics_summary(&all_metrics);
    }
    all_metrics.len()
}

/// Register metrics for a specific component and detect conflicts
fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<String, MetricDoc>) {
    T::register_metrics();
    let phase_name = T::phase_name();

    for doc in T::metrics_documentation() {
        if let Some(existing) = all_metrics.get(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' ({}) redefined by phase '{}'",
                doc.name, existing.help, phase_name
            );
        } else {
            all_metrics.insert(doc.name.to_string(), doc);
        }
    }
}

fn log_metrics_summary(all_metrics: &HashMap<String, MetricDoc>) {
    let mut by_phase: HashMap<&str, Vec<&MetricDoc>> = HashMap::new();
    for doc in all_metrics.values() {
        by_phase
            .entry(extract_phase_from_metric_name(doc.name))
            .or_default()
            .push(doc);
    }

    for (phase, metrics) in by_phase {
        info!("Phase '{}': {} metrics", phase, metrics.len());
        for metric in metrics {
            info!("  - {} ({:?}): {}", metric.name, metric.metric_type, metric.help);
        }
    }
}

/// Extract the component from a metric name, e.g.
/// "venue_retry_attempts_total" -> "retry". Component names may contain
/// underscores, so match against the known set.
fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    const PHASES: [&str; 3] = ["rate_limiter", "retry", "health"];
    metric_name
        .strip_prefix("venue_")
        .and_then(|rest| {
            PHASES
                .iter()
                .find(|p| rest.starts_with(&format!("{}_", p)))
                .copied()
        })
        .unwrap_or("unknown")
}
