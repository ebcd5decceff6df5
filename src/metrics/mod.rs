//! Centralized metrics infrastructure for the ingestion layer
//!
//! Each component defines its own metrics in a dedicated submodule, ensuring
//! clear ownership and preventing naming conflicts. Recording is a no-op
//! until [`init_metrics`] installs the Prometheus recorder.

pub mod core;
pub mod health;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

// Re-export the metrics structs for easier importing
pub use health::HealthMetrics;
pub use rate_limiter::RateLimiterMetrics;
pub use retry::RetryMetrics;

use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Initialize the global metrics infrastructure
///
/// Idempotent. Installs a Prometheus recorder and registers all component
/// metrics. The handle is kept for in-process rendering (`GET /metrics`).
pub fn init_metrics() {
    INIT.call_once(|| {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        match builder.install_recorder() {
            Ok(handle) => {
                if HANDLE.set(handle).is_err() {
                    warn!("METRICS: Failed to store handle in OnceLock (already set?)");
                }
                info!("Prometheus recorder installed");

                // Register everything up front to detect naming conflicts early
                registry::register_all_metrics();
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
            }
        }
    });
}

/// Prometheus text exposition of everything recorded so far.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Trait for component-specific metrics collections
///
/// Each component implements this trait to provide:
/// - Metric registration at startup
/// - Consistent naming conventions
/// - Documentation of what each metric measures
pub trait PhaseMetrics {
    /// Register all metrics for this component
    fn register_metrics();

    /// Get the phase name for prefixing metrics
    fn phase_name() -> &'static str;

    /// Get documentation for all metrics in this component
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    #[allow(dead_code)]
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Macro to create phase-specific metric names with consistent naming
///
/// This ensures all metrics follow the naming convention:
/// venue_{phase}_{metric_name}[_total]
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("venue_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("venue_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("venue_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_naming_convention() {
        assert_eq!(
            phase_metric!(counter, "rate_limiter", "admitted"),
            "venue_rate_limiter_admitted_total"
        );
        assert_eq!(
            phase_metric!(histogram, "retry", "backoff_seconds"),
            "venue_retry_backoff_seconds"
        );
        assert_eq!(
            phase_metric!(gauge, "health", "overall_status"),
            "venue_health_overall_status"
        );
    }
}
