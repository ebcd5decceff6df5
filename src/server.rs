use crate::metrics;
use crate::pipeline::health::{HealthAggregator, HealthStatus, SummaryReporter};
use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use hyper::Server;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Health check endpoint. Critical overall status answers 503 so load
/// balancers and uptime checks can act on the code alone.
async fn health(Extension(aggregator): Extension<HealthAggregator>) -> Response {
    let report = aggregator.check_health().await;
    let code = match report.status {
        HealthStatus::Critical => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Warning => StatusCode::OK,
    };
    (code, Json(report)).into_response()
}

/// Plain-text summary report
async fn summary_text(Extension(aggregator): Extension<HealthAggregator>) -> Response {
    let reporter = SummaryReporter::new(aggregator);
    match reporter.generate_summary_report().await {
        Ok(report) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            reporter.format_summary_report(&report),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to build summary report: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Structured summary report
async fn summary_json(Extension(aggregator): Extension<HealthAggregator>) -> Response {
    let reporter = SummaryReporter::new(aggregator);
    match reporter.generate_summary_report().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!("Failed to build summary report: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Prometheus text exposition. Empty until the recorder is installed.
async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render().unwrap_or_default(),
    )
}

/// Create the HTTP router with the health and metrics routes
pub fn create_server(aggregator: HealthAggregator) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/health/summary", get(summary_text))
        .route("/health/report", get(summary_json))
        .route("/metrics", get(prometheus_metrics))
        .layer(Extension(aggregator))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(
    aggregator: HealthAggregator,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_server(aggregator);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{port}");
    info!("Health check:   http://localhost:{port}/health");
    info!("Summary report: http://localhost:{port}/health/summary");
    info!("Metrics:        http://localhost:{port}/metrics");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
