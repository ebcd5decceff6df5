use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use venue_ingest::config::Config;
use venue_ingest::constants;
use venue_ingest::logging;
use venue_ingest::metrics;
use venue_ingest::pipeline::health::{HealthAggregator, HealthStatus, SummaryReporter};
use venue_ingest::pipeline::ingestion::RateLimiterRegistry;
use venue_ingest::pipeline::storage::SqliteIngestionLog;
use venue_ingest::server;

#[derive(Parser)]
#[command(name = "venue-ingest")]
#[command(about = "Rate limits, retries and source health for venue data ingestion")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all health probes and print the result as JSON
    Health,
    /// Print the ingestion summary report
    Report {
        /// Print the structured report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show configured rate limits and retry policy per source
    Limits,
    /// Serve health, report and metrics endpoints over HTTP
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

fn build_aggregator(config: &Config) -> Result<HealthAggregator> {
    let root = Config::data_root();
    let log = SqliteIngestionLog::open_at_root(&root)
        .with_context(|| format!("opening ingestion log under '{}'", root.display()))?;
    Ok(HealthAggregator::new(Arc::new(log)).with_thresholds(config.health.clone()))
}

fn fmt_limit(limit: Option<u32>) -> String {
    limit
        .map(|l| l.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_limits(config: Config) {
    let registry = RateLimiterRegistry::new(config);

    let mut names: BTreeSet<String> = registry.sources().into_iter().collect();
    names.extend(constants::get_known_sources().into_iter().map(String::from));

    println!(
        "{:<20} {:>8} {:>8} {:>9} {:>12}",
        "SOURCE", "PER MIN", "PER HOUR", "ATTEMPTS", "WORST WAIT"
    );
    for name in names {
        let cfg = registry.source_config(&name);
        let limits = cfg.limits();
        let policy = cfg.retry_policy();
        println!(
            "{:<20} {:>8} {:>8} {:>9} {:>11.1}s",
            name,
            fmt_limit(limits.requests_per_minute),
            fmt_limit(limits.requests_per_hour),
            policy.total_attempts(),
            policy.worst_case_delay().as_secs_f64()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load().context("loading source configuration")?;

    match cli.command {
        Commands::Health => {
            let aggregator = build_aggregator(&config)?;
            let report = aggregator.check_health().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status == HealthStatus::Critical {
                warn!("Overall health is critical");
                std::process::exit(2);
            }
        }
        Commands::Report { json } => {
            let reporter = SummaryReporter::new(build_aggregator(&config)?);
            let report = reporter
                .generate_summary_report()
                .await
                .context("building summary report")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", reporter.format_summary_report(&report));
            }
        }
        Commands::Limits => print_limits(config),
        Commands::Serve { port } => {
            metrics::init_metrics();
            let aggregator = build_aggregator(&config)?;
            info!("Starting health server on port {}", port);
            server::start_server(aggregator, port)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        }
    }
    Ok(())
}
