//! Ingestion statistics combined with the latest health snapshot, as a
//! structured report and as operator-facing text.

use super::failed::{recent_failures, FailureEntry};
use super::{HealthAggregator, OverallHealth};
use crate::constants::RECENT_FAILURES_LIMIT;
use crate::error::Result;
use crate::pipeline::storage::{IngestionRecord, IngestionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub total_ingestions: usize,
    pub successful: usize,
    pub failed: usize,
    pub pending: usize,
    pub success_rate: f64,
    pub first_ingestion: Option<DateTime<Utc>>,
    pub last_ingestion: Option<DateTime<Utc>>,
    pub distinct_sources: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub source: String,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub last_ingestion: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailureCount {
    pub source: String,
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBreakdown {
    pub total_failures: usize,
    /// Newest first.
    pub recent_failures: Vec<FailureEntry>,
    /// Most failures first.
    pub failures_by_source: Vec<SourceFailureCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub generated_at: DateTime<Utc>,
    pub overview: Overview,
    /// Busiest source first.
    pub sources: Vec<SourceBreakdown>,
    pub errors: ErrorBreakdown,
    pub health: OverallHealth,
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn overview(records: &[IngestionRecord]) -> Overview {
    let count = |s: IngestionStatus| records.iter().filter(|r| r.status == s).count();
    let successful = count(IngestionStatus::Success);
    let mut sources: Vec<&str> = records.iter().map(|r| r.source.as_str()).collect();
    sources.sort_unstable();
    sources.dedup();

    Overview {
        total_ingestions: records.len(),
        successful,
        failed: count(IngestionStatus::Failed),
        pending: count(IngestionStatus::Pending),
        success_rate: percent(successful, records.len()),
        first_ingestion: records.iter().map(|r| r.ingested_at).min(),
        last_ingestion: records.iter().map(|r| r.ingested_at).max(),
        distinct_sources: sources.len(),
    }
}

fn source_breakdown(records: &[IngestionRecord]) -> Vec<SourceBreakdown> {
    let mut by_source: BTreeMap<&str, SourceBreakdown> = BTreeMap::new();
    for r in records {
        let entry = by_source
            .entry(r.source.as_str())
            .or_insert_with(|| SourceBreakdown {
                source: r.source.clone(),
                total: 0,
                success: 0,
                failed: 0,
                success_rate: 0.0,
                last_ingestion: None,
            });
        entry.total += 1;
        match r.status {
            IngestionStatus::Success => entry.success += 1,
            IngestionStatus::Failed => entry.failed += 1,
            IngestionStatus::Pending => {}
        }
        entry.last_ingestion = entry.last_ingestion.max(Some(r.ingested_at));
    }

    let mut out: Vec<SourceBreakdown> = by_source
        .into_values()
        .map(|mut s| {
            s.success_rate = percent(s.success, s.total);
            s
        })
        .collect();
    // BTreeMap order makes the name tiebreak stable.
    out.sort_by(|a, b| b.total.cmp(&a.total));
    out
}

fn error_breakdown(records: &[IngestionRecord]) -> ErrorBreakdown {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for r in records.iter().filter(|r| r.status == IngestionStatus::Failed) {
        *counts.entry(r.source.as_str()).or_default() += 1;
    }
    let mut failures_by_source: Vec<SourceFailureCount> = counts
        .into_iter()
        .map(|(source, failures)| SourceFailureCount {
            source: source.to_string(),
            failures,
        })
        .collect();
    failures_by_source.sort_by(|a, b| b.failures.cmp(&a.failures));

    ErrorBreakdown {
        total_failures: failures_by_source.iter().map(|f| f.failures).sum(),
        recent_failures: recent_failures(records, RECENT_FAILURES_LIMIT),
        failures_by_source,
    }
}

pub fn build_report(
    records: &[IngestionRecord],
    health: OverallHealth,
    generated_at: DateTime<Utc>,
) -> SummaryReport {
    SummaryReport {
        generated_at,
        overview: overview(records),
        sources: source_breakdown(records),
        errors: error_breakdown(records),
        health,
    }
}

pub struct SummaryReporter {
    aggregator: HealthAggregator,
}

impl SummaryReporter {
    pub fn new(aggregator: HealthAggregator) -> Self {
        Self { aggregator }
    }

    /// Statistics over the whole log plus a fresh health check.
    ///
    /// Unlike the probes this can fail: without the records there is no
    /// report to give.
    pub async fn generate_summary_report(&self) -> Result<SummaryReport> {
        let records = self.aggregator.log().all_records().await?;
        let health = self.aggregator.check_health().await;
        Ok(build_report(&records, health, self.aggregator.now()))
    }

    pub fn format_summary_report(&self, report: &SummaryReport) -> String {
        format_summary_report(report)
    }
}

const RULE: &str = "======================================================================";
const SUBRULE: &str = "----------------------------------------------------------------------";

fn fmt_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", SUBRULE);
}

/// Render the report as plain text. Output depends only on the report.
pub fn format_summary_report(report: &SummaryReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "INGESTION SUMMARY REPORT");
    let _ = writeln!(out, "Generated: {}", fmt_ts(Some(report.generated_at)));
    let _ = writeln!(out, "{}", RULE);

    let o = &report.overview;
    section(&mut out, "OVERVIEW");
    if o.total_ingestions == 0 {
        let _ = writeln!(out, "No ingestions recorded.");
    } else {
        let _ = writeln!(out, "Total ingestions:  {}", o.total_ingestions);
        let _ = writeln!(out, "Successful:        {} ({:.1}%)", o.successful, o.success_rate);
        let _ = writeln!(out, "Failed:            {}", o.failed);
        let _ = writeln!(out, "Pending:           {}", o.pending);
        let _ = writeln!(out, "Distinct sources:  {}", o.distinct_sources);
        let _ = writeln!(out, "First ingestion:   {}", fmt_ts(o.first_ingestion));
        let _ = writeln!(out, "Last ingestion:    {}", fmt_ts(o.last_ingestion));
    }

    let h = &report.health;
    section(&mut out, "HEALTH");
    let _ = writeln!(out, "Overall status:    {}", h.status.as_str().to_uppercase());
    let _ = writeln!(
        out,
        "Failed ingestions: {} - {}",
        h.failed_ingestions.status.as_str().to_uppercase(),
        h.failed_ingestions.message
    );
    let _ = writeln!(
        out,
        "Stale data:        {} - {}",
        h.stale_data.status.as_str().to_uppercase(),
        h.stale_data.message
    );
    let _ = writeln!(
        out,
        "API quota:         {} - {}",
        h.api_quota.status.as_str().to_uppercase(),
        h.api_quota.message
    );

    section(&mut out, "SOURCES");
    if report.sources.is_empty() {
        let _ = writeln!(out, "No sources.");
    }
    for s in &report.sources {
        let _ = writeln!(
            out,
            "{:<20} total={:<6} success={:<6} failed={:<6} rate={:>5.1}%  last={}",
            s.source,
            s.total,
            s.success,
            s.failed,
            s.success_rate,
            fmt_ts(s.last_ingestion)
        );
    }

    let e = &report.errors;
    section(&mut out, "ERRORS");
    if e.total_failures == 0 {
        let _ = writeln!(out, "No failures recorded.");
    } else {
        let _ = writeln!(out, "Failures by source ({} total):", e.total_failures);
        for f in &e.failures_by_source {
            let _ = writeln!(out, "  {:<20} {}", f.source, f.failures);
        }
        let _ = writeln!(out, "Recent failures:");
        for f in &e.recent_failures {
            let _ = writeln!(
                out,
                "  {}  {:<20} {}",
                fmt_ts(Some(f.ingested_at)),
                f.source,
                f.source_url
            );
        }
    }

    out
}
