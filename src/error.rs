use std::fmt;
use thiserror::Error;

/// Ambient failures of the ingestion layer: configuration, the ingestion log
/// store, and (de)serialization.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ingestion log store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid ingestion record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Which sliding window denied admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    PerMinute,
    PerHour,
}

impl RateWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateWindow::PerMinute => "per_minute",
            RateWindow::PerHour => "per_hour",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            RateWindow::PerMinute => 60,
            RateWindow::PerHour => 3600,
        }
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission denied by a source's rate limiter. Recoverable: wait
/// `RateLimiter::get_time_until_next_request()` and try again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rate limit exceeded for {source_name}: {limit} requests {window}")]
pub struct RateLimitExceeded {
    pub source_name: String,
    pub window: RateWindow,
    pub limit: u32,
}

/// Every attempt failed. `source` is the error from the last attempt.
#[derive(Error, Debug)]
#[error("Max retries ({retries}) exceeded")]
pub struct MaxRetriesExceeded<E>
where
    E: std::error::Error + 'static,
{
    pub retries: u32,
    #[source]
    pub source: E,
}

impl<E> MaxRetriesExceeded<E>
where
    E: std::error::Error + 'static,
{
    /// The error returned by the final attempt.
    pub fn last_error(&self) -> &E {
        &self.source
    }

    pub fn into_inner(self) -> E {
        self.source
    }
}

/// Outcome of a call that went through admission and then retry.
/// The two variants need different recovery, so they are never merged.
#[derive(Error, Debug)]
pub enum GuardedCallError<E>
where
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error(transparent)]
    Exhausted(#[from] MaxRetriesExceeded<E>),
}
