pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod server;

// Re-export the types connectors and operators use directly
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, SourceConfig};
pub use error::{
    GuardedCallError, IngestError, MaxRetriesExceeded, RateLimitExceeded, RateWindow, Result,
};
pub use pipeline::health::{HealthAggregator, HealthStatus, OverallHealth, SummaryReporter};
pub use pipeline::ingestion::{
    guarded_call, Limits, RateLimiter, RateLimiterRegistry, RetryExecutor, RetryPolicy,
    SourceGuard,
};
pub use pipeline::storage::{IngestionLog, IngestionRecord, IngestionStatus};
