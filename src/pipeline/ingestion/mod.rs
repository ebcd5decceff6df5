// Pipeline ingestion: per-source rate limiting, retry with backoff, and the registry tying them to config

pub mod guard;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

// Re-export key types and functions for external use
pub use guard::{guarded_call, wait_for_admission, SourceGuard};
pub use rate_limiter::{Limits, RateLimiter};
pub use registry::RateLimiterRegistry;
pub use retry::{RetryExecutor, RetryPolicy, Retrying};
