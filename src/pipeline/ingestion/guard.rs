//! Admission plus retry for one logical call to an external source.
//!
//! Admission is decided and recorded once, before the first attempt. Retries
//! of that call reuse the same admission, so the limiter counts logical calls
//! and never double-counts a retried one.

use crate::error::{GuardedCallError, RateLimitExceeded};
use crate::pipeline::ingestion::rate_limiter::RateLimiter;
use crate::pipeline::ingestion::retry::RetryExecutor;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub async fn guarded_call<F, Fut, T, E>(
    limiter: &RateLimiter,
    executor: &RetryExecutor,
    op: F,
) -> Result<T, GuardedCallError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    limiter.try_acquire()?;
    executor.run(op).await.map_err(GuardedCallError::from)
}

/// Keep asking for admission, sleeping for the limiter's wait hint in
/// between, until admitted or `max_wait` would be exceeded.
pub async fn wait_for_admission(
    limiter: &RateLimiter,
    max_wait: Duration,
) -> Result<(), RateLimitExceeded> {
    let mut waited = Duration::ZERO;
    loop {
        match limiter.try_acquire() {
            Ok(()) => return Ok(()),
            Err(denied) => {
                let hint = limiter.get_time_until_next_request();
                if waited + hint > max_wait {
                    return Err(denied);
                }
                debug!(
                    source = limiter.source(),
                    wait_ms = hint.as_millis() as u64,
                    "waiting for rate limit window"
                );
                tokio::time::sleep(hint).await;
                waited += hint;
            }
        }
    }
}

/// The limiter and retry executor belonging to one source.
#[derive(Debug, Clone)]
pub struct SourceGuard {
    limiter: Arc<RateLimiter>,
    executor: RetryExecutor,
}

impl SourceGuard {
    pub fn new(limiter: Arc<RateLimiter>, executor: RetryExecutor) -> Self {
        Self { limiter, executor }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Fail fast with `RateLimited` if the source is over its limits.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, GuardedCallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        guarded_call(&self.limiter, &self.executor, op).await
    }

    /// Like [`SourceGuard::call`], but waits up to `max_wait` for admission.
    pub async fn call_when_admitted<F, Fut, T, E>(
        &self,
        max_wait: Duration,
        op: F,
    ) -> Result<T, GuardedCallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        wait_for_admission(&self.limiter, max_wait).await?;
        self.executor.run(op).await.map_err(GuardedCallError::from)
    }
}
