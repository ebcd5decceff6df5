use crate::constants;
use crate::error::MaxRetriesExceeded;
use crate::metrics::RetryMetrics;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Capped exponential backoff parameters. `max_retries` excludes the first
/// attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: constants::DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_secs_f64(constants::DEFAULT_INITIAL_DELAY_SECS),
            backoff_factor: constants::DEFAULT_BACKOFF_FACTOR,
            max_delay: Duration::from_secs_f64(constants::DEFAULT_MAX_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        backoff_factor: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_factor,
            max_delay,
        }
    }

    /// Wait before retry `retry` (0-based):
    /// `min(initial_delay * backoff_factor^retry, max_delay)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powf(retry as f64);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0)).min(self.max_delay)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Total time spent sleeping if every attempt fails. Time spent inside
    /// the operation itself comes on top of this.
    pub fn worst_case_delay(&self) -> Duration {
        (0..self.max_retries).map(|n| self.delay_for(n)).sum()
    }
}

/// Runs an async operation, retrying every failure with capped exponential
/// backoff until it succeeds or the policy runs out.
///
/// No error is treated as terminal: a request that can never succeed is
/// still replayed `max_retries` times. Callers that need to bail out early
/// should wrap the call in `tokio::time::timeout` (see
/// [`RetryPolicy::worst_case_delay`]).
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    label: String,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::for_source("operation", policy)
    }

    /// Executor whose logs and metrics are labelled with `source`.
    pub fn for_source(source: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            policy,
            label: source.into(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<T, MaxRetriesExceeded<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let mut retry: u32 = 0;
        loop {
            RetryMetrics::record_attempt(&self.label);
            match op().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!(source = %self.label, retries = retry, "operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) if retry >= self.policy.max_retries => {
                    warn!(
                        source = %self.label,
                        max_retries = self.policy.max_retries,
                        error = %err,
                        "giving up, all attempts failed"
                    );
                    RetryMetrics::record_exhausted(&self.label);
                    return Err(MaxRetriesExceeded {
                        retries: self.policy.max_retries,
                        source: err,
                    });
                }
                Err(err) => {
                    let delay = self.policy.delay_for(retry);
                    warn!(
                        source = %self.label,
                        attempt = retry + 1,
                        of = self.policy.total_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    RetryMetrics::record_retry(&self.label, delay);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    retry += 1;
                }
            }
        }
    }

    /// Bind an operation to this executor. Each `call` runs the whole retry
    /// loop with the given arguments.
    pub fn wrap<F>(self, op: F) -> Retrying<F> {
        Retrying { executor: self, op }
    }
}

/// An operation bound to a [`RetryExecutor`]; see [`RetryExecutor::wrap`].
pub struct Retrying<F> {
    executor: RetryExecutor,
    op: F,
}

impl<F> Retrying<F> {
    pub async fn call<A, Fut, T, E>(&mut self, args: A) -> Result<T, MaxRetriesExceeded<E>>
    where
        A: Clone,
        F: FnMut(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let Self { executor, op } = self;
        executor.run(|| op(args.clone())).await
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.executor.policy()
    }
}
