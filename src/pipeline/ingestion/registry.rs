use crate::clock::{system_clock, Clock};
use crate::config::{Config, SourceConfig};
use crate::pipeline::ingestion::guard::SourceGuard;
use crate::pipeline::ingestion::rate_limiter::RateLimiter;
use crate::pipeline::ingestion::retry::RetryExecutor;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// One shared [`RateLimiter`] per source name for the life of the process.
///
/// Limiters are created on first lookup from the source's configuration.
/// Hand the registry (usually behind an `Arc`) to every call site that talks
/// to an external source.
pub struct RateLimiterRegistry {
    config: Config,
    clock: Arc<dyn Clock>,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<RateLimiter>>> {
        self.limiters.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Get or create the limiter for `source`.
    pub fn get(&self, source: &str) -> Arc<RateLimiter> {
        let mut limiters = self.lock();
        if let Some(existing) = limiters.get(source) {
            return Arc::clone(existing);
        }
        let limits = self.config.source(source).limits();
        info!(
            source,
            per_minute = ?limits.requests_per_minute,
            per_hour = ?limits.requests_per_hour,
            "creating rate limiter"
        );
        let limiter = Arc::new(RateLimiter::with_clock(
            source,
            limits,
            Arc::clone(&self.clock),
        ));
        limiters.insert(source.to_string(), Arc::clone(&limiter));
        limiter
    }

    pub fn source_config(&self, source: &str) -> SourceConfig {
        self.config.source(source)
    }

    pub fn retry_executor(&self, source: &str) -> RetryExecutor {
        RetryExecutor::for_source(source, self.config.source(source).retry_policy())
    }

    /// Limiter and retry executor for `source`, ready for guarded calls.
    pub fn guard_for(&self, source: &str) -> SourceGuard {
        SourceGuard::new(self.get(source), self.retry_executor(source))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Names of sources that have a limiter, sorted.
    pub fn sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every limiter. Test isolation only; call sites holding an old
    /// `Arc` keep their (now detached) limiter.
    pub fn reset(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pipeline::ingestion::rate_limiter::Limits;
    use std::thread;

    fn registry() -> RateLimiterRegistry {
        let config = Config::from_toml_str(
            "[sources.serper]\nrequests_per_minute = 3\n\n[sources.google_places]\nrequests_per_hour = 10\n",
        )
        .unwrap();
        RateLimiterRegistry::with_clock(config, Arc::new(ManualClock::default()))
    }

    #[test]
    fn test_same_source_returns_same_instance() {
        let reg = registry();
        let a = reg.get("serper");
        let b = reg.get("serper");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.limits().requests_per_minute, Some(3));

        let other = reg.get("google_places");
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(other.limits().requests_per_hour, Some(10));
    }

    #[test]
    fn test_unconfigured_source_is_unlimited() {
        let reg = registry();
        assert_eq!(reg.get("open_charge_map").limits(), &Limits::unlimited());
        assert_eq!(reg.retry_executor("open_charge_map").policy().max_retries, 3);
        assert!(!reg.config().sources.contains_key("open_charge_map"));
        assert_eq!(reg.source_config("open_charge_map"), SourceConfig::default());
    }

    #[test]
    fn test_concurrent_get_or_create_yields_one_limiter() {
        let reg = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || reg.get("serper"))
            })
            .collect();
        let limiters: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(limiters.iter().all(|l| Arc::ptr_eq(l, &limiters[0])));
        assert_eq!(reg.sources(), vec!["serper".to_string()]);
    }

    #[test]
    fn test_concurrent_acquire_never_over_admits() {
        let reg = Arc::new(registry());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || reg.get("serper").try_acquire().is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_reset_forgets_limiters() {
        let reg = registry();
        reg.get("serper").record_request();
        reg.reset();
        assert!(reg.sources().is_empty());
        assert_eq!(reg.get("serper").get_request_count_last_minute(), 0);
    }
}
