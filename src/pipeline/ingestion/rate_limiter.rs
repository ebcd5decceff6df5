use crate::clock::{system_clock, Clock};
use crate::error::{RateLimitExceeded, RateWindow};
use crate::metrics::RateLimiterMetrics;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Smallest wait reported while a request is blocked. An entry exactly one
/// window old still counts, so the computed wait can round down to zero.
const MIN_BLOCKED_WAIT: std::time::Duration = std::time::Duration::from_millis(1);

/// The log is trimmed to the widest window we ever count.
const RETENTION: RateWindow = RateWindow::PerHour;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub requests_per_minute: Option<u32>,
    pub requests_per_hour: Option<u32>,
}

impl Limits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Configured limits in the order they are checked.
    fn configured(&self) -> impl Iterator<Item = (RateWindow, u32)> {
        [
            self.requests_per_minute.map(|l| (RateWindow::PerMinute, l)),
            self.requests_per_hour.map(|l| (RateWindow::PerHour, l)),
        ]
        .into_iter()
        .flatten()
    }
}

/// Sliding-window admission control for a single source.
///
/// Request timestamps live in an append-only log, oldest first. Every read
/// prunes entries older than an hour from the front; per-window counts are a
/// binary search over what remains. The whole prune/check/append sequence runs
/// under one mutex, so concurrent callers on the same source see linearizable
/// admission.
pub struct RateLimiter {
    source: String,
    limits: Limits,
    clock: Arc<dyn Clock>,
    request_log: Mutex<VecDeque<DateTime<Utc>>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("source", &self.source)
            .field("limits", &self.limits)
            .field("logged", &self.lock().len())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(source: impl Into<String>, limits: Limits) -> Self {
        Self::with_clock(source, limits, system_clock())
    }

    pub fn with_clock(source: impl Into<String>, limits: Limits, clock: Arc<dyn Clock>) -> Self {
        Self {
            source: source.into(),
            limits,
            clock,
            request_log: Mutex::new(VecDeque::new()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DateTime<Utc>>> {
        // Plain timestamps; a poisoned lock is still usable
        self.request_log.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn prune(log: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(RETENTION.seconds());
        while log.front().is_some_and(|ts| *ts < cutoff) {
            log.pop_front();
        }
    }

    /// Index of the first entry inside `window`, counted back from `now`.
    fn window_start(log: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: RateWindow) -> usize {
        let cutoff = now - Duration::seconds(window.seconds());
        log.partition_point(|ts| *ts < cutoff)
    }

    fn count_in(log: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: RateWindow) -> usize {
        log.len() - Self::window_start(log, now, window)
    }

    /// First violated limit, minute window before hour window.
    fn violation(&self, log: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> Option<(RateWindow, u32)> {
        self.limits
            .configured()
            .find(|(window, limit)| Self::count_in(log, now, *window) >= *limit as usize)
    }

    fn push(log: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        // Keep the log non-decreasing even if the clock steps backwards.
        let ts = log.back().map_or(now, |last| (*last).max(now));
        log.push_back(ts);
    }

    /// True iff every configured limit has room for one more request.
    pub fn can_make_request(&self) -> bool {
        let now = self.clock.now();
        let mut log = self.lock();
        Self::prune(&mut log, now);
        self.violation(&log, now).is_none()
    }

    /// Log one admitted external call. Call exactly once per real request.
    pub fn record_request(&self) {
        let now = self.clock.now();
        let mut log = self.lock();
        Self::prune(&mut log, now);
        Self::push(&mut log, now);
        debug!(source = %self.source, in_last_hour = log.len(), "recorded request");
    }

    /// Check and record in one critical section.
    pub fn try_acquire(&self) -> Result<(), RateLimitExceeded> {
        let now = self.clock.now();
        let mut log = self.lock();
        Self::prune(&mut log, now);
        if let Some((window, limit)) = self.violation(&log, now) {
            drop(log);
            warn!(source = %self.source, window = %window, limit, "rate limit exceeded");
            RateLimiterMetrics::record_denied(&self.source, window);
            return Err(RateLimitExceeded {
                source_name: self.source.clone(),
                window,
                limit,
            });
        }
        Self::push(&mut log, now);
        drop(log);
        RateLimiterMetrics::record_admitted(&self.source);
        Ok(())
    }

    /// Run `op` only if admission is granted right now. Admission is recorded
    /// before `op` starts; a denied call never runs and is never recorded.
    pub async fn guard<F, Fut, T>(&self, op: F) -> Result<T, RateLimitExceeded>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.try_acquire()?;
        Ok(op().await)
    }

    pub fn get_request_count_last_minute(&self) -> usize {
        self.count_for(RateWindow::PerMinute)
    }

    pub fn get_request_count_last_hour(&self) -> usize {
        self.count_for(RateWindow::PerHour)
    }

    fn count_for(&self, window: RateWindow) -> usize {
        let now = self.clock.now();
        let mut log = self.lock();
        Self::prune(&mut log, now);
        Self::count_in(&log, now, window)
    }

    /// How long until the oldest entry of a violated window expires.
    ///
    /// Zero when a request is admissible now. With several violated windows
    /// this is the smallest of their waits, so a caller may still be denied
    /// after sleeping it off and must re-check admission.
    pub fn get_time_until_next_request(&self) -> std::time::Duration {
        let now = self.clock.now();
        let mut log = self.lock();
        Self::prune(&mut log, now);

        let wait = self
            .limits
            .configured()
            .filter_map(|(window, limit)| {
                let start = Self::window_start(&log, now, window);
                if log.len() - start < limit as usize {
                    return None;
                }
                let window_len = Duration::seconds(window.seconds());
                // Entries ahead of `now` (clock stepped back) never push
                // the wait past one window
                Some(match log.get(start) {
                    Some(oldest) => (window_len - (now - *oldest)).min(window_len),
                    None => window_len,
                })
            })
            .min();

        match wait {
            None => std::time::Duration::ZERO,
            Some(w) => w
                .to_std()
                .unwrap_or(std::time::Duration::ZERO)
                .max(MIN_BLOCKED_WAIT),
        }
    }

    /// Forget every recorded request. Test isolation only.
    pub fn reset(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(per_minute: Option<u32>, per_hour: Option<u32>) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::default();
        let rl = RateLimiter::with_clock(
            "test",
            Limits {
                requests_per_minute: per_minute,
                requests_per_hour: per_hour,
            },
            Arc::new(clock.clone()),
        );
        (rl, clock)
    }

    #[test]
    fn test_minute_limit_blocks_then_recovers() {
        let (rl, clock) = limiter(Some(5), None);
        for _ in 0..5 {
            assert!(rl.can_make_request());
            rl.record_request();
        }
        assert!(!rl.can_make_request());
        assert_eq!(rl.get_request_count_last_minute(), 5);

        clock.advance(Duration::seconds(61));
        assert!(rl.can_make_request());
        assert_eq!(rl.get_request_count_last_minute(), 0);
        assert_eq!(rl.get_request_count_last_hour(), 5);
    }

    #[test]
    fn test_entry_exactly_one_window_old_still_counts() {
        let (rl, clock) = limiter(Some(1), None);
        rl.record_request();
        clock.advance(Duration::seconds(60));
        assert!(!rl.can_make_request());
        assert_eq!(rl.get_time_until_next_request(), MIN_BLOCKED_WAIT);

        clock.advance(Duration::milliseconds(1));
        assert!(rl.can_make_request());
    }

    #[test]
    fn test_hour_limit_is_independent_of_minute_limit() {
        let (rl, clock) = limiter(Some(100), Some(2));
        rl.record_request();
        clock.advance(Duration::seconds(90));
        rl.record_request();
        clock.advance(Duration::seconds(90));

        assert_eq!(rl.get_request_count_last_minute(), 0);
        assert!(!rl.can_make_request());
        let err = rl.try_acquire().unwrap_err();
        assert_eq!(err.window, RateWindow::PerHour);
        assert_eq!(err.limit, 2);
    }

    #[test]
    fn test_unlimited_never_blocks() {
        let (rl, _clock) = limiter(None, None);
        for _ in 0..250 {
            assert!(rl.can_make_request());
            rl.record_request();
        }
        assert_eq!(rl.get_time_until_next_request(), std::time::Duration::ZERO);
        assert_eq!(rl.get_request_count_last_hour(), 250);
    }

    #[test]
    fn test_wait_hint_matches_admission() {
        let (rl, clock) = limiter(Some(2), Some(10));
        assert_eq!(rl.get_time_until_next_request(), std::time::Duration::ZERO);

        rl.record_request();
        clock.advance(Duration::seconds(20));
        rl.record_request();
        assert!(!rl.can_make_request());

        // Oldest entry is 20s old, so it leaves the minute window in 40s.
        assert_eq!(
            rl.get_time_until_next_request(),
            std::time::Duration::from_secs(40)
        );

        clock.advance(Duration::seconds(41));
        assert!(rl.can_make_request());
        assert_eq!(rl.get_time_until_next_request(), std::time::Duration::ZERO);
    }

    #[test]
    fn test_wait_hint_is_minimum_across_violated_windows() {
        let (rl, clock) = limiter(Some(1), Some(1));
        rl.record_request();
        clock.advance(Duration::seconds(30));

        // Minute window frees up in 30s, hour window in 3570s.
        let wait = rl.get_time_until_next_request();
        assert_eq!(wait, std::time::Duration::from_secs(30));

        clock.advance(Duration::seconds(31));
        // Past the hint, but the hour window still blocks.
        assert!(!rl.can_make_request());
        let wait = rl.get_time_until_next_request();
        assert!(wait > std::time::Duration::ZERO);
        assert!(wait <= std::time::Duration::from_secs(3600));
    }

    #[test]
    fn test_try_acquire_records_only_on_success() {
        let (rl, _clock) = limiter(Some(1), None);
        assert!(rl.try_acquire().is_ok());
        assert!(rl.try_acquire().is_err());
        assert!(rl.try_acquire().is_err());
        assert_eq!(rl.get_request_count_last_minute(), 1);
    }

    #[test]
    fn test_backwards_clock_keeps_log_ordered() {
        let (rl, clock) = limiter(Some(2), None);
        rl.record_request();
        clock.advance(Duration::seconds(-5));
        rl.record_request();
        {
            let log = rl.lock();
            assert!(log.iter().zip(log.iter().skip(1)).all(|(a, b)| a <= b));
        }

        // Both entries sit ahead of the clock; the wait stays within a window
        clock.advance(Duration::seconds(-30));
        assert!(!rl.can_make_request());
        assert_eq!(
            rl.get_time_until_next_request(),
            std::time::Duration::from_secs(60)
        );
    }

    #[test]
    fn test_reset_clears_history() {
        let (rl, _clock) = limiter(Some(1), None);
        rl.record_request();
        assert!(!rl.can_make_request());
        rl.reset();
        assert!(rl.can_make_request());
    }

    #[tokio::test]
    async fn test_guard_skips_operation_when_blocked() {
        let (rl, _clock) = limiter(Some(1), None);
        let first = rl.guard(|| async { "fetched" }).await;
        assert_eq!(first.unwrap(), "fetched");

        let mut ran = false;
        let second = rl
            .guard(|| {
                ran = true;
                async {}
            })
            .await;
        assert!(second.is_err());
        assert!(!ran);
    }
}
