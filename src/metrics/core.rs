//! Timing helpers shared by the component metrics.

use std::time::Instant;

/// A timing guard that automatically records duration when dropped
///
/// The duration is recorded to the named histogram when the guard goes out
/// of scope, including on early return.
pub struct TimingGuard {
    start: Instant,
    histogram_name: &'static str,
}

impl TimingGuard {
    pub fn new(histogram_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            histogram_name,
        }
    }

    /// Record now instead of at end of scope.
    pub fn finish(self) {
        // Drop does the recording
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        ::metrics::histogram!(self.histogram_name).record(duration);
    }
}

/// Convenience function to create a timing guard
///
/// ```ignore
/// let _timing = time_operation("venue_health_check_duration_seconds");
/// // ... do work ...
/// ```
pub fn time_operation(histogram_name: &'static str) -> TimingGuard {
    TimingGuard::new(histogram_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_timing_guard_basic() {
        let guard = time_operation("test_metric");
        thread::sleep(Duration::from_millis(5));
        guard.finish();
    }
}
