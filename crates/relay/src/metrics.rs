//! Delivery metrics.
//!
//! Every record goes to two places: an in-process table readable through
//! [`DispatchMetrics::snapshot`], and the `metrics` facade, where the binary
//! installs a Prometheus recorder.

use std::collections::HashMap;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use parking_lot::Mutex;

/// Messages handed to a provider for delivery (dry-run included).
pub const DISPATCHED_TOTAL: &str = "alerts_dispatched_total";
/// Messages whose delivery failed.
pub const DISPATCHED_ERRORS_TOTAL: &str = "alerts_dispatched_errors_total";
/// Wall time of each attempted send.
pub const DISPATCHED_DURATION_SECONDS: &str = "alerts_dispatched_duration_seconds";

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(DISPATCHED_TOTAL, "Alert messages dispatched to a provider");
    describe_counter!(
        DISPATCHED_ERRORS_TOTAL,
        "Alert messages that failed delivery"
    );
    describe_histogram!(
        DISPATCHED_DURATION_SECONDS,
        Unit::Seconds,
        "Time taken to deliver one alert message"
    );
}

/// Counters for one `(provider, room)` series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesStats {
    /// Messages dispatched.
    pub dispatched: u64,
    /// Messages that failed.
    pub errors: u64,
    /// Number of duration observations.
    pub sends: u64,
    /// Sum of observed durations.
    pub total_duration: Duration,
}

/// Dispatch metrics shared by every provider.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    series: Mutex<HashMap<(String, String), SeriesStats>>,
}

impl DispatchMetrics {
    /// Create an empty metrics table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a message handed to `provider` for `room`.
    pub fn record_dispatched(&self, provider: &str, room: &str) {
        self.update(provider, room, |stats| stats.dispatched += 1);
        counter!(DISPATCHED_TOTAL, "provider" => provider.to_string(), "room" => room.to_string())
            .increment(1);
    }

    /// Count a failed delivery.
    pub fn record_error(&self, provider: &str, room: &str) {
        self.update(provider, room, |stats| stats.errors += 1);
        counter!(DISPATCHED_ERRORS_TOTAL, "provider" => provider.to_string(), "room" => room.to_string())
            .increment(1);
    }

    /// Observe how long one send took.
    pub fn record_duration(&self, provider: &str, room: &str, elapsed: Duration) {
        self.update(provider, room, |stats| {
            stats.sends += 1;
            stats.total_duration += elapsed;
        });
        histogram!(DISPATCHED_DURATION_SECONDS, "provider" => provider.to_string(), "room" => room.to_string())
            .record(elapsed.as_secs_f64());
    }

    /// Current counters for a series. Unknown series read as zero.
    #[must_use]
    pub fn snapshot(&self, provider: &str, room: &str) -> SeriesStats {
        self.series
            .lock()
            .get(&(provider.to_string(), room.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn update(&self, provider: &str, room: &str, apply: impl FnOnce(&mut SeriesStats)) {
        let mut series = self.series.lock();
        let stats = series
            .entry((provider.to_string(), room.to_string()))
            .or_default();
        apply(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_series_is_zero() {
        let metrics = DispatchMetrics::new();
        assert_eq!(metrics.snapshot("google_chat", "ops"), SeriesStats::default());
    }

    #[test]
    fn test_series_are_isolated_by_room() {
        let metrics = DispatchMetrics::new();
        metrics.record_dispatched("google_chat", "ops");
        metrics.record_dispatched("google_chat", "ops");
        metrics.record_error("google_chat", "ops");
        metrics.record_dispatched("google_chat", "dev");

        let ops = metrics.snapshot("google_chat", "ops");
        assert_eq!(ops.dispatched, 2);
        assert_eq!(ops.errors, 1);

        let dev = metrics.snapshot("google_chat", "dev");
        assert_eq!(dev.dispatched, 1);
        assert_eq!(dev.errors, 0);
    }

    #[test]
    fn test_durations_accumulate() {
        let metrics = DispatchMetrics::new();
        metrics.record_duration("google_chat", "ops", Duration::from_millis(40));
        metrics.record_duration("google_chat", "ops", Duration::from_millis(60));

        let stats = metrics.snapshot("google_chat", "ops");
        assert_eq!(stats.sends, 2);
        assert_eq!(stats.total_duration, Duration::from_millis(100));
    }
}
