//! # Latency Tracking Module
//!
//! Sliding-window processing-time statistics for each ingestion path.
//!
//! ## Metrics
//! - p50 / p95: nearest rank `ceil(p * n)` over the sorted window (1-indexed)
//! - throughput: samples recorded during the last second
//!
//! Each tracker carries its own lock, so reading percentiles never waits on
//! the session engine and never holds up a producer for longer than a push.

use crate::timeseries::RollingWindow;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const THROUGHPUT_BUCKET: Duration = Duration::from_secs(1);

/// One timed operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub time: Instant,
    pub value: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyReport {
    pub samples: usize,
    pub p50: Duration,
    pub p95: Duration,
    pub max: Duration,
    /// Operations per second over the last one-second bucket
    pub throughput: usize,
}

#[derive(Debug)]
pub struct LatencyTracker {
    window: Mutex<RollingWindow<Point>>,
}

impl LatencyTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Mutex::new(RollingWindow::new(capacity)),
        }
    }

    pub fn record(&self, at: Instant, elapsed: Duration) {
        self.lock().push(Point { time: at, value: elapsed });
    }

    /// Run `f`, recording how long it took
    pub fn measure<T>(&self, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.record(Instant::now(), started.elapsed());
        out
    }

    pub fn p50(&self) -> Option<Duration> {
        percentile(&self.sorted_durations(), 0.50)
    }

    pub fn p95(&self) -> Option<Duration> {
        percentile(&self.sorted_durations(), 0.95)
    }

    /// Samples recorded in the second ending at `now`
    pub fn throughput(&self, now: Instant) -> usize {
        self.lock()
            .iter()
            .filter(|p| p.time <= now && now.duration_since(p.time) < THROUGHPUT_BUCKET)
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn report(&self, now: Instant) -> LatencyReport {
        // Copy out under the lock, sort outside it.
        let points = self.lock().to_vec();
        let mut durations: Vec<Duration> = points.iter().map(|p| p.value).collect();
        durations.sort_unstable();

        LatencyReport {
            samples: durations.len(),
            p50: percentile(&durations, 0.50).unwrap_or_default(),
            p95: percentile(&durations, 0.95).unwrap_or_default(),
            max: durations.last().copied().unwrap_or_default(),
            throughput: points
                .iter()
                .filter(|p| p.time <= now && now.duration_since(p.time) < THROUGHPUT_BUCKET)
                .count(),
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn sorted_durations(&self) -> Vec<Duration> {
        let mut durations: Vec<Duration> = self.lock().iter().map(|p| p.value).collect();
        durations.sort_unstable();
        durations
    }

    fn lock(&self) -> MutexGuard<'_, RollingWindow<Point>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Nearest-rank percentile of an ascending slice
fn percentile(sorted: &[Duration], p: f64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = ((p * n as f64).ceil() as usize).clamp(1, n);
    Some(sorted[rank - 1])
}

/// Which ingestion path a measurement belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Vision,
    Biometrics,
    Commands,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub vision: LatencyReport,
    pub biometrics: LatencyReport,
    pub commands: LatencyReport,
}

/// One tracker per ingestion path
#[derive(Debug)]
pub struct PerformanceMonitor {
    vision: LatencyTracker,
    biometrics: LatencyTracker,
    commands: LatencyTracker,
}

impl PerformanceMonitor {
    pub fn new(window: usize) -> Self {
        Self {
            vision: LatencyTracker::new(window),
            biometrics: LatencyTracker::new(window),
            commands: LatencyTracker::new(window),
        }
    }

    pub fn tracker(&self, channel: Channel) -> &LatencyTracker {
        match channel {
            Channel::Vision => &self.vision,
            Channel::Biometrics => &self.biometrics,
            Channel::Commands => &self.commands,
        }
    }

    pub fn report(&self, now: Instant) -> PerformanceReport {
        PerformanceReport {
            vision: self.vision.report(now),
            biometrics: self.biometrics.report(now),
            commands: self.commands.report(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_nearest_rank_percentiles() {
        let tracker = LatencyTracker::new(100);
        let now = Instant::now();
        for v in 1..=20 {
            tracker.record(now, ms(v));
        }
        // ceil(0.5 * 20) = 10, ceil(0.95 * 20) = 19
        assert_eq!(tracker.p50(), Some(ms(10)));
        assert_eq!(tracker.p95(), Some(ms(19)));
    }

    #[test]
    fn test_percentiles_ignore_insertion_order() {
        let tracker = LatencyTracker::new(10);
        let now = Instant::now();
        for v in [7, 1, 9, 3, 5] {
            tracker.record(now, ms(v));
        }
        // n = 5: p50 rank 3, p95 rank 5
        assert_eq!(tracker.p50(), Some(ms(5)));
        assert_eq!(tracker.p95(), Some(ms(9)));
    }

    #[test]
    fn test_single_sample_and_empty() {
        let tracker = LatencyTracker::new(10);
        assert_eq!(tracker.p50(), None);
        assert_eq!(tracker.report(Instant::now()), LatencyReport::default());

        tracker.record(Instant::now(), ms(4));
        assert_eq!(tracker.p50(), Some(ms(4)));
        assert_eq!(tracker.p95(), Some(ms(4)));
    }

    #[test]
    fn test_window_evicts_old_samples() {
        let tracker = LatencyTracker::new(3);
        let now = Instant::now();
        for v in [100, 100, 100, 1, 2, 3] {
            tracker.record(now, ms(v));
        }
        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.p95(), Some(ms(3)));
    }

    #[test]
    fn test_throughput_counts_last_second() {
        let tracker = LatencyTracker::new(100);
        let base = Instant::now();
        tracker.record(base, ms(1));
        tracker.record(base + ms(500), ms(1));
        tracker.record(base + ms(1_200), ms(1));
        tracker.record(base + ms(1_900), ms(1));

        let now = base + ms(2_000);
        assert_eq!(tracker.throughput(now), 2);

        let report = tracker.report(now);
        assert_eq!(report.throughput, 2);
        assert_eq!(report.samples, 4);
    }

    #[test]
    fn test_measure_records_sample() {
        let tracker = LatencyTracker::new(10);
        let value = tracker.measure(|| 41 + 1);
        assert_eq!(value, 42);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        use std::sync::Arc;
        use std::thread;

        let tracker = Arc::new(LatencyTracker::new(1_000));
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let tracker = tracker.clone();
                thread::spawn(move || {
                    for v in 0..100 {
                        tracker.record(Instant::now(), ms(v));
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            let _ = tracker.report(Instant::now());
        }
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(tracker.len(), 400);
    }

    #[test]
    fn test_monitor_routes_channels() {
        let monitor = PerformanceMonitor::new(10);
        let now = Instant::now();
        monitor.tracker(Channel::Vision).record(now, ms(5));
        monitor.tracker(Channel::Vision).record(now, ms(7));
        monitor.tracker(Channel::Commands).record(now, ms(1));

        let report = monitor.report(now);
        assert_eq!(report.vision.samples, 2);
        assert_eq!(report.vision.max, ms(7));
        assert_eq!(report.biometrics.samples, 0);
        assert_eq!(report.commands.samples, 1);
    }
}
