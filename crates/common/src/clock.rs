//! Clock and timing utilities for playback and capture synchronization.
//!
//! Everything in the playback loop reads time through the [`Clock`] trait:
//! - [`MonotonicClock`] for real sessions, anchored at creation
//! - [`ManualClock`] for deterministic tests, advanced explicitly
//!
//! [`RateController`] paces frame capture and [`DriftMeasurement`] compares
//! the audio and video streams of a finished export.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic nanosecond timestamps.
pub trait Clock: Send + Sync {
    /// Nanoseconds since the clock's epoch.
    fn now_ns(&self) -> u64;
}

/// A monotonic clock anchored to the moment it was created.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    /// The instant the clock started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl MonotonicClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the epoch.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at the epoch.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Convert a nanosecond value to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }

    /// Convert seconds to nanoseconds.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs * 1_000_000_000.0) as u64
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) -> u64 {
        self.now_ns
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst)
            + by.as_nanos() as u64
    }

    /// Jump to an absolute timestamp.
    pub fn set_ns(&self, ns: u64) {
        self.now_ns.store(ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Fixed-rate tick pacing for frame capture.
///
/// Ticks are scheduled on a fixed grid so a slightly late render callback
/// does not push every later frame back. A call up to half an interval
/// ahead of its grid point still fires, so a render loop running at the
/// capture rate with jitter captures every tick. After a stall longer than
/// one interval the grid restarts at the current time instead of bursting.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        let Some(last) = self.last_tick_ns else {
            self.last_tick_ns = Some(current_ns);
            return true;
        };
        let next = last.saturating_add(self.target_interval_ns);
        if current_ns.saturating_add(self.target_interval_ns / 2) < next {
            return false;
        }
        self.last_tick_ns = if current_ns.saturating_sub(next) >= self.target_interval_ns {
            Some(current_ns)
        } else {
            Some(next)
        };
        true
    }

    /// Forget the tick grid; the next call fires immediately.
    pub fn reset(&mut self) {
        self.last_tick_ns = None;
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.target_interval_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_elapsed() {
        let clock = MonotonicClock::start();
        assert!(clock.now_ns() < 1_000_000_000);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_ns_to_secs_conversion() {
        assert!((MonotonicClock::ns_to_secs(1_500_000_000) - 1.5).abs() < 1e-9);
        assert_eq!(MonotonicClock::secs_to_ns(2.0), 2_000_000_000);
    }

    #[test]
    fn test_manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_ns(), 0);
        assert_eq!(clock.advance(Duration::from_millis(16)), 16_000_000);
        assert_eq!(clock.now_ns(), 16_000_000);
        clock.set_ns(5);
        assert_eq!(clock.now_ns(), 5);
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            reference_ns: 1_000_000_000,
            measured_ns: 1_050_000_000,
        };
        assert_eq!(drift.drift_ns(), 50_000_000);
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
        assert!(drift.exceeds_threshold_ms(10.0));
        assert!(!drift.exceeds_threshold_ms(100.0));
    }

    #[test]
    fn test_rate_controller() {
        let mut ctrl = RateController::new(60);
        assert!(ctrl.should_tick(0)); // first tick always fires
        assert!(!ctrl.should_tick(1_000_000)); // 1ms later, too soon
        assert!(ctrl.should_tick(17_000_000)); // ~17ms later, should fire (60Hz ~ 16.67ms)
    }

    #[test]
    fn test_rate_controller_keeps_grid_when_ticks_are_late() {
        // 30 fps driven by a 60 Hz render loop with jitter yields ~30 ticks per second.
        let mut ctrl = RateController::new(30);
        let ticks = (0..60u64)
            .map(|i| i * 16_666_667 + (i % 3) * 1_000_000)
            .filter(|&t| ctrl.should_tick(t))
            .count();
        assert!((29..=31).contains(&ticks), "got {ticks} ticks");
    }

    #[test]
    fn test_rate_controller_matches_render_rate_with_jitter() {
        // 60 fps on a 60 Hz loop whose first tick is 2ms late and whose
        // later ticks wander by up to 2ms either way.
        let mut ctrl = RateController::new(60);
        let ticks = (0..600u64)
            .map(|i| i * 16_666_667 + ((i * 7 + 2) % 3) * 1_000_000)
            .filter(|&t| ctrl.should_tick(t))
            .count();
        assert!(ticks >= 590, "got {ticks} of 600 ticks");
    }

    #[test]
    fn test_rate_controller_never_fires_twice_per_interval() {
        let mut ctrl = RateController::new(24);
        let fired: Vec<u64> = (0..600u64)
            .map(|i| i * 16_666_667 + ((i * 7 + 2) % 3) * 1_000_000)
            .filter(|&t| ctrl.should_tick(t))
            .collect();
        // 10s of ticks at 24 fps.
        assert!((239..=241).contains(&fired.len()), "got {}", fired.len());
        assert!(fired
            .windows(2)
            .all(|w| w[1] - w[0] >= ctrl.interval_ns() / 2));
    }

    #[test]
    fn test_rate_controller_resyncs_after_stall() {
        let mut ctrl = RateController::new(30);
        assert!(ctrl.should_tick(0));
        assert!(ctrl.should_tick(1_000_000_000));
        // No burst of catch-up ticks after the stall.
        assert!(!ctrl.should_tick(1_001_000_000));
        ctrl.reset();
        assert!(ctrl.should_tick(1_002_000_000));
    }
}
