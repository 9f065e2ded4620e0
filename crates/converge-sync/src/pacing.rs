//! Cycle pacing.
//!
//! The engine exposes a desired interval between cycles as a function of
//! observed local activity and measured prior-cycle latency. When either
//! rises the interval grows to shed load; when both fall it shrinks to
//! reduce perceived staleness.

use std::time::Duration;

/// EWMA weight given to history when folding in a new activity sample.
const ACTIVITY_SMOOTHING: f64 = 0.5;

/// Commits-per-cycle at which activity load reaches one half.
const ACTIVITY_SCALE: f64 = 32.0;

/// Derives the interval to the next cycle from recent measurements.
#[derive(Clone, Debug)]
pub struct CyclePacer {
    min_interval: Duration,
    max_interval: Duration,
    timeout: Duration,
    activity: f64,
    last_latency: Option<Duration>,
}

impl CyclePacer {
    #[must_use]
    pub fn new(min_interval: Duration, max_interval: Duration, timeout: Duration) -> Self {
        Self {
            min_interval,
            max_interval,
            timeout,
            activity: 0.0,
            last_latency: None,
        }
    }

    /// Fold in one completed cycle: its end-to-end latency and how many new
    /// commits it moved.
    pub fn observe(&mut self, latency: Duration, new_commits: u64) {
        self.activity = ACTIVITY_SMOOTHING * self.activity
            + (1.0 - ACTIVITY_SMOOTHING) * new_commits as f64;
        self.last_latency = Some(latency);
    }

    /// The desired interval before the next cycle.
    #[must_use]
    pub fn interval(&self) -> Duration {
        let latency_load = self
            .last_latency
            .map(|latency| {
                (latency.as_secs_f64() / self.timeout.as_secs_f64()).clamp(0.0, 1.0)
            })
            .unwrap_or(0.0);

        let activity_load = self.activity / (self.activity + ACTIVITY_SCALE);

        // Either signal alone is enough to slow down.
        let load = latency_load.max(activity_load);

        self.min_interval + (self.max_interval - self.min_interval).mul_f64(load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacer() -> CyclePacer {
        CyclePacer::new(
            Duration::from_secs(5),
            Duration::from_secs(300),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_idle_pacer_runs_at_min_interval() {
        assert_eq!(pacer().interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_rising_latency_stretches_interval() {
        let mut pacer = pacer();

        pacer.observe(Duration::from_secs(1), 0);
        let quick = pacer.interval();

        pacer.observe(Duration::from_secs(20), 0);
        let slow = pacer.interval();

        assert!(slow > quick);
    }

    #[test]
    fn test_rising_activity_stretches_interval() {
        let mut pacer = pacer();

        pacer.observe(Duration::from_millis(100), 0);
        let idle = pacer.interval();

        pacer.observe(Duration::from_millis(100), 500);
        let busy = pacer.interval();

        assert!(busy > idle);
    }

    #[test]
    fn test_interval_recovers_when_both_signals_fall() {
        let mut pacer = pacer();

        pacer.observe(Duration::from_secs(25), 1_000);
        let stressed = pacer.interval();

        for _ in 0..8 {
            pacer.observe(Duration::from_millis(50), 0);
        }
        let relaxed = pacer.interval();

        assert!(relaxed < stressed);
        assert!(relaxed < Duration::from_secs(10));
    }

    #[test]
    fn test_interval_stays_within_bounds() {
        let mut pacer = pacer();
        pacer.observe(Duration::from_secs(3_600), u64::MAX / 2);

        assert!(pacer.interval() <= Duration::from_secs(300));
        assert!(pacer.interval() >= Duration::from_secs(5));
    }
}
