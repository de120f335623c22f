//! Moving-average transfer speed and ETA.

use std::time::{Duration, Instant};

/// Minimum time between two speed samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Smoothed speed estimator.
///
/// The first sample becomes the baseline; each later sample is
/// folded in as `(3 * old + instant) / 4`. Samples closer together than
/// [`SAMPLE_INTERVAL`] are ignored.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    last_instant: Instant,
    last_bytes: u64,
    speed: Option<u64>,
}

impl SpeedEstimator {
    /// Create an estimator whose reference point is `(bytes, now)`.
    pub fn new(bytes: u64, now: Instant) -> Self {
        Self {
            last_instant: now,
            last_bytes: bytes,
            speed: None,
        }
    }

    /// Record the total byte count observed at `now`.
    ///
    /// Returns true when the speed was recomputed.
    pub fn sample(&mut self, bytes: u64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_instant);
        if elapsed < SAMPLE_INTERVAL {
            return false;
        }

        let delta = bytes.saturating_sub(self.last_bytes) as u128;
        let instant = (delta * 1000 / elapsed.as_millis().max(1)) as u64;
        self.speed = Some(match self.speed {
            None => instant,
            Some(old) => (old.saturating_mul(3).saturating_add(instant)) / 4,
        });
        self.last_instant = now;
        self.last_bytes = bytes;
        true
    }

    /// Current smoothed speed in bytes per second.
    pub fn speed(&self) -> Option<u64> {
        self.speed
    }

    /// Time left to reach `total` from `read` at the current speed.
    pub fn eta(&self, total: u64, read: u64) -> Option<Duration> {
        let speed = self.speed.filter(|s| *s > 0)?;
        let remaining = total.saturating_sub(read) as u128;
        let millis = remaining * 1000 / speed as u128;
        Some(Duration::from_millis(millis.min(u64::MAX as u128) as u64))
    }
}
