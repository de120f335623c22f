//! Rate limiting of progress notifications.

use std::time::{Duration, Instant};

/// Decides whether a progress change is worth an event.
///
/// An event goes out when the percentage changed or `interval` passed
/// since the last one.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    last_percent: Option<u8>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            last_percent: None,
        }
    }

    pub fn should_emit(&mut self, percent: u8, now: Instant) -> bool {
        let changed = self.last_percent != Some(percent);
        let due = self
            .last_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if changed || due {
            self.last_emit = Some(now);
            self.last_percent = Some(percent);
            true
        } else {
            false
        }
    }
}
