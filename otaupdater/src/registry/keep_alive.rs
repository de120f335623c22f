//! Host keep-alive while transfers run.

/// Keeps the host awake (wake lock, inhibitor, ...).
///
/// The registry calls `acquire` when the first transfer starts and
/// `release` when the last one stops, never twice in a row.
pub trait KeepAlive: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

/// Keep-alive for hosts that need none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopKeepAlive;

impl KeepAlive for NoopKeepAlive {
    fn acquire(&self) {}

    fn release(&self) {}
}
