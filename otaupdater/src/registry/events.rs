//! Change notifications for observers.

use tokio::sync::broadcast;

/// Capacity of the observer channel. Slow receivers see `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What changed about an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DownloadProgress,
    InstallProgress,
    StatusChanged,
    /// The update left the registry.
    Removed,
}

/// A change notification. Observers query the registry for details.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpdateEvent {
    pub kind: EventKind,
    pub id: String,
}

impl UpdateEvent {
    pub fn new(kind: EventKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

pub(crate) fn channel() -> broadcast::Sender<UpdateEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}
