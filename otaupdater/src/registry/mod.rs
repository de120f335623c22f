//! Update registry.
//!
//! The registry owns every known update, persists the durable part of
//! each record and sequences downloads, verification and installation.
//! Consumers observe it through queries and [`UpdateEvent`]s.

mod config;
mod controller;
mod daemon;
mod events;
mod files;
mod keep_alive;
mod message;
mod progress;

pub use config::{RegistryConfig, DEFAULT_PROGRESS_INTERVAL};
pub use controller::{RegistryError, RegistryServices, UpdateRegistry};
pub use daemon::RegistryDaemon;
pub use events::{EventKind, UpdateEvent, EVENT_CHANNEL_CAPACITY};
pub use files::{cleanup_download_dir, unique_destination};
pub use keep_alive::{KeepAlive, NoopKeepAlive};
pub use progress::ProgressThrottle;

pub(crate) use files::remove_if_exists;
pub(crate) use message::{InstallChange, RegistryMessage};
