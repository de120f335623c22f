//! Configuration for the update registry.

use std::path::PathBuf;
use std::time::Duration;

/// Default minimum time between two progress events with equal percentage.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for the [`UpdateRegistry`](super::UpdateRegistry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory packages are downloaded to.
    ///
    /// Must be dedicated to packages: files no persisted row refers to are
    /// deleted at startup.
    pub download_dir: PathBuf,

    /// Directory for install markers.
    pub state_dir: PathBuf,

    /// Rate limit for progress events.
    pub progress_interval: Duration,

    /// Ask the block engine to favour speed over responsiveness.
    pub performance_mode: bool,

    /// Delete a package once the block engine applied it.
    pub auto_delete: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("otaupdater");
        Self {
            download_dir: base.join("updates"),
            state_dir: base.join("state"),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            performance_mode: false,
            auto_delete: false,
        }
    }
}

impl RegistryConfig {
    /// Create a configuration with the given download directory.
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            download_dir,
            ..Default::default()
        }
    }

    /// Set the state directory.
    pub fn with_state_dir(mut self, path: PathBuf) -> Self {
        self.state_dir = path;
        self
    }

    /// Set the progress event interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Enable or disable performance mode.
    pub fn with_performance_mode(mut self, enabled: bool) -> Self {
        self.performance_mode = enabled;
        self
    }

    /// Delete installed packages.
    pub fn with_auto_delete(mut self, enabled: bool) -> Self {
        self.auto_delete = enabled;
        self
    }
}
