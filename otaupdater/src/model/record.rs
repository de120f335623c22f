//! The per-update record owned by the registry.

use std::path::PathBuf;
use std::time::Duration;

use super::descriptor::UpdateDescriptor;
use super::status::{PersistentStatus, UpdateStatus};

/// Fixed id given to a locally imported package.
pub const LOCAL_ID: &str = "local";

/// Everything the client knows about one update package.
///
/// Records are owned by the registry. Callers get clones; mutation only
/// happens through registry methods.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecord {
    /// Stable unique identifier.
    pub id: String,
    /// Package file name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Release channel.
    pub release_type: String,
    /// Build time in seconds since the epoch.
    pub build_timestamp: i64,
    /// Download location, empty for local-only records.
    pub download_url: String,
    /// Expected package size. May grow once the server reports a length.
    pub expected_size: u64,
    /// Bytes currently written to `file_path`.
    pub bytes_on_disk: u64,
    /// Destination of the package, once chosen.
    pub file_path: Option<PathBuf>,
    /// Runtime status.
    pub status: UpdateStatus,
    /// Durable status.
    pub persistent_status: PersistentStatus,
    /// Download progress, 0-100.
    pub progress_percent: u8,
    /// Install progress, 0-100.
    pub install_progress_percent: u8,
    /// Smoothed transfer speed in bytes per second, if established.
    pub speed: Option<u64>,
    /// Estimated time to completion, if known.
    pub eta: Option<Duration>,
    /// Whether the remote catalog currently lists this update.
    pub available_online: bool,
    /// True during the finalizing phase of a block-based install.
    pub is_finalizing: bool,
}

impl UpdateRecord {
    /// Create an empty record for `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            version: String::new(),
            release_type: String::new(),
            build_timestamp: 0,
            download_url: String::new(),
            expected_size: 0,
            bytes_on_disk: 0,
            file_path: None,
            status: UpdateStatus::Unknown,
            persistent_status: PersistentStatus::Unknown,
            progress_percent: 0,
            install_progress_percent: 0,
            speed: None,
            eta: None,
            available_online: false,
            is_finalizing: false,
        }
    }

    /// Build a fresh record from a catalog descriptor.
    pub fn from_descriptor(descriptor: &UpdateDescriptor) -> Self {
        let mut record = Self::new(descriptor.id.clone());
        record.refresh_from(descriptor);
        record
    }

    /// Copy descriptive metadata from a newer descriptor of the same update.
    ///
    /// The expected size only ever grows.
    pub fn refresh_from(&mut self, descriptor: &UpdateDescriptor) {
        self.name = descriptor.name.clone();
        self.version = descriptor.version.clone();
        self.release_type = descriptor.release_type.clone();
        self.build_timestamp = descriptor.build_timestamp;
        self.download_url = descriptor.download_url.clone();
        self.expected_size = self.expected_size.max(descriptor.size);
    }

    /// Whether the record can only come from a local file.
    pub fn is_local_only(&self) -> bool {
        self.download_url.is_empty()
    }

    /// Progress of `bytes` against the expected size, rounded.
    pub fn percent_of(bytes: u64, total: u64) -> u8 {
        if total == 0 {
            return 0;
        }
        let percent = (bytes as f64 * 100.0 / total as f64).round();
        percent.clamp(0.0, 100.0) as u8
    }

    /// Drop transfer telemetry.
    pub fn clear_telemetry(&mut self) {
        self.speed = None;
        self.eta = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_descriptor() {
        let descriptor = UpdateDescriptor::new("rom-42", "rom-42.zip", "https://example.com/rom-42.zip")
            .with_size(1000)
            .with_version("21.0")
            .with_timestamp(1_700_000_000);
        let record = UpdateRecord::from_descriptor(&descriptor);

        assert_eq!(record.id, "rom-42");
        assert_eq!(record.expected_size, 1000);
        assert_eq!(record.status, UpdateStatus::Unknown);
        assert_eq!(record.persistent_status, PersistentStatus::Unknown);
        assert!(record.file_path.is_none());
        assert!(!record.is_local_only());
    }

    #[test]
    fn test_refresh_never_lowers_size() {
        let mut record = UpdateRecord::new("a");
        record.expected_size = 5000;
        record.refresh_from(&UpdateDescriptor::new("a", "a.zip", "https://x/a.zip").with_size(10));
        assert_eq!(record.expected_size, 5000);
        assert_eq!(record.download_url, "https://x/a.zip");
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(UpdateRecord::percent_of(0, 0), 0);
        assert_eq!(UpdateRecord::percent_of(500, 1000), 50);
        assert_eq!(UpdateRecord::percent_of(999, 1000), 100);
        assert_eq!(UpdateRecord::percent_of(2000, 1000), 100);
    }
}
