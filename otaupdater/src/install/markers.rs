//! Install markers that must survive a restart.
//!
//! The block engine keeps running while this process is gone, so which
//! update it is applying (or has applied) is written next to the store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// File name of the marker file inside the state directory.
pub const MARKER_FILE: &str = "install_markers.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallMarkers {
    /// Update the block engine is applying.
    pub installing_id: Option<String>,
    /// Set while that installation is suspended.
    pub suspended_id: Option<String>,
    /// Update applied and waiting for a reboot.
    pub needs_reboot_id: Option<String>,
}

impl InstallMarkers {
    /// The active installation ended.
    ///
    /// On success the id moves to `needs_reboot_id`.
    pub fn installation_done(&mut self, needs_reboot: bool) {
        let finished = self.installing_id.take();
        self.suspended_id = None;
        if needs_reboot {
            self.needs_reboot_id = finished;
        }
    }
}

/// Loads and saves [`InstallMarkers`].
#[derive(Debug, Clone)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(MARKER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the markers. A missing or unreadable file yields no markers.
    pub fn load(&self) -> InstallMarkers {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed install markers");
                InstallMarkers::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => InstallMarkers::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read install markers");
                InstallMarkers::default()
            }
        }
    }

    pub fn save(&self, markers: &InstallMarkers) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(markers).map_err(io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_done_with_reboot_moves_id() {
        let mut markers = InstallMarkers {
            installing_id: Some("a".to_string()),
            suspended_id: Some("a".to_string()),
            needs_reboot_id: None,
        };
        markers.installation_done(true);
        assert_eq!(markers.installing_id, None);
        assert_eq!(markers.suspended_id, None);
        assert_eq!(markers.needs_reboot_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_done_without_reboot_drops_id() {
        let mut markers = InstallMarkers {
            installing_id: Some("a".to_string()),
            ..Default::default()
        };
        markers.installation_done(false);
        assert_eq!(markers, InstallMarkers::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let file = MarkerFile::new(dir.path());
        assert_eq!(file.load(), InstallMarkers::default());

        let markers = InstallMarkers {
            installing_id: Some("rom-42".to_string()),
            ..Default::default()
        };
        file.save(&markers).unwrap();
        assert_eq!(MarkerFile::new(dir.path()).load(), markers);
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let file = MarkerFile::new(dir.path());
        fs::write(file.path(), "nope").unwrap();
        assert_eq!(file.load(), InstallMarkers::default());
    }
}
