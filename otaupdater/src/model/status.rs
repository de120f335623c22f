//! Runtime and persistent status enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Runtime status of an update.
///
/// Only lives in memory. After a restart it is reconstructed from
/// [`PersistentStatus`] and the state of the file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateStatus {
    /// Known, nothing downloaded yet.
    #[default]
    Unknown,
    /// Transfer spawned, waiting for the server response.
    Starting,
    /// Response headers received, body streaming to disk.
    Downloading,
    /// Stopped by the user (or found partially downloaded at startup).
    Paused,
    /// Stopped by a transfer error.
    PausedError,
    /// Removed by the user but still advertised by the catalog.
    Deleted,
    /// Package integrity check in progress.
    Verifying,
    /// Package downloaded and verified.
    Verified,
    /// Integrity check failed; the file has been deleted.
    VerificationFailed,
    /// An installer is applying the package.
    Installing,
    /// Installation finished, reboot pending.
    Installed,
    /// Installation failed.
    InstallationFailed,
    /// Installation cancelled by the user.
    InstallationCancelled,
    /// Block-based installation suspended.
    InstallationSuspended,
}

impl UpdateStatus {
    /// Human-readable name for the status.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "available",
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::PausedError => "paused (error)",
            Self::Deleted => "deleted",
            Self::Verifying => "verifying",
            Self::Verified => "verified",
            Self::VerificationFailed => "verification failed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::InstallationFailed => "installation failed",
            Self::InstallationCancelled => "installation cancelled",
            Self::InstallationSuspended => "installation suspended",
        }
    }

    /// Whether a transfer for the update is in flight.
    pub fn is_transferring(&self) -> bool {
        matches!(self, Self::Starting | Self::Downloading)
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The durable part of an update's state.
///
/// Stored as a numeric code so that rows written by older versions keep
/// loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PersistentStatus {
    /// Nothing usable on disk.
    #[default]
    Unknown,
    /// A partial download exists.
    Incomplete,
    /// The package on disk passed verification.
    Verified,
}

impl PersistentStatus {
    /// Numeric code used in the store.
    pub fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Incomplete => 1,
            Self::Verified => 2,
        }
    }

    /// Parse a numeric store code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Incomplete),
            2 => Some(Self::Verified),
            _ => None,
        }
    }
}

impl From<PersistentStatus> for u8 {
    fn from(status: PersistentStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for PersistentStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("invalid persistent status code {}", code))
    }
}
