//! Package integrity checking.
//!
//! The registry treats verification as a black box behind
//! [`PackageVerifier`]. [`verify_package`] wraps a verifier with the
//! side effects the registry relies on: a failed package is deleted, a good
//! one is made readable for the installer.

use std::fs::{self, File};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, warn};
use zip::ZipArchive;

/// Why a package was rejected.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a valid archive: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("entry {entry} of {path} is corrupt: {reason}")]
    Entry {
        path: PathBuf,
        entry: String,
        reason: String,
    },

    #[error("package rejected: {0}")]
    Rejected(String),
}

/// Checks a downloaded package.
pub trait PackageVerifier: Send + Sync {
    fn verify(&self, path: &Path) -> Result<(), VerifyError>;
}

/// Result of [`verify_package`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    Failed,
}

/// Accepts any readable zip archive whose entries all pass their CRC check.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveVerifier;

impl PackageVerifier for ArchiveVerifier {
    fn verify(&self, path: &Path) -> Result<(), VerifyError> {
        let file = File::open(path).map_err(|e| VerifyError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut archive = ZipArchive::new(file).map_err(|e| VerifyError::Archive {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(|e| VerifyError::Archive {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let name = entry.name().to_string();
            io::copy(&mut entry, &mut io::sink()).map_err(|e| VerifyError::Entry {
                path: path.to_path_buf(),
                entry: name,
                reason: e.to_string(),
            })?;
        }

        debug!(path = %path.display(), entries = archive.len(), "Archive verified");
        Ok(())
    }
}

/// Run `verifier` on `path`, deleting the file when it fails.
///
/// Errors and panics of the verifier both count as failure.
pub fn verify_package(verifier: &dyn PackageVerifier, path: &Path) -> VerifyOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| verifier.verify(path)));
    match result {
        Ok(Ok(())) => {
            if let Err(e) = make_world_readable(path) {
                warn!(path = %path.display(), error = %e, "Could not adjust package permissions");
            }
            VerifyOutcome::Ok
        }
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Package verification failed");
            remove_rejected(path);
            VerifyOutcome::Failed
        }
        Err(_) => {
            error!(path = %path.display(), "Package verifier panicked");
            remove_rejected(path);
            VerifyOutcome::Failed
        }
    }
}

fn remove_rejected(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!(path = %path.display(), error = %e, "Could not delete rejected package"),
    }
}

/// Add read permission for group and others.
#[cfg(unix)]
pub(crate) fn make_world_readable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o044);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
pub(crate) fn make_world_readable(path: &Path) -> io::Result<()> {
    fs::metadata(path).map(|_| ())
}
