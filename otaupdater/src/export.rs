//! Exporting a verified package out of the download directory.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::install::{copy_with_progress, InstallError};
use crate::model::PersistentStatus;
use crate::registry::UpdateRegistry;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown update '{0}'")]
    UnknownUpdate(String),

    #[error("update '{0}' has no verified package")]
    NotVerified(String),

    #[error("{0} is the package itself")]
    SamePath(PathBuf),

    #[error("export cancelled")]
    Cancelled,

    #[error("failed to copy the package: {0}")]
    Copy(#[source] InstallError),
}

/// Copy the verified package of `id` to `destination`.
///
/// A directory destination receives the package under its own file name.
/// `on_progress` gets whole percentages as in
/// [`copy_with_progress`]. A cancelled or failed export leaves no partial
/// file behind. Returns where the package was written.
pub fn export_update(
    registry: &UpdateRegistry,
    id: &str,
    destination: &Path,
    cancel: &CancellationToken,
    on_progress: &mut dyn FnMut(u8),
) -> Result<PathBuf, ExportError> {
    let record = registry
        .get_update(id)
        .ok_or_else(|| ExportError::UnknownUpdate(id.to_string()))?;
    let source = match record.file_path {
        Some(path) if record.persistent_status == PersistentStatus::Verified => path,
        _ => return Err(ExportError::NotVerified(id.to_string())),
    };

    let target = export_target(&source, destination);
    if is_same_file(&source, &target) {
        return Err(ExportError::SamePath(target));
    }

    copy_with_progress(&source, &target, cancel, on_progress).map_err(|e| match e {
        InstallError::Cancelled => ExportError::Cancelled,
        e => ExportError::Copy(e),
    })?;
    info!(id, destination = %target.display(), "Exported package");
    Ok(target)
}

fn export_target(source: &Path, destination: &Path) -> PathBuf {
    match source.file_name() {
        Some(name) if destination.is_dir() => destination.join(name),
        _ => destination.to_path_buf(),
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_target_keeps_file_name() {
        let dir = TempDir::new().unwrap();
        let source = Path::new("/data/updates/rom-42.zip");
        assert_eq!(export_target(source, dir.path()), dir.path().join("rom-42.zip"));

        let file = dir.path().join("backup.zip");
        assert_eq!(export_target(source, &file), file);
    }

    #[test]
    fn test_same_file_through_another_path() {
        let dir = TempDir::new().unwrap();
        let package = dir.path().join("rom.zip");
        fs::write(&package, b"pkg").unwrap();
        let detour = dir.path().join(".").join("rom.zip");

        assert!(is_same_file(&package, &detour));
        assert!(!is_same_file(&package, &dir.path().join("other.zip")));
    }
}
