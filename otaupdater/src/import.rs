//! Importing a package the user already has on disk.
//!
//! The package is copied into the download directory as
//! [`LOCAL_FILE_NAME`], verified like a downloaded one and registered
//! under [`LOCAL_ID`] as a verified, offline-only update.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use thiserror::Error;
use tracing::{info, warn};

use crate::install::read_metadata_timestamp;
use crate::model::{PersistentStatus, UpdateRecord, UpdateStatus, LOCAL_ID};
use crate::registry::{remove_if_exists, UpdateRegistry};
use crate::verify::{verify_package, VerifyOutcome};

/// File name of an imported package inside the download directory.
pub const LOCAL_FILE_NAME: &str = "localUpdate.zip";

/// Display name of an imported package.
pub const LOCAL_UPDATE_NAME: &str = "Local update";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to copy {source_path} to {destination}: {source}")]
    Copy {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("package {0} failed verification and was deleted")]
    Verification(PathBuf),

    #[error("the local update is in use")]
    Busy,
}

/// Import `source` as the local update.
///
/// Replaces a previous local update. The copy is deleted if it does not
/// verify.
pub fn import_local_package(
    registry: &UpdateRegistry,
    source: &Path,
) -> Result<UpdateRecord, ImportError> {
    if registry.is_downloading(LOCAL_ID)
        || registry.is_verifying(LOCAL_ID)
        || registry.is_installing(LOCAL_ID)
    {
        return Err(ImportError::Busy);
    }

    let destination = registry.download_dir().join(LOCAL_FILE_NAME);
    remove_if_exists(&destination);
    let size = fs::copy(source, &destination).map_err(|e| ImportError::Copy {
        source_path: source.to_path_buf(),
        destination: destination.clone(),
        source: e,
    })?;

    if verify_package(registry.verifier(), &destination) == VerifyOutcome::Failed {
        return Err(ImportError::Verification(destination));
    }

    let timestamp = package_timestamp(&destination);
    let record = local_record(destination, size, timestamp);
    if !registry.add_local_update(record.clone()) {
        if let Some(path) = record.file_path.as_deref() {
            remove_if_exists(path);
        }
        return Err(ImportError::Busy);
    }
    info!(path = %source.display(), size, "Imported local package");
    Ok(record)
}

/// Build timestamp from the package metadata, or now.
fn package_timestamp(path: &Path) -> i64 {
    match read_metadata_timestamp(path) {
        Ok(Some(timestamp)) => timestamp,
        Ok(None) => {
            warn!(path = %path.display(), "No timestamp in package metadata, using current time");
            chrono::Utc::now().timestamp()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read package metadata, using current time");
            chrono::Utc::now().timestamp()
        }
    }
}

fn local_record(path: PathBuf, size: u64, timestamp: i64) -> UpdateRecord {
    let build_date = DateTime::from_timestamp(timestamp, 0)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    let mut record = UpdateRecord::new(LOCAL_ID);
    record.name = LOCAL_UPDATE_NAME.to_string();
    record.version = format!("{LOCAL_UPDATE_NAME} ({build_date})");
    record.build_timestamp = timestamp;
    record.expected_size = size;
    record.bytes_on_disk = size;
    record.file_path = Some(path);
    record.status = UpdateStatus::Verified;
    record.persistent_status = PersistentStatus::Verified;
    record.progress_percent = 100;
    record.available_online = false;
    record
}
