//! Persistence of update metadata.
//!
//! Only what survives a restart is stored: identity, file location,
//! descriptive metadata and the [`PersistentStatus`]. Runtime status is
//! rebuilt from these rows when the registry starts.

mod json;
mod memory;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{PersistentStatus, UpdateRecord};

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Errors from a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed store {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One persisted update row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUpdate {
    pub id: String,
    pub path: PathBuf,
    pub timestamp: i64,
    #[serde(default)]
    pub release_type: String,
    #[serde(default)]
    pub version: String,
    pub size: u64,
    pub status: PersistentStatus,
}

impl StoredUpdate {
    /// Row for `record`, or `None` if it has no file yet.
    pub fn from_record(record: &UpdateRecord) -> Option<Self> {
        let path = record.file_path.clone()?;
        Some(Self {
            id: record.id.clone(),
            path,
            timestamp: record.build_timestamp,
            release_type: record.release_type.clone(),
            version: record.version.clone(),
            size: record.expected_size,
            status: record.persistent_status,
        })
    }

    /// Record rebuilt from this row, not yet reconciled with the disk.
    pub fn to_record(&self) -> UpdateRecord {
        let mut record = UpdateRecord::new(self.id.clone());
        record.name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        record.version = self.version.clone();
        record.release_type = self.release_type.clone();
        record.build_timestamp = self.timestamp;
        record.expected_size = self.size;
        record.file_path = Some(self.path.clone());
        record.persistent_status = self.status;
        record
    }
}

/// Durable storage of [`StoredUpdate`] rows.
///
/// `upsert` replaces any row with the same id.
pub trait UpdateStore: Send + Sync {
    fn upsert(&self, update: &StoredUpdate) -> Result<(), StoreError>;
    fn remove(&self, id: &str) -> Result<(), StoreError>;
    fn list_all(&self) -> Result<Vec<StoredUpdate>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_from_record_needs_path() {
        let record = UpdateRecord::new("a");
        assert!(StoredUpdate::from_record(&record).is_none());
    }

    #[test]
    fn test_row_record_round_trip_fields() {
        let mut record = UpdateRecord::new("rom-42");
        record.file_path = Some(PathBuf::from("/data/updates/rom-42.zip"));
        record.version = "21.0".to_string();
        record.release_type = "nightly".to_string();
        record.build_timestamp = 1_700_000_000;
        record.expected_size = 4096;
        record.persistent_status = PersistentStatus::Verified;

        let row = StoredUpdate::from_record(&record).unwrap();
        assert_eq!(row.status, PersistentStatus::Verified);
        assert_eq!(row.size, 4096);

        let rebuilt = row.to_record();
        assert_eq!(rebuilt.name, "rom-42.zip");
        assert_eq!(rebuilt.expected_size, 4096);
        assert_eq!(rebuilt.persistent_status, PersistentStatus::Verified);
        assert_eq!(rebuilt.status, crate::model::UpdateStatus::Unknown);
        assert!(!rebuilt.available_online);
    }

    #[test]
    fn test_status_serialized_as_code() {
        let row = StoredUpdate {
            id: "a".to_string(),
            path: PathBuf::from("/tmp/a.zip"),
            timestamp: 1,
            release_type: String::new(),
            version: String::new(),
            size: 10,
            status: PersistentStatus::Incomplete,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["status"], 1);
    }
}
