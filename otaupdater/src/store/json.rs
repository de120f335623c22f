//! JSON file store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use super::{StoreError, StoredUpdate, UpdateStore};

/// Stores all rows as one JSON array.
///
/// Every change rewrites the file through a temporary sibling and a rename,
/// so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Use the file at `path`. It is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Vec<StoredUpdate>, StoreError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        serde_json::from_slice(&contents).map_err(|e| StoreError::Format {
            path: self.path.clone(),
            source: e,
        })
    }

    fn write_rows(&self, rows: &[StoredUpdate]) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_vec_pretty(rows).map_err(|e| StoreError::Format {
            path: self.path.clone(),
            source: e,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;
        debug!(path = %self.path.display(), rows = rows.len(), "Store written");
        Ok(())
    }
}

impl UpdateStore for JsonFileStore {
    fn upsert(&self, update: &StoredUpdate) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut rows = self.read_rows()?;
        match rows.iter_mut().find(|row| row.id == update.id) {
            Some(row) => *row = update.clone(),
            None => rows.push(update.clone()),
        }
        self.write_rows(&rows)
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut rows = self.read_rows()?;
        let before = rows.len();
        rows.retain(|row| row.id != id);
        if rows.len() == before {
            return Ok(());
        }
        self.write_rows(&rows)
    }

    fn list_all(&self) -> Result<Vec<StoredUpdate>, StoreError> {
        let _guard = self.lock.lock();
        self.read_rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersistentStatus;
    use tempfile::TempDir;

    fn row(id: &str, status: PersistentStatus) -> StoredUpdate {
        StoredUpdate {
            id: id.to_string(),
            path: PathBuf::from(format!("/data/{id}.zip")),
            timestamp: 1_700_000_000,
            release_type: "nightly".to_string(),
            version: "21.0".to_string(),
            size: 2048,
            status,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("updates.json"));
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_rows_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("updates.json");
        {
            let store = JsonFileStore::new(&path);
            store.upsert(&row("a", PersistentStatus::Incomplete)).unwrap();
            store.upsert(&row("b", PersistentStatus::Verified)).unwrap();
            store.upsert(&row("a", PersistentStatus::Verified)).unwrap();
        }

        let store = JsonFileStore::new(&path);
        let rows = store.list_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == PersistentStatus::Verified));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_remove_row() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("updates.json"));
        store.upsert(&row("a", PersistentStatus::Verified)).unwrap();
        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("updates.json");
        fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.list_all(), Err(StoreError::Format { .. })));
    }
}
