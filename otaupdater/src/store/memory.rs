//! In-memory store, for tests and hosts without persistence.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::{StoreError, StoredUpdate, UpdateStore};

/// Keeps rows in a map; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, StoredUpdate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store.
    pub fn with_rows(rows: impl IntoIterator<Item = StoredUpdate>) -> Self {
        let store = Self::new();
        {
            let mut map = store.rows.lock();
            for row in rows {
                map.insert(row.id.clone(), row);
            }
        }
        store
    }

    /// Row for `id`, if any.
    pub fn get(&self, id: &str) -> Option<StoredUpdate> {
        self.rows.lock().get(id).cloned()
    }
}

impl UpdateStore for MemoryStore {
    fn upsert(&self, update: &StoredUpdate) -> Result<(), StoreError> {
        self.rows.lock().insert(update.id.clone(), update.clone());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.rows.lock().remove(id);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<StoredUpdate>, StoreError> {
        Ok(self.rows.lock().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersistentStatus;
    use std::path::PathBuf;

    fn row(id: &str, status: PersistentStatus) -> StoredUpdate {
        StoredUpdate {
            id: id.to_string(),
            path: PathBuf::from(format!("/tmp/{id}.zip")),
            timestamp: 0,
            release_type: String::new(),
            version: String::new(),
            size: 1,
            status,
        }
    }

    #[test]
    fn test_upsert_replaces() {
        let store = MemoryStore::new();
        store.upsert(&row("a", PersistentStatus::Incomplete)).unwrap();
        store.upsert(&row("a", PersistentStatus::Verified)).unwrap();

        let rows = store.list_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PersistentStatus::Verified);
    }

    #[test]
    fn test_remove() {
        let store = MemoryStore::with_rows([row("a", PersistentStatus::Verified)]);
        store.remove("a").unwrap();
        store.remove("missing").unwrap();
        assert!(store.get("a").is_none());
    }
}
