//! Update catalog as published by the update server.
//!
//! The server answers with a JSON document listing every build:
//!
//! ```json
//! {"response": [{"datetime": 1700000000, "filename": "rom-42.zip",
//!                "id": "rom-42", "romtype": "nightly", "size": 1000,
//!                "url": "https://mirror.example/rom-42.zip", "version": "21.0"}]}
//! ```
//!
//! No compatibility filtering happens here: every listed build becomes an
//! [`UpdateDescriptor`].

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::UpdateDescriptor;
use crate::registry::UpdateRegistry;

/// Timeout for fetching the catalog over HTTP.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to fetch catalog {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    response: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    datetime: i64,
    filename: String,
    id: String,
    #[serde(default)]
    romtype: String,
    size: u64,
    url: String,
    #[serde(default)]
    version: String,
}

impl From<CatalogEntry> for UpdateDescriptor {
    fn from(entry: CatalogEntry) -> Self {
        UpdateDescriptor::new(entry.id, entry.filename, entry.url)
            .with_size(entry.size)
            .with_version(entry.version)
            .with_timestamp(entry.datetime)
            .with_release_type(entry.romtype)
    }
}

/// The builds a catalog lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub updates: Vec<UpdateDescriptor>,
}

impl Catalog {
    /// Parse a catalog document.
    pub fn parse(json: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        let updates = document.response.into_iter().map(UpdateDescriptor::from).collect();
        Ok(Self { updates })
    }

    /// Load a catalog from a file path or an `http(s)` URL.
    pub fn load(location: &str) -> Result<Self, CatalogError> {
        let json = if location.starts_with("http://") || location.starts_with("https://") {
            fetch(location)?
        } else {
            fs::read_to_string(location).map_err(|e| CatalogError::Read {
                path: PathBuf::from(location),
                source: e,
            })?
        };
        let catalog = Self::parse(&json)?;
        debug!(location, updates = catalog.updates.len(), "Loaded catalog");
        Ok(catalog)
    }

    /// Ids of every listed build.
    pub fn ids(&self) -> Vec<String> {
        self.updates.iter().map(|update| update.id.clone()).collect()
    }

    /// Feed the catalog into `registry`.
    ///
    /// Every build is added (or refreshed), then availability is updated,
    /// purging unlisted updates that have nothing on disk.
    pub fn apply(&self, registry: &UpdateRegistry) -> usize {
        let added = self
            .updates
            .iter()
            .filter(|update| registry.add_update(update))
            .count();
        registry.set_updates_available_online(&self.ids(), true);
        info!(listed = self.updates.len(), added, "Applied catalog");
        added
    }
}

fn fetch(url: &str) -> Result<String, CatalogError> {
    let fetch_error = |reason: String| CatalogError::Fetch {
        url: url.to_string(),
        reason,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| fetch_error(e.to_string()))?;
    let response = client
        .get(url)
        .send()
        .map_err(|e| fetch_error(e.to_string()))?;
    if !response.status().is_success() {
        return Err(fetch_error(format!("HTTP {}", response.status())));
    }
    response.text().map_err(|e| fetch_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"response": [
        {"datetime": 1700000000, "filename": "rom-42.zip", "id": "rom-42",
         "romtype": "nightly", "size": 1000, "url": "https://a.example/rom-42.zip",
         "version": "21.0"},
        {"datetime": 1690000000, "filename": "rom-41.zip", "id": "rom-41",
         "size": 900, "url": "https://a.example/rom-41.zip"}
    ]}"#;

    #[test]
    fn test_parse_maps_fields() {
        let catalog = Catalog::parse(SAMPLE).unwrap();
        assert_eq!(catalog.updates.len(), 2);
        let first = &catalog.updates[0];
        assert_eq!(first.id, "rom-42");
        assert_eq!(first.name, "rom-42.zip");
        assert_eq!(first.build_timestamp, 1_700_000_000);
        assert_eq!(first.release_type, "nightly");
        assert_eq!(first.size, 1000);
        assert_eq!(first.version, "21.0");
        assert_eq!(catalog.updates[1].version, "");
    }

    #[test]
    fn test_parse_rejects_missing_response() {
        assert!(matches!(Catalog::parse("{}"), Err(CatalogError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, SAMPLE).unwrap();
        let catalog = Catalog::load(path.to_str().unwrap()).unwrap();
        assert_eq!(catalog.ids(), vec!["rom-42".to_string(), "rom-41".to_string()]);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Catalog::load("/nonexistent/otaupdater/catalog.json");
        assert!(matches!(result, Err(CatalogError::Read { .. })));
    }
}
