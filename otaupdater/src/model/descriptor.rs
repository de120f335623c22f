//! Catalog-provided description of an update.

/// An update as advertised by the remote catalog.
///
/// This is the input side of the registry: descriptors are turned into
/// [`UpdateRecord`](super::UpdateRecord)s the first time an id is seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDescriptor {
    /// Stable server-provided identifier.
    pub id: String,
    /// File name of the package, used for the download destination.
    pub name: String,
    /// Version string of the build.
    pub version: String,
    /// Release channel (nightly, stable, ...).
    pub release_type: String,
    /// Build time in seconds since the epoch.
    pub build_timestamp: i64,
    /// Where to download the package from.
    pub download_url: String,
    /// Size advertised by the catalog, in bytes.
    pub size: u64,
}

impl UpdateDescriptor {
    /// Create a descriptor with the mandatory fields; the rest is empty.
    pub fn new(id: impl Into<String>, name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: String::new(),
            release_type: String::new(),
            build_timestamp: 0,
            download_url: download_url.into(),
            size: 0,
        }
    }

    /// Set the advertised size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the build timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.build_timestamp = timestamp;
        self
    }

    /// Set the release type.
    pub fn with_release_type(mut self, release_type: impl Into<String>) -> Self {
        self.release_type = release_type.into();
        self
    }
}
