//! Configuration file handling.
//!
//! Settings live in an INI file at `<config dir>/otaupdater/config.ini`:
//!
//! ```ini
//! [updater]
//! download_dir = /var/lib/otaupdater/updates
//! state_dir = /var/lib/otaupdater/state
//! catalog = https://updates.example/api/v1/device/nightly
//! progress_interval_ms = 500
//!
//! [install]
//! performance_mode = false
//! recovery_command = /usr/sbin/install-update
//! copy_before_install = false
//! auto_delete = false
//!
//! [logging]
//! level = info
//! directory = /var/log/otaupdater
//! ```
//!
//! Missing keys take their defaults. A missing file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::registry::{RegistryConfig, DEFAULT_PROGRESS_INTERVAL};

/// Name of the application directory under the platform directories.
pub const APP_DIR: &str = "otaupdater";

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "config.ini";

const UPDATER: &str = "updater";
const INSTALL: &str = "install";
const LOGGING: &str = "logging";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {section}.{key}")]
    Invalid {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// `[updater]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterSettings {
    pub download_dir: PathBuf,
    pub state_dir: PathBuf,
    /// Catalog location, a file path or an `http(s)` URL.
    pub catalog: Option<String>,
    pub progress_interval: Duration,
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        let data = data_dir();
        Self {
            download_dir: data.join("updates"),
            state_dir: data.join("state"),
            catalog: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// `[install]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSettings {
    pub performance_mode: bool,
    /// Command handed the package path for recovery installs.
    pub recovery_command: Option<String>,
    /// Copy the package next to itself before a recovery install.
    pub copy_before_install: bool,
    /// Delete a package once it was applied.
    pub auto_delete: bool,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Directory for daily log files. Console only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Complete updater configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdaterConfig {
    pub updater: UpdaterSettings,
    pub install: InstallSettings,
    pub logging: LoggingConfig,
}

impl UpdaterConfig {
    /// Load from the default location, falling back to defaults if absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |section: &str, key: &str| {
            ini.section(Some(section))
                .and_then(|props| props.get(key))
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = get(UPDATER, "download_dir") {
            config.updater.download_dir = PathBuf::from(value);
        }
        if let Some(value) = get(UPDATER, "state_dir") {
            config.updater.state_dir = PathBuf::from(value);
        }
        config.updater.catalog = get(UPDATER, "catalog").map(str::to_string);
        if let Some(value) = get(UPDATER, "progress_interval_ms") {
            let millis = value.parse::<u64>().map_err(|_| ConfigError::Invalid {
                section: UPDATER,
                key: "progress_interval_ms",
                value: value.to_string(),
            })?;
            config.updater.progress_interval = Duration::from_millis(millis);
        }

        if let Some(value) = get(INSTALL, "performance_mode") {
            config.install.performance_mode = parse_bool(INSTALL, "performance_mode", value)?;
        }
        config.install.recovery_command = get(INSTALL, "recovery_command").map(str::to_string);
        if let Some(value) = get(INSTALL, "copy_before_install") {
            config.install.copy_before_install = parse_bool(INSTALL, "copy_before_install", value)?;
        }
        if let Some(value) = get(INSTALL, "auto_delete") {
            config.install.auto_delete = parse_bool(INSTALL, "auto_delete", value)?;
        }

        if let Some(value) = get(LOGGING, "level") {
            config.logging.level = value.to_string();
        }
        config.logging.directory = get(LOGGING, "directory").map(PathBuf::from);

        Ok(config)
    }

    /// Write to `path`, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some(UPDATER))
            .set("download_dir", self.updater.download_dir.to_string_lossy())
            .set("state_dir", self.updater.state_dir.to_string_lossy())
            .set("catalog", self.updater.catalog.clone().unwrap_or_default())
            .set(
                "progress_interval_ms",
                self.updater.progress_interval.as_millis().to_string(),
            );
        ini.with_section(Some(INSTALL))
            .set("performance_mode", self.install.performance_mode.to_string())
            .set(
                "recovery_command",
                self.install.recovery_command.clone().unwrap_or_default(),
            )
            .set("copy_before_install", self.install.copy_before_install.to_string())
            .set("auto_delete", self.install.auto_delete.to_string());
        ini.with_section(Some(LOGGING))
            .set("level", self.logging.level.as_str())
            .set(
                "directory",
                self.logging
                    .directory
                    .as_ref()
                    .map(|dir| dir.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
        ini.write_to_file(path).map_err(write_error)
    }

    /// Registry settings derived from this configuration.
    pub fn to_registry_config(&self) -> RegistryConfig {
        RegistryConfig::new(self.updater.download_dir.clone())
            .with_state_dir(self.updater.state_dir.clone())
            .with_progress_interval(self.updater.progress_interval)
            .with_performance_mode(self.install.performance_mode)
            .with_auto_delete(self.install.auto_delete)
    }
}

fn parse_bool(section: &'static str, key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid {
            section,
            key,
            value: value.to_string(),
        }),
    }
}
