//! CLI error type.

use std::fmt;

use otaupdater::catalog::CatalogError;
use otaupdater::config::ConfigError;
use otaupdater::export::ExportError;
use otaupdater::import::ImportError;
use otaupdater::logging::LoggingError;
use otaupdater::registry::RegistryError;
use otaupdater::transfer::TransferError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is incomplete.
    Config(String),
    /// The update registry could not be started.
    Registry(String),
    /// The catalog could not be loaded.
    Catalog(String),
    /// A local package could not be imported.
    Import(String),
    /// No update with this id is known.
    UnknownUpdate(String),
    /// A download ended without a verified package.
    Download(String),
    /// An installation did not complete.
    Install(String),
    /// A package could not be exported.
    Export(String),
    /// Runtime setup failed.
    Runtime(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Registry(msg) => write!(f, "Failed to open update registry: {}", msg),
            CliError::Catalog(msg) => write!(f, "Failed to load catalog: {}", msg),
            CliError::Import(msg) => write!(f, "Import failed: {}", msg),
            CliError::UnknownUpdate(id) => {
                write!(f, "Unknown update '{}'. Use 'otaupdater list' to see known updates.", id)
            }
            CliError::Download(msg) => write!(f, "Download failed: {}", msg),
            CliError::Install(msg) => write!(f, "Installation failed: {}", msg),
            CliError::Export(msg) => write!(f, "Export failed: {}", msg),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        CliError::Registry(e.to_string())
    }
}

impl From<TransferError> for CliError {
    fn from(e: TransferError) -> Self {
        CliError::Registry(e.to_string())
    }
}

impl From<CatalogError> for CliError {
    fn from(e: CatalogError) -> Self {
        CliError::Catalog(e.to_string())
    }
}

impl From<ImportError> for CliError {
    fn from(e: ImportError) -> Self {
        CliError::Import(e.to_string())
    }
}

impl From<ExportError> for CliError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::UnknownUpdate(id) => CliError::UnknownUpdate(id),
            e => CliError::Export(e.to_string()),
        }
    }
}
