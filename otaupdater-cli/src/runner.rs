//! Shared setup for commands that need the update registry.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use otaupdater::catalog::Catalog;
use otaupdater::config::UpdaterConfig;
use otaupdater::install::{CommandRecoveryInstaller, RecoveryInstaller, UnsupportedRecoveryInstaller};
use otaupdater::logging::{init_logging, WorkerGuard};
use otaupdater::registry::{RegistryServices, UpdateRegistry};
use otaupdater::store::JsonFileStore;
use otaupdater::transfer::ReqwestTransport;

use crate::error::CliError;

/// File the registry persists updates to, inside the state directory.
pub const STORE_FILE: &str = "updates.json";

/// Configuration, logging and the async runtime for one CLI invocation.
pub struct CliRunner {
    config: UpdaterConfig,
    runtime: Runtime,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load configuration (from `config_path` if given) and start logging.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => UpdaterConfig::load_from(path)?,
            None => UpdaterConfig::load()?,
        };
        let log_guard = init_logging(&config.logging)?;
        let runtime = Runtime::new().map_err(|e| CliError::Runtime(e.to_string()))?;
        Ok(Self {
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = otaupdater::VERSION,
            download_dir = %self.config.updater.download_dir.display(),
            "otaupdater starting"
        );
    }

    /// Open the registry and start its daemon.
    pub fn open_session(&self) -> Result<Session, CliError> {
        let store = Arc::new(JsonFileStore::new(self.config.updater.state_dir.join(STORE_FILE)));
        let transport = Arc::new(ReqwestTransport::new()?);
        let services = RegistryServices::new(store, transport).with_recovery(self.recovery());

        let (registry, daemon) = UpdateRegistry::new(self.config.to_registry_config(), services)?;
        let shutdown = CancellationToken::new();
        let handle = self.runtime.spawn(daemon.run(shutdown.clone()));
        Ok(Session {
            registry,
            shutdown,
            daemon: handle,
        })
    }

    /// Open the registry and merge the configured catalog into it.
    ///
    /// An unreachable catalog is logged and the session continues with
    /// what is on disk.
    pub fn open_online_session(&self) -> Result<Session, CliError> {
        let session = self.open_session()?;
        if let Some(location) = &self.config.updater.catalog {
            match Catalog::load(location) {
                Ok(catalog) => {
                    catalog.apply(&session.registry);
                }
                Err(e) => warn!(catalog = %location, error = %e, "Catalog unavailable, working offline"),
            }
        }
        Ok(session)
    }

    /// Stop the daemon of `session`, pausing running downloads.
    pub fn close_session(&self, session: Session) {
        session.shutdown.cancel();
        let _ = self.runtime.block_on(session.daemon);
    }

    fn recovery(&self) -> Arc<dyn RecoveryInstaller> {
        let install = &self.config.install;
        match install
            .recovery_command
            .as_deref()
            .and_then(CommandRecoveryInstaller::new)
        {
            Some(installer) => Arc::new(installer.with_copy_before_install(install.copy_before_install)),
            None => Arc::new(UnsupportedRecoveryInstaller),
        }
    }
}

/// A running registry.
pub struct Session {
    pub registry: Arc<UpdateRegistry>,
    shutdown: CancellationToken,
    daemon: JoinHandle<()>,
}
