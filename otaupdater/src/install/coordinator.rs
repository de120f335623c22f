//! Coordination of the two installer backends.
//!
//! ```text
//!   install(id, path)
//!        │
//!        ├── busy? (legacy slot, installing marker, pending reboot) ──► AlreadyInstalling
//!        │
//!        ├── payload.bin + payload_properties.txt ──► BlockEngine::apply_payload
//!        │         markers: installing_id            │
//!        │                                           └─► EngineCallback ─► daemon
//!        │
//!        └── otherwise ──► legacy worker thread
//!                  [copy to .uncrypt] ─► RecoveryInstaller::install_package
//!                  └─► RegistryMessage::Install ─► daemon
//! ```
//!
//! Collaborator failures never escape as panics: every call into an engine
//! or installer is guarded and mapped to an [`InstallError`].

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::archive::{self, PAYLOAD_BIN};
use super::block::{BlockEngine, EngineCallback, EngineEvent, EngineState};
use super::error::InstallError;
use super::legacy::{copy_with_progress, uncrypt_path, RecoveryInstaller};
use super::markers::{InstallMarkers, MarkerFile};
use crate::registry::{InstallChange, RegistryMessage};
use crate::verify::make_world_readable;

/// Which backend took an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStart {
    Block,
    Legacy,
}

/// How a legacy installation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    Failed,
    Cancelled,
}

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelKind {
    /// The block engine stopped; the update is cancelled now.
    Block,
    /// The legacy copy was asked to stop; its worker reports the result.
    Legacy,
}

/// Effect of an engine callback on an update record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BlockUpdate {
    Progress {
        id: String,
        percent: u8,
        finalizing: bool,
    },
    Installed {
        id: String,
    },
    Failed {
        id: String,
    },
    /// The engine no longer runs the marked installation.
    Cleared {
        id: String,
    },
}

struct LegacySlot {
    id: String,
    cancel: CancellationToken,
    /// False once the package was handed to recovery.
    cancellable: bool,
}

struct CoordinatorState {
    legacy: Option<LegacySlot>,
    markers: InstallMarkers,
    bound: bool,
    progress: u8,
    finalizing: bool,
    performance_mode: bool,
    /// Whether an `Idle` status means the marked installation is gone.
    ///
    /// Binding makes the engine report its current status, which is `Idle`
    /// right before a fresh `apply_payload`. That report must not clear the
    /// markers of the installation just started.
    idle_clears: bool,
}

impl CoordinatorState {
    fn is_busy(&self) -> bool {
        self.legacy.is_some()
            || self.markers.installing_id.is_some()
            || self.markers.needs_reboot_id.is_some()
    }
}

/// Owns the install backends and the global "one installation" rule.
pub struct InstallCoordinator {
    engine: Arc<dyn BlockEngine>,
    recovery: Arc<dyn RecoveryInstaller>,
    callback: EngineCallback,
    messages: UnboundedSender<RegistryMessage>,
    marker_file: MarkerFile,
    state: Arc<Mutex<CoordinatorState>>,
}

impl InstallCoordinator {
    pub(crate) fn new(
        engine: Arc<dyn BlockEngine>,
        recovery: Arc<dyn RecoveryInstaller>,
        messages: UnboundedSender<RegistryMessage>,
        state_dir: &Path,
        performance_mode: bool,
    ) -> Self {
        let marker_file = MarkerFile::new(state_dir);
        let markers = marker_file.load();
        Self {
            engine,
            recovery,
            callback: EngineCallback::new(messages.clone()),
            messages,
            marker_file,
            state: Arc::new(Mutex::new(CoordinatorState {
                legacy: None,
                markers,
                bound: false,
                progress: 0,
                finalizing: false,
                performance_mode,
                idle_clears: true,
            })),
        }
    }

    /// Start installing the package of `id`.
    pub fn install(&self, id: &str, path: &Path) -> Result<InstallStart, InstallError> {
        let mut state = self.state.lock();
        if state.is_busy() {
            warn!(id, "Installation rejected, another one is active or a reboot is pending");
            return Err(InstallError::AlreadyInstalling);
        }

        let block_based = guarded("archive inspection", || Ok(archive::is_block_based(path)?))?;
        if block_based {
            self.install_block(&mut state, id, path)?;
            Ok(InstallStart::Block)
        } else {
            self.install_legacy(&mut state, id, path)?;
            Ok(InstallStart::Legacy)
        }
    }

    fn install_block(
        &self,
        state: &mut CoordinatorState,
        id: &str,
        path: &Path,
    ) -> Result<(), InstallError> {
        let offset = archive::payload_offset(path, PAYLOAD_BIN)?;
        let properties = archive::read_properties(path)?;
        self.ensure_bound(state)?;

        let performance_mode = state.performance_mode;
        if let Err(e) = guarded("set_performance_mode", || {
            Ok(self.engine.set_performance_mode(performance_mode)?)
        }) {
            warn!(error = %e, "Could not set performance mode");
        }

        let absolute = fs::canonicalize(path).map_err(|e| InstallError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let uri = format!("file://{}", absolute.display());
        guarded("apply_payload", || {
            Ok(self.engine.apply_payload(&uri, offset, &properties)?)
        })?;

        state.markers.installing_id = Some(id.to_string());
        state.markers.suspended_id = None;
        state.progress = 0;
        state.finalizing = false;
        state.idle_clears = false;
        self.save(&state.markers);
        info!(id, uri = %uri, offset, "Block-based installation started");
        Ok(())
    }

    fn install_legacy(
        &self,
        state: &mut CoordinatorState,
        id: &str,
        path: &Path,
    ) -> Result<(), InstallError> {
        let requires_copy =
            panic::catch_unwind(AssertUnwindSafe(|| self.recovery.requires_copy(path)))
                .unwrap_or(false);
        let cancel = CancellationToken::new();
        let worker = LegacyWorker {
            id: id.to_string(),
            package: path.to_path_buf(),
            requires_copy,
            cancel: cancel.clone(),
            recovery: Arc::clone(&self.recovery),
            messages: self.messages.clone(),
            state: Arc::clone(&self.state),
        };

        state.legacy = Some(LegacySlot {
            id: id.to_string(),
            cancel,
            cancellable: requires_copy,
        });
        let spawned = thread::Builder::new()
            .name(format!("install-{id}"))
            .spawn(move || worker.run());
        if let Err(e) = spawned {
            state.legacy = None;
            return Err(InstallError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }

        info!(id, requires_copy, "Legacy installation started");
        Ok(())
    }

    fn ensure_bound(&self, state: &mut CoordinatorState) -> Result<(), InstallError> {
        if state.bound {
            return Ok(());
        }
        let callback = self.callback.clone();
        let bound = panic::catch_unwind(AssertUnwindSafe(|| self.engine.bind(callback)))
            .unwrap_or(false);
        if !bound {
            error!("Could not bind to the update engine");
            return Err(InstallError::BindFailed);
        }
        state.bound = true;
        Ok(())
    }

    fn save(&self, markers: &InstallMarkers) {
        if let Err(e) = self.marker_file.save(markers) {
            error!(path = %self.marker_file.path().display(), error = %e, "Could not save install markers");
        }
    }

    /// Cancel the installation of `id`.
    pub fn cancel(&self, id: &str) -> Result<CancelKind, InstallError> {
        let mut state = self.state.lock();
        if let Some(slot) = state.legacy.as_ref().filter(|slot| slot.id == id) {
            if !slot.cancellable {
                return Err(InstallError::NotCancellable(id.to_string()));
            }
            slot.cancel.cancel();
            return Ok(CancelKind::Legacy);
        }

        if state.markers.installing_id.as_deref() != Some(id) {
            return Err(InstallError::NotInstalling(id.to_string()));
        }
        self.ensure_bound(&mut state)?;
        guarded("cancel", || Ok(self.engine.cancel()?))?;
        state.markers.installation_done(false);
        self.save(&state.markers);
        info!(id, "Block-based installation cancelled");
        Ok(CancelKind::Block)
    }

    /// Suspend the block-based installation of `id`.
    pub fn suspend(&self, id: &str) -> Result<(), InstallError> {
        let mut state = self.state.lock();
        if state.markers.installing_id.as_deref() != Some(id) || state.markers.suspended_id.is_some() {
            return Err(InstallError::NotInstalling(id.to_string()));
        }
        self.ensure_bound(&mut state)?;
        guarded("suspend", || Ok(self.engine.suspend()?))?;
        state.markers.suspended_id = Some(id.to_string());
        self.save(&state.markers);
        Ok(())
    }

    /// Resume the suspended installation of `id`.
    ///
    /// Returns the progress and finalizing flag last reported before the
    /// suspension.
    pub fn resume(&self, id: &str) -> Result<(u8, bool), InstallError> {
        let mut state = self.state.lock();
        if state.markers.suspended_id.as_deref() != Some(id) {
            return Err(InstallError::NotInstalling(id.to_string()));
        }
        self.ensure_bound(&mut state)?;
        guarded("resume", || Ok(self.engine.resume()?))?;
        state.markers.suspended_id = None;
        self.save(&state.markers);
        Ok((state.progress, state.finalizing))
    }

    /// Re-attach to an installation started before a restart.
    ///
    /// Returns the adopted id and whether it is suspended.
    pub fn reconnect(&self) -> Option<(String, bool)> {
        let mut state = self.state.lock();
        let id = state.markers.installing_id.clone()?;
        if !state.bound {
            if let Err(e) = self.ensure_bound(&mut state) {
                warn!(id = %id, error = %e, "Cannot reconnect to the update engine");
                return None;
            }
        }
        state.idle_clears = true;
        let suspended = state.markers.suspended_id.as_deref() == Some(id.as_str());
        info!(id = %id, suspended, "Reconnected to running installation");
        Some((id, suspended))
    }

    /// Translate an engine callback into a record change.
    pub(crate) fn handle_engine_event(&self, event: EngineEvent) -> Option<BlockUpdate> {
        let mut state = self.state.lock();
        match event {
            EngineEvent::Status { state: engine_state, percent } => match engine_state {
                EngineState::Downloading | EngineState::Finalizing => {
                    let id = state.markers.installing_id.clone()?;
                    let percent = (percent * 100.0).round().clamp(0.0, 100.0) as u8;
                    let finalizing = engine_state == EngineState::Finalizing;
                    state.progress = percent;
                    state.finalizing = finalizing;
                    state.idle_clears = true;
                    Some(BlockUpdate::Progress {
                        id,
                        percent,
                        finalizing,
                    })
                }
                EngineState::UpdatedNeedReboot => {
                    let id = state.markers.installing_id.clone()?;
                    state.markers.installation_done(true);
                    self.save(&state.markers);
                    info!(id = %id, "Update applied, reboot required");
                    Some(BlockUpdate::Installed { id })
                }
                EngineState::Idle => {
                    if !state.idle_clears {
                        return None;
                    }
                    let id = state.markers.installing_id.clone()?;
                    debug!(id = %id, "Engine idle, clearing stale install markers");
                    state.markers.installation_done(false);
                    self.save(&state.markers);
                    Some(BlockUpdate::Cleared { id })
                }
                EngineState::ReportingErrorEvent => {
                    let id = state.markers.installing_id.clone()?;
                    state.markers.installation_done(false);
                    self.save(&state.markers);
                    warn!(id = %id, "Update engine reported an error");
                    Some(BlockUpdate::Failed { id })
                }
                _ => None,
            },
            EngineEvent::PayloadComplete(code) => {
                if code.is_success() {
                    return None;
                }
                let id = state.markers.installing_id.clone();
                state.markers.installation_done(false);
                self.save(&state.markers);
                warn!(id = ?id, %code, "Payload application failed");
                id.map(|id| BlockUpdate::Failed { id })
            }
        }
    }

    /// End the block-based installation.
    pub fn installation_done(&self, needs_reboot: bool) {
        let mut state = self.state.lock();
        state.markers.installation_done(needs_reboot);
        self.save(&state.markers);
    }

    /// Forget the pending reboot, after the device restarted.
    pub fn acknowledge_reboot(&self) {
        let mut state = self.state.lock();
        if state.markers.needs_reboot_id.take().is_some() {
            self.save(&state.markers);
        }
    }

    /// Ask the engine to favour install speed over responsiveness.
    pub fn set_performance_mode(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.performance_mode = enabled;
        if state.bound {
            if let Err(e) = guarded("set_performance_mode", || {
                Ok(self.engine.set_performance_mode(enabled)?)
            }) {
                warn!(error = %e, "Could not set performance mode");
            }
        }
    }

    pub fn is_installing(&self, id: &str) -> bool {
        let state = self.state.lock();
        state.legacy.as_ref().is_some_and(|slot| slot.id == id)
            || state.markers.installing_id.as_deref() == Some(id)
    }

    pub fn is_any_installing(&self) -> bool {
        let state = self.state.lock();
        state.legacy.is_some() || state.markers.installing_id.is_some()
    }

    pub fn is_waiting_for_reboot(&self, id: &str) -> bool {
        self.state.lock().markers.needs_reboot_id.as_deref() == Some(id)
    }

    /// Update waiting for a reboot, if any.
    pub fn needs_reboot_id(&self) -> Option<String> {
        self.state.lock().markers.needs_reboot_id.clone()
    }
}

/// Run `f`, turning a panic into [`InstallError::Panicked`].
fn guarded<T>(
    operation: &'static str,
    f: impl FnOnce() -> Result<T, InstallError>,
) -> Result<T, InstallError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!(operation, "Installer collaborator panicked");
        Err(InstallError::Panicked(operation))
    })
}

struct LegacyWorker {
    id: String,
    package: PathBuf,
    requires_copy: bool,
    cancel: CancellationToken,
    recovery: Arc<dyn RecoveryInstaller>,
    messages: UnboundedSender<RegistryMessage>,
    state: Arc<Mutex<CoordinatorState>>,
}

impl LegacyWorker {
    fn run(self) {
        let outcome = self.install();
        self.state.lock().legacy = None;
        let _ = self.messages.send(RegistryMessage::Install {
            id: self.id.clone(),
            change: InstallChange::Finished(outcome),
        });
    }

    fn install(&self) -> InstallOutcome {
        let target = if self.requires_copy {
            match self.prepare_copy() {
                Ok(copy) => copy,
                Err(InstallError::Cancelled) => {
                    info!(id = %self.id, "Legacy installation cancelled");
                    return InstallOutcome::Cancelled;
                }
                Err(e) => {
                    warn!(id = %self.id, error = %e, "Could not prepare package copy");
                    return InstallOutcome::Failed;
                }
            }
        } else {
            self.package.clone()
        };

        match guarded("recovery install", || Ok(self.recovery.install_package(&target)?)) {
            Ok(()) => {
                info!(id = %self.id, "Package handed to recovery");
                InstallOutcome::Installed
            }
            Err(e) => {
                warn!(id = %self.id, error = %e, "Recovery installation failed");
                InstallOutcome::Failed
            }
        }
    }

    fn prepare_copy(&self) -> Result<PathBuf, InstallError> {
        let copy = uncrypt_path(&self.package);
        let mut report = |percent| {
            let _ = self.messages.send(RegistryMessage::Install {
                id: self.id.clone(),
                change: InstallChange::Progress(percent),
            });
        };
        copy_with_progress(&self.package, &copy, &self.cancel, &mut report)?;

        let mut state = self.state.lock();
        if self.cancel.is_cancelled() {
            drop(state);
            let _ = fs::remove_file(&copy);
            return Err(InstallError::Cancelled);
        }
        if let Some(slot) = state.legacy.as_mut() {
            slot.cancellable = false;
        }
        drop(state);

        if let Err(e) = make_world_readable(&copy) {
            warn!(path = %copy.display(), error = %e, "Could not adjust copy permissions");
        }
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::block::EngineErrorCode;
    use crate::install::error::EngineError;
    use crate::test_support::{block_zip, simple_zip};
    use tempfile::TempDir;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    #[derive(Default)]
    struct FakeEngine {
        bind_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    impl BlockEngine for FakeEngine {
        fn bind(&self, _callback: EngineCallback) -> bool {
            self.calls.lock().push("bind".to_string());
            !self.bind_fails
        }

        fn apply_payload(&self, uri: &str, offset: u64, properties: &[String]) -> Result<(), EngineError> {
            self.calls
                .lock()
                .push(format!("apply {uri} {offset} {}", properties.len()));
            Ok(())
        }

        fn suspend(&self) -> Result<(), EngineError> {
            self.calls.lock().push("suspend".to_string());
            Ok(())
        }

        fn resume(&self) -> Result<(), EngineError> {
            self.calls.lock().push("resume".to_string());
            Ok(())
        }

        fn cancel(&self) -> Result<(), EngineError> {
            self.calls.lock().push("cancel".to_string());
            Ok(())
        }

        fn set_performance_mode(&self, enabled: bool) -> Result<(), EngineError> {
            self.calls.lock().push(format!("performance {enabled}"));
            Ok(())
        }
    }

    struct FakeRecovery {
        fail: bool,
        copy: bool,
    }

    impl RecoveryInstaller for FakeRecovery {
        fn install_package(&self, _path: &Path) -> Result<(), EngineError> {
            if self.fail {
                Err(EngineError::Rejected {
                    operation: "recovery install",
                    reason: "test".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn requires_copy(&self, _path: &Path) -> bool {
            self.copy
        }
    }

    struct Fixture {
        dir: TempDir,
        engine: Arc<FakeEngine>,
        coordinator: InstallCoordinator,
        rx: UnboundedReceiver<RegistryMessage>,
    }

    fn fixture(engine: FakeEngine, recovery: FakeRecovery) -> Fixture {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(engine);
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator =
            InstallCoordinator::new(engine.clone(), Arc::new(recovery), tx, dir.path(), true);
        Fixture {
            dir,
            engine,
            coordinator,
            rx,
        }
    }

    fn default_fixture() -> Fixture {
        fixture(FakeEngine::default(), FakeRecovery { fail: false, copy: false })
    }

    fn write(dir: &TempDir, name: &str, bytes: Vec<u8>) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn status(state: EngineState, percent: f32) -> EngineEvent {
        EngineEvent::Status { state, percent }
    }

    #[test]
    fn test_block_install_applies_payload() {
        let f = default_fixture();
        let path = write(&f.dir, "rom.zip", block_zip(b"data"));

        assert_eq!(f.coordinator.install("rom", &path).unwrap(), InstallStart::Block);

        let calls = f.engine.calls.lock().clone();
        assert_eq!(calls[0], "bind");
        assert_eq!(calls[1], "performance true");
        assert!(calls[2].starts_with("apply file:///"));
        assert!(calls[2].ends_with(" 2"));
        assert!(f.coordinator.is_installing("rom"));
        assert!(f.coordinator.is_any_installing());
        assert_eq!(
            MarkerFile::new(f.dir.path()).load().installing_id.as_deref(),
            Some("rom")
        );
    }

    #[test]
    fn test_second_install_rejected() {
        let f = default_fixture();
        let block = write(&f.dir, "rom.zip", block_zip(b"data"));
        let legacy = write(&f.dir, "old.zip", simple_zip());

        f.coordinator.install("rom", &block).unwrap();
        assert!(matches!(
            f.coordinator.install("old", &legacy),
            Err(InstallError::AlreadyInstalling)
        ));
    }

    #[test]
    fn test_bind_failure() {
        let f = fixture(
            FakeEngine {
                bind_fails: true,
                ..Default::default()
            },
            FakeRecovery { fail: false, copy: false },
        );
        let path = write(&f.dir, "rom.zip", block_zip(b"data"));

        assert!(matches!(f.coordinator.install("rom", &path), Err(InstallError::BindFailed)));
        assert!(!f.coordinator.is_any_installing());
    }

    #[test]
    fn test_engine_progress_and_reboot() {
        let f = default_fixture();
        let path = write(&f.dir, "rom.zip", block_zip(b"data"));
        f.coordinator.install("rom", &path).unwrap();

        // The status reported on bind must not cancel the fresh install.
        assert_eq!(f.coordinator.handle_engine_event(status(EngineState::Idle, 0.0)), None);
        assert!(f.coordinator.is_installing("rom"));

        assert_eq!(
            f.coordinator.handle_engine_event(status(EngineState::Finalizing, 0.426)),
            Some(BlockUpdate::Progress {
                id: "rom".to_string(),
                percent: 43,
                finalizing: true
            })
        );
        assert_eq!(
            f.coordinator.handle_engine_event(status(EngineState::UpdatedNeedReboot, 1.0)),
            Some(BlockUpdate::Installed { id: "rom".to_string() })
        );
        assert!(!f.coordinator.is_any_installing());
        assert!(f.coordinator.is_waiting_for_reboot("rom"));

        let other = write(&f.dir, "next.zip", block_zip(b"data"));
        assert!(matches!(
            f.coordinator.install("next", &other),
            Err(InstallError::AlreadyInstalling)
        ));
        f.coordinator.acknowledge_reboot();
        assert!(f.coordinator.install("next", &other).is_ok());
    }

    #[test]
    fn test_payload_failure_clears_markers() {
        let f = default_fixture();
        let path = write(&f.dir, "rom.zip", block_zip(b"data"));
        f.coordinator.install("rom", &path).unwrap();

        assert_eq!(
            f.coordinator
                .handle_engine_event(EngineEvent::PayloadComplete(EngineErrorCode(20))),
            Some(BlockUpdate::Failed { id: "rom".to_string() })
        );
        assert!(!f.coordinator.is_any_installing());
        assert_eq!(MarkerFile::new(f.dir.path()).load(), InstallMarkers::default());
    }

    #[test]
    fn test_suspend_resume_cancel() {
        let f = default_fixture();
        let path = write(&f.dir, "rom.zip", block_zip(b"data"));
        f.coordinator.install("rom", &path).unwrap();
        f.coordinator.handle_engine_event(status(EngineState::Downloading, 0.3));

        assert!(f.coordinator.resume("rom").is_err());
        f.coordinator.suspend("rom").unwrap();
        assert!(f.coordinator.suspend("rom").is_err());
        assert_eq!(f.coordinator.resume("rom").unwrap(), (30, false));
        assert_eq!(f.coordinator.cancel("rom").unwrap(), CancelKind::Block);
        assert!(!f.coordinator.is_any_installing());
        assert!(matches!(f.coordinator.cancel("rom"), Err(InstallError::NotInstalling(_))));
    }

    #[test]
    fn test_reconnect_adopts_marker() {
        let dir = TempDir::new().unwrap();
        MarkerFile::new(dir.path())
            .save(&InstallMarkers {
                installing_id: Some("rom".to_string()),
                suspended_id: Some("rom".to_string()),
                needs_reboot_id: None,
            })
            .unwrap();
        let engine = Arc::new(FakeEngine::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let coordinator = InstallCoordinator::new(
            engine.clone(),
            Arc::new(FakeRecovery { fail: false, copy: false }),
            tx,
            dir.path(),
            false,
        );

        assert_eq!(coordinator.reconnect(), Some(("rom".to_string(), true)));
        assert_eq!(engine.calls.lock().as_slice(), ["bind"]);

        // An idle engine after a restart means the install is gone.
        assert_eq!(
            coordinator.handle_engine_event(status(EngineState::Idle, 0.0)),
            Some(BlockUpdate::Cleared { id: "rom".to_string() })
        );
        assert!(!coordinator.is_any_installing());
        assert_eq!(MarkerFile::new(dir.path()).load(), InstallMarkers::default());
        assert_eq!(coordinator.handle_engine_event(status(EngineState::Idle, 0.0)), None);
    }

    #[test]
    fn test_engine_error_event_fails_install() {
        let f = default_fixture();
        let path = write(&f.dir, "rom.zip", block_zip(b"data"));
        f.coordinator.install("rom", &path).unwrap();
        f.coordinator.handle_engine_event(status(EngineState::Downloading, 0.4));

        assert_eq!(
            f.coordinator.handle_engine_event(status(EngineState::ReportingErrorEvent, 0.0)),
            Some(BlockUpdate::Failed { id: "rom".to_string() })
        );
        assert!(!f.coordinator.is_any_installing());
        assert!(!f.coordinator.is_waiting_for_reboot("rom"));
        assert_eq!(
            f.coordinator.handle_engine_event(status(EngineState::ReportingErrorEvent, 0.0)),
            None
        );
    }

    #[test]
    fn test_reconnect_without_marker() {
        let f = default_fixture();
        assert_eq!(f.coordinator.reconnect(), None);
        assert!(f.engine.calls.lock().is_empty());
    }

    fn finished(rx: &mut UnboundedReceiver<RegistryMessage>) -> InstallOutcome {
        loop {
            match rx.blocking_recv().unwrap() {
                RegistryMessage::Install {
                    change: InstallChange::Finished(outcome),
                    ..
                } => return outcome,
                _ => continue,
            }
        }
    }

    #[test]
    fn test_legacy_install_succeeds() {
        let mut f = fixture(FakeEngine::default(), FakeRecovery { fail: false, copy: true });
        let path = write(&f.dir, "old.zip", simple_zip());

        assert_eq!(f.coordinator.install("old", &path).unwrap(), InstallStart::Legacy);
        assert_eq!(finished(&mut f.rx), InstallOutcome::Installed);
        assert!(uncrypt_path(&path).exists());
        assert!(!f.coordinator.is_any_installing());
        assert!(f.engine.calls.lock().is_empty());
    }

    #[test]
    fn test_legacy_failure_reported() {
        let mut f = fixture(FakeEngine::default(), FakeRecovery { fail: true, copy: false });
        let path = write(&f.dir, "old.zip", simple_zip());

        f.coordinator.install("old", &path).unwrap();
        assert_eq!(finished(&mut f.rx), InstallOutcome::Failed);
    }

    #[test]
    fn test_legacy_without_copy_not_cancellable() {
        let f = default_fixture();
        let path = write(&f.dir, "old.zip", simple_zip());
        f.coordinator.install("old", &path).unwrap();

        match f.coordinator.cancel("old") {
            Err(InstallError::NotCancellable(_)) | Err(InstallError::NotInstalling(_)) => {}
            other => panic!("unexpected cancel result: {other:?}"),
        }
    }
}
