//! The update registry: single owner of every [`UpdateRecord`].
//!
//! Commands run on the caller's thread and apply their synchronous part
//! under one lock. Everything asynchronous (transfers, verification,
//! installers, the block engine) reports back through
//! [`RegistryMessage`]s that the [`RegistryDaemon`] applies in order.
//!
//! ```text
//!   caller ──► start/resume/pause/delete/install ──┐
//!                                                  ▼
//!                                   ┌──────────────────────────┐
//!   transfer threads ──┐            │ Mutex<RegistryState>     │──► store (outside lock)
//!   verify threads ────┼─ mpsc ──►  │   entries: id → record   │──► broadcast UpdateEvent
//!   legacy installer ──┤  daemon    │   active transfers, ...  │
//!   block engine ──────┘            └──────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, trace, warn};

use super::config::RegistryConfig;
use super::daemon::RegistryDaemon;
use super::events::{self, EventKind, UpdateEvent};
use super::files::{cleanup_download_dir, remove_if_exists, unique_destination};
use super::keep_alive::{KeepAlive, NoopKeepAlive};
use super::message::{InstallChange, RegistryMessage};
use super::progress::ProgressThrottle;
use crate::install::{
    BlockEngine, BlockUpdate, CancelKind, EngineEvent, InstallCoordinator, InstallError,
    InstallOutcome, RecoveryInstaller, UnsupportedBlockEngine, UnsupportedRecoveryInstaller,
};
use crate::model::{PersistentStatus, UpdateDescriptor, UpdateRecord, UpdateStatus};
use crate::store::{StoreError, StoredUpdate, UpdateStore};
use crate::transfer::{
    content_length, spawn_transfer, HttpTransport, JobId, TransferError, TransferEvent,
    TransferHandle, TransferReporter, TransferRequest,
};
use crate::verify::{verify_package, ArchiveVerifier, PackageVerifier, VerifyOutcome};

/// Errors building the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to load persisted updates: {0}")]
    Store(#[from] StoreError),

    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Collaborators of the registry.
pub struct RegistryServices {
    pub store: Arc<dyn UpdateStore>,
    pub transport: Arc<dyn HttpTransport>,
    pub verifier: Arc<dyn PackageVerifier>,
    pub block_engine: Arc<dyn BlockEngine>,
    pub recovery: Arc<dyn RecoveryInstaller>,
    pub keep_alive: Arc<dyn KeepAlive>,
}

impl RegistryServices {
    /// Services with archive verification and no installer backends.
    pub fn new(store: Arc<dyn UpdateStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            store,
            transport,
            verifier: Arc::new(ArchiveVerifier),
            block_engine: Arc::new(UnsupportedBlockEngine),
            recovery: Arc::new(UnsupportedRecoveryInstaller),
            keep_alive: Arc::new(NoopKeepAlive),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn PackageVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_block_engine(mut self, engine: Arc<dyn BlockEngine>) -> Self {
        self.block_engine = engine;
        self
    }

    pub fn with_recovery(mut self, recovery: Arc<dyn RecoveryInstaller>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Arc<dyn KeepAlive>) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

struct Entry {
    record: UpdateRecord,
    transfer: Option<TransferHandle>,
    /// Cancelled transfer whose thread may still be writing.
    stopping: Option<TransferHandle>,
}

impl Entry {
    fn new(record: UpdateRecord) -> Self {
        Self {
            record,
            transfer: None,
            stopping: None,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, Entry>,
    active_transfers: usize,
    verifying: HashSet<String>,
    keep_alive_held: bool,
    throttles: HashMap<String, ProgressThrottle>,
}

/// Side effects collected under the lock and carried out after it.
#[derive(Default)]
struct Pending {
    upserts: Vec<StoredUpdate>,
    removals: Vec<String>,
    events: Vec<UpdateEvent>,
}

impl Pending {
    fn event(&mut self, kind: EventKind, id: &str) {
        self.events.push(UpdateEvent::new(kind, id));
    }

    fn changed(&mut self, id: &str) {
        self.event(EventKind::StatusChanged, id);
    }

    fn persist(&mut self, record: &UpdateRecord) {
        self.upserts.extend(StoredUpdate::from_record(record));
    }

    fn forget(&mut self, id: &str) {
        self.removals.push(id.to_string());
    }
}

/// Owns all update records and drives their lifecycle.
pub struct UpdateRegistry {
    config: RegistryConfig,
    store: Arc<dyn UpdateStore>,
    transport: Arc<dyn HttpTransport>,
    verifier: Arc<dyn PackageVerifier>,
    keep_alive: Arc<dyn KeepAlive>,
    coordinator: InstallCoordinator,
    state: Mutex<RegistryState>,
    messages: UnboundedSender<RegistryMessage>,
    events: broadcast::Sender<UpdateEvent>,
    next_job: AtomicU64,
}

impl UpdateRegistry {
    /// Build the registry from the persisted rows.
    ///
    /// Cleans the download directory, reconstructs every stored update and
    /// re-attaches to a block-based installation that survived a restart.
    /// The returned daemon must be run for asynchronous work to complete.
    pub fn new(
        config: RegistryConfig,
        services: RegistryServices,
    ) -> Result<(Arc<Self>, RegistryDaemon), RegistryError> {
        for dir in [&config.download_dir, &config.state_dir] {
            fs::create_dir_all(dir).map_err(|e| RegistryError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }

        let rows = services.store.list_all()?;
        let keep: HashSet<PathBuf> = rows.iter().map(|row| row.path.clone()).collect();
        match cleanup_download_dir(&config.download_dir, &keep) {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Cleaned download directory"),
            Err(e) => warn!(error = %e, "Could not clean download directory"),
        }

        let (messages, receiver) = mpsc::unbounded_channel();
        let coordinator = InstallCoordinator::new(
            services.block_engine,
            services.recovery,
            messages.clone(),
            &config.state_dir,
            config.performance_mode,
        );

        let registry = Arc::new(Self {
            config,
            store: services.store,
            transport: services.transport,
            verifier: services.verifier,
            keep_alive: services.keep_alive,
            coordinator,
            state: Mutex::new(RegistryState::default()),
            messages,
            events: events::channel(),
            next_job: AtomicU64::new(1),
        });

        let mut pending = Pending::default();
        {
            let mut state = registry.state.lock();
            for row in &rows {
                registry.insert_record(&mut state, row.to_record(), false, &mut pending);
            }
            info!(updates = state.entries.len(), "Loaded persisted updates");
        }
        registry.flush(pending);
        registry.reattach_installation();

        let daemon = RegistryDaemon::new(Arc::clone(&registry), receiver);
        Ok((registry, daemon))
    }

    /// Configuration the registry was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Directory packages are downloaded to.
    pub fn download_dir(&self) -> &Path {
        &self.config.download_dir
    }

    pub(crate) fn verifier(&self) -> &dyn PackageVerifier {
        self.verifier.as_ref()
    }

    /// Receive change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    fn flush(&self, pending: Pending) {
        for row in &pending.upserts {
            if let Err(e) = self.store.upsert(row) {
                error!(id = %row.id, error = %e, "Could not persist update");
            }
        }
        for id in &pending.removals {
            if let Err(e) = self.store.remove(id) {
                error!(id = %id, error = %e, "Could not remove persisted update");
            }
        }
        for event in pending.events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    /// Insert a record, reconciling its persisted status with the disk.
    ///
    /// Returns false if the record was invalid and purged.
    fn insert_record(
        &self,
        state: &mut RegistryState,
        mut record: UpdateRecord,
        online: bool,
        pending: &mut Pending,
    ) -> bool {
        record.available_online = online;
        if record.persistent_status != PersistentStatus::Unknown && !reconcile_with_disk(&mut record) {
            warn!(id = %record.id, status = ?record.persistent_status, "Persisted update does not match its file");
            if let Some(path) = record.file_path.take() {
                remove_if_exists(&path);
            }
            pending.forget(&record.id);
            if !online {
                return false;
            }
            record.persistent_status = PersistentStatus::Unknown;
            record.status = UpdateStatus::Unknown;
            record.progress_percent = 0;
            record.bytes_on_disk = 0;
        }
        state.entries.insert(record.id.clone(), Entry::new(record));
        true
    }

    fn reattach_installation(&self) {
        let mut pending = Pending::default();
        {
            let mut state = self.state.lock();
            if let Some((id, suspended)) = self.coordinator.reconnect() {
                if let Some(entry) = state.entries.get_mut(&id) {
                    entry.record.status = if suspended {
                        UpdateStatus::InstallationSuspended
                    } else {
                        UpdateStatus::Installing
                    };
                    pending.changed(&id);
                }
            }
            if let Some(id) = self.coordinator.needs_reboot_id() {
                if let Some(entry) = state.entries.get_mut(&id) {
                    entry.record.status = UpdateStatus::Installed;
                    pending.changed(&id);
                }
            }
        }
        self.flush(pending);
    }

    // ------------------------------------------------------------------
    // Catalog input
    // ------------------------------------------------------------------

    /// Add an update advertised by the catalog.
    ///
    /// A known id gets its URL and metadata refreshed and is marked
    /// online. Returns true if the id was new.
    pub fn add_update(&self, descriptor: &UpdateDescriptor) -> bool {
        let mut pending = Pending::default();
        let added = {
            let mut state = self.state.lock();
            match state.entries.get_mut(&descriptor.id) {
                Some(entry) => {
                    entry.record.refresh_from(descriptor);
                    entry.record.available_online = true;
                    false
                }
                None => {
                    debug!(id = %descriptor.id, "New update from catalog");
                    let record = UpdateRecord::from_descriptor(descriptor);
                    self.insert_record(&mut state, record, true, &mut pending)
                }
            }
        };
        self.flush(pending);
        added
    }

    /// Add (or replace) a locally provided record.
    ///
    /// Fails if the id is busy downloading, verifying or installing.
    pub fn add_local_update(&self, record: UpdateRecord) -> bool {
        let mut pending = Pending::default();
        {
            let mut state = self.state.lock();
            let id = record.id.clone();
            if self.is_busy(&state, &id) {
                warn!(id = %id, "Cannot replace an update that is in use");
                return false;
            }
            pending.persist(&record);
            pending.changed(&id);
            state.entries.insert(id, Entry::new(record));
        }
        self.flush(pending);
        true
    }

    /// Mark which ids the catalog currently lists.
    ///
    /// With `purge`, updates that are no longer listed and have nothing
    /// usable on disk are removed.
    pub fn set_updates_available_online(&self, ids: &[String], purge: bool) {
        let online: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut pending = Pending::default();
        {
            let mut state = self.state.lock();
            let mut purged = Vec::new();
            for (id, entry) in state.entries.iter_mut() {
                entry.record.available_online = online.contains(id.as_str());
                if purge
                    && !entry.record.available_online
                    && entry.record.persistent_status == PersistentStatus::Unknown
                    && entry.transfer.is_none()
                {
                    purged.push(id.clone());
                }
            }
            for id in purged {
                if state.verifying.contains(&id) || self.coordinator.is_installing(&id) {
                    continue;
                }
                state.entries.remove(&id);
                state.throttles.remove(&id);
                debug!(id = %id, "Update no longer listed, removed");
                pending.event(EventKind::Removed, &id);
            }
        }
        self.flush(pending);
    }

    // ------------------------------------------------------------------
    // Downloads
    // ------------------------------------------------------------------

    /// Start downloading `id` into a fresh file.
    pub fn start_download(&self, id: &str) {
        self.begin_transfer(id, false);
    }

    /// Continue downloading `id` from where its file ends.
    pub fn resume_download(&self, id: &str) {
        self.begin_transfer(id, true);
    }

    fn begin_transfer(&self, id: &str, resume: bool) {
        let stopping = self
            .state
            .lock()
            .entries
            .get_mut(id)
            .and_then(|entry| entry.stopping.take());
        if let Some(handle) = stopping {
            debug!(id, job = handle.job_id().0, "Waiting for the paused transfer to exit");
            handle.join();
        }

        let mut pending = Pending::default();
        self.begin_transfer_locked(&mut self.state.lock(), id, resume, &mut pending);
        self.flush(pending);
    }

    fn begin_transfer_locked(
        &self,
        state: &mut RegistryState,
        id: &str,
        resume: bool,
        pending: &mut Pending,
    ) {
        let installing = self.coordinator.is_installing(id);
        let verifying = state.verifying.contains(id);
        let Some(entry) = state.entries.get_mut(id) else {
            warn!(id, "Download requested for unknown update");
            return;
        };
        if entry.transfer.is_some() || verifying {
            debug!(id, "Already downloading or verifying");
            return;
        }
        if installing || entry.record.is_local_only() {
            warn!(id, "Update cannot be downloaded now");
            return;
        }

        let destination = if resume {
            match entry.record.file_path.clone().filter(|path| path.is_file()) {
                Some(path) => path,
                None => {
                    warn!(id, "Cannot resume, partial file is missing");
                    entry.record.status = UpdateStatus::PausedError;
                    entry.record.clear_telemetry();
                    pending.changed(id);
                    return;
                }
            }
        } else {
            unique_destination(&self.config.download_dir, &package_file_name(&entry.record))
        };

        let on_disk = if resume {
            fs::metadata(&destination).map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };
        entry.record.file_path = Some(destination.clone());
        entry.record.bytes_on_disk = on_disk;
        entry.record.progress_percent = UpdateRecord::percent_of(on_disk, entry.record.expected_size);
        entry.record.clear_telemetry();
        pending.changed(id);

        if resume && entry.record.expected_size > 0 && on_disk == entry.record.expected_size {
            info!(id, "Package already complete, verifying");
            entry.record.status = UpdateStatus::Verifying;
            state.verifying.insert(id.to_string());
            self.spawn_verification(id, destination);
            return;
        }

        let url = entry.record.download_url.clone();
        match self.spawn_job(id, url, destination, resume) {
            Ok(handle) => {
                entry.transfer = Some(handle);
                entry.record.status = UpdateStatus::Starting;
                self.transfer_started(state);
                info!(id, resume, "Download started");
            }
            Err(e) => {
                error!(id, error = %e, "Could not start download");
                entry.record.status = UpdateStatus::PausedError;
            }
        }
    }

    fn spawn_job(
        &self,
        id: &str,
        url: String,
        destination: PathBuf,
        resume: bool,
    ) -> Result<TransferHandle, TransferError> {
        let job = JobId(self.next_job.fetch_add(1, Ordering::Relaxed));
        let messages = self.messages.clone();
        let owner = id.to_string();
        let reporter: TransferReporter = Box::new(move |event| {
            let _ = messages.send(RegistryMessage::Transfer {
                id: owner.clone(),
                job,
                event,
            });
        });
        let request = TransferRequest {
            url,
            destination,
            resume,
        };
        spawn_transfer(job, request, Arc::clone(&self.transport), reporter)
    }

    fn spawn_verification(&self, id: &str, path: PathBuf) {
        let verifier = Arc::clone(&self.verifier);
        let messages = self.messages.clone();
        let owner = id.to_string();
        let spawned = thread::Builder::new()
            .name(format!("verify-{id}"))
            .spawn(move || {
                let outcome = verify_package(verifier.as_ref(), &path);
                let _ = messages.send(RegistryMessage::VerificationFinished { id: owner, outcome });
            });
        if let Err(e) = spawned {
            error!(id, error = %e, "Could not start verification");
            let _ = self.messages.send(RegistryMessage::VerificationFinished {
                id: id.to_string(),
                outcome: VerifyOutcome::Failed,
            });
        }
    }

    fn transfer_started(&self, state: &mut RegistryState) {
        state.active_transfers += 1;
        if state.active_transfers == 1 && !state.keep_alive_held {
            self.keep_alive.acquire();
            state.keep_alive_held = true;
        }
    }

    fn transfer_stopped(&self, state: &mut RegistryState) {
        if state.active_transfers == 0 {
            warn!("Transfer stopped with no active transfers");
            return;
        }
        state.active_transfers -= 1;
        if state.active_transfers == 0 && state.keep_alive_held {
            self.keep_alive.release();
            state.keep_alive_held = false;
        }
    }

    /// Stop the download of `id`, keeping the partial file.
    pub fn pause_download(&self, id: &str) {
        let mut pending = Pending::default();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(entry) = state.entries.get_mut(id) else {
                return;
            };
            let Some(handle) = entry.transfer.take() else {
                debug!(id, "Not downloading, nothing to pause");
                return;
            };
            handle.cancel();
            entry.stopping = Some(handle);
            entry.record.status = UpdateStatus::Paused;
            entry.record.clear_telemetry();
            state.throttles.remove(id);
            self.transfer_stopped(state);
            pending.changed(id);
            info!(id, "Download paused");
        }
        self.flush(pending);
    }

    /// Delete the package of `id`.
    ///
    /// Updates the catalog no longer lists leave the registry.
    pub fn delete_update(&self, id: &str) {
        let mut pending = Pending::default();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if self.is_busy(state, id) {
                warn!(id, "Cannot delete an update that is in use");
                return;
            }
            let Some(entry) = state.entries.get_mut(id) else {
                return;
            };

            let record = &mut entry.record;
            let path = record.file_path.take();
            record.status = UpdateStatus::Deleted;
            record.persistent_status = PersistentStatus::Unknown;
            record.progress_percent = 0;
            record.install_progress_percent = 0;
            record.bytes_on_disk = 0;
            record.is_finalizing = false;
            record.clear_telemetry();
            let online = record.available_online;
            pending.forget(id);
            if let Some(path) = path {
                self.spawn_delete(id, path);
            }

            if online {
                pending.changed(id);
            } else {
                state.entries.remove(id);
                state.throttles.remove(id);
                pending.event(EventKind::Removed, id);
            }
            info!(id, "Update deleted");
        }
        self.flush(pending);
    }

    /// Remove the package file of `id` on a worker thread.
    ///
    /// The file is first renamed so that a package arriving under the same
    /// name right away is not removed by the worker.
    fn spawn_delete(&self, id: &str, path: PathBuf) {
        let doomed = deleted_path(&path);
        let target = match fs::rename(&path, &doomed) {
            Ok(()) => doomed,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(id, path = %path.display(), error = %e, "Could not move package aside");
                path
            }
        };
        let spawned = thread::Builder::new()
            .name(format!("delete-{id}"))
            .spawn(move || remove_if_exists(&target));
        if let Err(e) = spawned {
            warn!(id, error = %e, "Could not start delete worker");
        }
    }

    fn is_busy(&self, state: &RegistryState, id: &str) -> bool {
        state.verifying.contains(id)
            || state
                .entries
                .get(id)
                .is_some_and(|entry| entry.transfer.is_some())
            || self.coordinator.is_installing(id)
    }

    // ------------------------------------------------------------------
    // Installation
    // ------------------------------------------------------------------

    /// Install the verified package of `id`.
    pub fn install_update(&self, id: &str) {
        let mut pending = Pending::default();
        let (path, previous) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if self.is_busy(state, id) {
                warn!(id, "Update is busy, not installing");
                return;
            }
            let Some(entry) = state.entries.get_mut(id) else {
                warn!(id, "Install requested for unknown update");
                return;
            };
            if entry.record.persistent_status != PersistentStatus::Verified {
                warn!(id, "Only verified updates can be installed");
                return;
            }
            let Some(path) = entry.record.file_path.clone() else {
                warn!(id, "Verified update has no file");
                return;
            };
            if self.coordinator.is_any_installing() || self.coordinator.needs_reboot_id().is_some() {
                warn!(id, "Installation rejected, another one is active or a reboot is pending");
                return;
            }

            let previous = entry.record.status;
            entry.record.status = UpdateStatus::Installing;
            entry.record.install_progress_percent = 0;
            entry.record.is_finalizing = false;
            pending.changed(id);
            (path, previous)
        };
        self.flush(pending);

        let result = self.coordinator.install(id, &path);
        let mut pending = Pending::default();
        {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.get_mut(id) else {
                return;
            };
            match result {
                Ok(start) => debug!(id, ?start, "Installation running"),
                Err(InstallError::AlreadyInstalling) => {
                    if entry.record.status == UpdateStatus::Installing {
                        entry.record.status = previous;
                        pending.changed(id);
                    }
                }
                Err(e) => {
                    warn!(id, error = %e, "Installation failed to start");
                    entry.record.status = UpdateStatus::InstallationFailed;
                    entry.record.install_progress_percent = 0;
                    pending.changed(id);
                }
            }
        }
        self.flush(pending);
    }

    /// Cancel the installation of `id`.
    pub fn cancel_install(&self, id: &str) {
        match self.coordinator.cancel(id) {
            Ok(CancelKind::Block) => self.set_install_status(id, UpdateStatus::InstallationCancelled, 0, false),
            Ok(CancelKind::Legacy) => debug!(id, "Cancellation requested"),
            Err(e) => warn!(id, error = %e, "Cannot cancel installation"),
        }
    }

    /// Suspend the block-based installation of `id`.
    pub fn suspend_install(&self, id: &str) {
        match self.coordinator.suspend(id) {
            Ok(()) => {
                let mut pending = Pending::default();
                if let Some(entry) = self.state.lock().entries.get_mut(id) {
                    entry.record.status = UpdateStatus::InstallationSuspended;
                    pending.changed(id);
                }
                self.flush(pending);
            }
            Err(e) => warn!(id, error = %e, "Cannot suspend installation"),
        }
    }

    /// Resume the suspended installation of `id`.
    pub fn resume_install(&self, id: &str) {
        match self.coordinator.resume(id) {
            Ok((progress, finalizing)) => {
                self.set_install_status(id, UpdateStatus::Installing, progress, finalizing)
            }
            Err(e) => warn!(id, error = %e, "Cannot resume installation"),
        }
    }

    fn set_install_status(&self, id: &str, status: UpdateStatus, progress: u8, finalizing: bool) {
        let mut pending = Pending::default();
        if let Some(entry) = self.state.lock().entries.get_mut(id) {
            entry.record.status = status;
            entry.record.install_progress_percent = progress;
            entry.record.is_finalizing = finalizing;
            pending.changed(id);
        }
        self.flush(pending);
    }

    /// Forward the performance mode preference to the block engine.
    pub fn set_performance_mode(&self, enabled: bool) {
        self.coordinator.set_performance_mode(enabled);
    }

    /// Forget the pending reboot after the device restarted.
    pub fn acknowledge_reboot(&self) {
        self.coordinator.acknowledge_reboot();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_update(&self, id: &str) -> Option<UpdateRecord> {
        self.state.lock().entries.get(id).map(|entry| entry.record.clone())
    }

    /// Every update, newest build first.
    pub fn list_updates(&self) -> Vec<UpdateRecord> {
        let mut records: Vec<UpdateRecord> = self
            .state
            .lock()
            .entries
            .values()
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by(|a, b| {
            b.build_timestamp
                .cmp(&a.build_timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    pub fn is_downloading(&self, id: &str) -> bool {
        self.state
            .lock()
            .entries
            .get(id)
            .is_some_and(|entry| entry.transfer.is_some())
    }

    pub fn has_active_downloads(&self) -> bool {
        self.state.lock().active_transfers > 0
    }

    pub fn is_verifying(&self, id: &str) -> bool {
        self.state.lock().verifying.contains(id)
    }

    pub fn is_any_verifying(&self) -> bool {
        !self.state.lock().verifying.is_empty()
    }

    pub fn is_installing(&self, id: &str) -> bool {
        self.coordinator.is_installing(id)
    }

    pub fn is_any_installing(&self) -> bool {
        self.coordinator.is_any_installing()
    }

    pub fn is_waiting_for_reboot(&self, id: &str) -> bool {
        self.coordinator.is_waiting_for_reboot(id)
    }

    // ------------------------------------------------------------------
    // Daemon side
    // ------------------------------------------------------------------

    pub(crate) fn apply(&self, message: RegistryMessage) {
        match message {
            RegistryMessage::Transfer { id, job, event } => self.on_transfer_event(&id, job, event),
            RegistryMessage::VerificationFinished { id, outcome } => {
                self.on_verification_finished(&id, outcome)
            }
            RegistryMessage::Install { id, change } => self.on_install_change(&id, change),
            RegistryMessage::Engine(event) => self.on_engine_event(event),
        }
    }

    fn on_transfer_event(&self, id: &str, job: JobId, event: TransferEvent) {
        let mut pending = Pending::default();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(entry) = state.entries.get_mut(id) else {
                return;
            };
            if entry.transfer.as_ref().map(TransferHandle::job_id) != Some(job) {
                trace!(id, job = job.0, "Ignoring event of a stale transfer");
                return;
            }

            match event {
                TransferEvent::Headers(headers) => {
                    let record = &mut entry.record;
                    if let Some(length) = content_length(&headers) {
                        record.expected_size = record.expected_size.max(length);
                    }
                    record.status = UpdateStatus::Downloading;
                    record.persistent_status = PersistentStatus::Incomplete;
                    pending.persist(record);
                    pending.changed(id);
                }
                TransferEvent::Progress(progress) => {
                    let record = &mut entry.record;
                    let total = if progress.total_bytes > 0 {
                        progress.total_bytes
                    } else {
                        record.expected_size
                    };
                    record.bytes_on_disk = progress.bytes_read;
                    record.progress_percent = UpdateRecord::percent_of(progress.bytes_read, total);
                    record.speed = progress.speed;
                    record.eta = progress.eta;
                    let percent = record.progress_percent;
                    let interval = self.config.progress_interval;
                    let throttle = state
                        .throttles
                        .entry(id.to_string())
                        .or_insert_with(|| ProgressThrottle::new(interval));
                    if throttle.should_emit(percent, Instant::now()) || progress.terminal {
                        pending.event(EventKind::DownloadProgress, id);
                    }
                }
                TransferEvent::Succeeded => {
                    entry.transfer = None;
                    entry.record.status = UpdateStatus::Verifying;
                    entry.record.clear_telemetry();
                    let path = entry.record.file_path.clone();
                    state.throttles.remove(id);
                    self.transfer_stopped(state);
                    match path {
                        Some(path) => {
                            state.verifying.insert(id.to_string());
                            self.spawn_verification(id, path);
                        }
                        None => error!(id, "Finished download has no file"),
                    }
                    pending.changed(id);
                }
                TransferEvent::Failed { cancelled } => {
                    entry.transfer = None;
                    entry.record.status = if cancelled {
                        UpdateStatus::Paused
                    } else {
                        UpdateStatus::PausedError
                    };
                    entry.record.clear_telemetry();
                    state.throttles.remove(id);
                    self.transfer_stopped(state);
                    pending.changed(id);
                }
            }
        }
        self.flush(pending);
    }

    fn on_verification_finished(&self, id: &str, outcome: VerifyOutcome) {
        let mut pending = Pending::default();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.verifying.remove(id);
            let Some(entry) = state.entries.get_mut(id) else {
                return;
            };
            let record = &mut entry.record;
            match outcome {
                VerifyOutcome::Ok => {
                    if let Some(length) = record
                        .file_path
                        .as_deref()
                        .and_then(|path| fs::metadata(path).ok())
                        .map(|m| m.len())
                    {
                        record.expected_size = length;
                        record.bytes_on_disk = length;
                    }
                    record.status = UpdateStatus::Verified;
                    record.persistent_status = PersistentStatus::Verified;
                    record.progress_percent = 100;
                    pending.persist(record);
                    info!(id, "Package verified");
                }
                VerifyOutcome::Failed => {
                    record.status = UpdateStatus::VerificationFailed;
                    record.persistent_status = PersistentStatus::Unknown;
                    record.progress_percent = 0;
                    record.bytes_on_disk = 0;
                    record.file_path = None;
                    pending.forget(id);
                    warn!(id, "Package verification failed");
                }
            }
            pending.changed(id);
        }
        self.flush(pending);
    }

    fn on_install_change(&self, id: &str, change: InstallChange) {
        let mut pending = Pending::default();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(entry) = state.entries.get_mut(id) else {
                return;
            };
            match change {
                InstallChange::Progress(percent) => {
                    entry.record.install_progress_percent = percent;
                    let interval = self.config.progress_interval;
                    let throttle = state
                        .throttles
                        .entry(id.to_string())
                        .or_insert_with(|| ProgressThrottle::new(interval));
                    if throttle.should_emit(percent, Instant::now()) {
                        pending.event(EventKind::InstallProgress, id);
                    }
                }
                InstallChange::Finished(outcome) => {
                    entry.record.status = match outcome {
                        InstallOutcome::Installed => UpdateStatus::Installed,
                        InstallOutcome::Failed => UpdateStatus::InstallationFailed,
                        InstallOutcome::Cancelled => UpdateStatus::InstallationCancelled,
                    };
                    entry.record.install_progress_percent = 0;
                    state.throttles.remove(id);
                    pending.changed(id);
                }
            }
        }
        self.flush(pending);
    }

    fn on_engine_event(&self, event: EngineEvent) {
        let Some(update) = self.coordinator.handle_engine_event(event) else {
            return;
        };
        let mut pending = Pending::default();
        let mut applied = None;
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match update {
                BlockUpdate::Progress {
                    id,
                    percent,
                    finalizing,
                } => match state.entries.get_mut(&id) {
                    Some(entry) => {
                        if entry.record.status != UpdateStatus::InstallationSuspended {
                            entry.record.status = UpdateStatus::Installing;
                        }
                        entry.record.install_progress_percent = percent;
                        entry.record.is_finalizing = finalizing;
                        let interval = self.config.progress_interval;
                        let throttle = state
                            .throttles
                            .entry(id.clone())
                            .or_insert_with(|| ProgressThrottle::new(interval));
                        if throttle.should_emit(percent, Instant::now()) {
                            pending.event(EventKind::InstallProgress, &id);
                        }
                    }
                    None => {
                        debug!(id = %id, "Engine is installing an unknown update");
                        self.coordinator.installation_done(false);
                    }
                },
                BlockUpdate::Installed { id } => {
                    if let Some(entry) = state.entries.get_mut(&id) {
                        entry.record.status = UpdateStatus::Installed;
                        entry.record.install_progress_percent = 0;
                        entry.record.is_finalizing = false;
                        pending.changed(&id);
                    }
                    state.throttles.remove(&id);
                    info!(id = %id, "Installation finished, reboot required");
                    applied = Some(id);
                }
                BlockUpdate::Failed { id } => {
                    if let Some(entry) = state.entries.get_mut(&id) {
                        entry.record.status = UpdateStatus::InstallationFailed;
                        entry.record.install_progress_percent = 0;
                        entry.record.is_finalizing = false;
                        pending.changed(&id);
                    }
                    state.throttles.remove(&id);
                    warn!(id = %id, "Installation failed");
                }
                BlockUpdate::Cleared { id } => {
                    if let Some(entry) = state.entries.get_mut(&id) {
                        entry.record.status = match entry.record.persistent_status {
                            PersistentStatus::Verified => UpdateStatus::Verified,
                            _ => UpdateStatus::Unknown,
                        };
                        entry.record.install_progress_percent = 0;
                        entry.record.is_finalizing = false;
                        pending.changed(&id);
                    }
                    state.throttles.remove(&id);
                    info!(id = %id, "Installation no longer running");
                }
            }
        }
        self.flush(pending);

        if let Some(id) = applied.filter(|_| self.config.auto_delete) {
            info!(id = %id, "Deleting applied package");
            self.delete_update(&id);
        }
    }

    /// Cancel every transfer. Called when the daemon stops.
    pub(crate) fn shutdown(&self) {
        let mut pending = Pending::default();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut stopped = 0;
            for (id, entry) in state.entries.iter_mut() {
                if let Some(handle) = entry.transfer.take() {
                    handle.cancel();
                    entry.record.status = UpdateStatus::Paused;
                    entry.record.clear_telemetry();
                    pending.changed(id);
                    stopped += 1;
                }
            }
            for _ in 0..stopped {
                self.transfer_stopped(state);
            }
            state.throttles.clear();
        }
        self.flush(pending);
    }
}

/// Name a package file is moved to before the delete worker removes it.
fn deleted_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".deleted");
    PathBuf::from(name)
}

/// File name to download `record` to.
fn package_file_name(record: &UpdateRecord) -> String {
    Path::new(&record.name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("{}.zip", record.id))
}

/// Rebuild the runtime status of a persisted record from its file.
///
/// Returns false when the file does not back the persisted status.
fn reconcile_with_disk(record: &mut UpdateRecord) -> bool {
    let length = match record.file_path.as_deref().map(fs::metadata) {
        Some(Ok(metadata)) if metadata.is_file() => metadata.len(),
        _ => return false,
    };
    match record.persistent_status {
        PersistentStatus::Incomplete => {
            record.status = UpdateStatus::Paused;
            record.bytes_on_disk = length;
            record.progress_percent = UpdateRecord::percent_of(length, record.expected_size);
            true
        }
        PersistentStatus::Verified if length == record.expected_size => {
            record.status = UpdateStatus::Verified;
            record.bytes_on_disk = length;
            record.progress_percent = 100;
            true
        }
        _ => false,
    }
}
