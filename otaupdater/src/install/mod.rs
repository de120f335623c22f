//! Package installation.
//!
//! Two mutually exclusive backends sit behind the [`InstallCoordinator`]:
//! the block-based engine (`block`) for packages carrying `payload.bin`,
//! and the recovery installer (`legacy`) for everything else. The
//! `archive` helpers read what both need from the package; `markers`
//! persists block install state across restarts.

mod archive;
mod block;
mod coordinator;
mod error;
mod legacy;
mod markers;

pub use archive::{
    is_block_based, payload_offset, read_metadata_timestamp, read_properties, METADATA_ENTRY,
    PAYLOAD_BIN, PAYLOAD_PROPERTIES,
};
pub use block::{
    BlockEngine, EngineCallback, EngineErrorCode, EngineEvent, EngineState, UnsupportedBlockEngine,
};
pub(crate) use coordinator::BlockUpdate;
pub use coordinator::{CancelKind, InstallCoordinator, InstallOutcome, InstallStart};
pub use error::{ArchiveError, EngineError, InstallError};
pub use legacy::{
    copy_with_progress, uncrypt_path, CommandRecoveryInstaller, RecoveryInstaller,
    UnsupportedRecoveryInstaller, UNCRYPT_EXTENSION,
};
pub use markers::{InstallMarkers, MarkerFile, MARKER_FILE};
