//! Messages posted to the registry daemon by worker threads.

use crate::install::{EngineEvent, InstallOutcome};
use crate::transfer::{JobId, TransferEvent};
use crate::verify::VerifyOutcome;

/// Progress of a legacy installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstallChange {
    Progress(u8),
    Finished(InstallOutcome),
}

/// Work for the daemon. Applied strictly in arrival order.
#[derive(Debug)]
pub(crate) enum RegistryMessage {
    Transfer {
        id: String,
        job: JobId,
        event: TransferEvent,
    },
    VerificationFinished {
        id: String,
        outcome: VerifyOutcome,
    },
    Install {
        id: String,
        change: InstallChange,
    },
    Engine(EngineEvent),
}
