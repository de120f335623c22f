//! Installer error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Problems reading a package archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a readable archive: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("{path} has no entry named {entry}")]
    MissingEntry { path: PathBuf, entry: String },

    #[error("cannot read {entry} from {path}: {reason}")]
    Entry {
        path: PathBuf,
        entry: String,
        reason: String,
    },
}

/// Failure reported by a privileged install primitive.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The host has no such installer.
    #[error("{0} is not available on this host")]
    Unavailable(&'static str),

    /// The installer refused the request.
    #[error("{operation} rejected: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    #[error("installer I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Why an install command could not be carried out.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Another installation is running or a reboot is pending.
    #[error("an installation is already in progress")]
    AlreadyInstalling,

    /// The command targets an update that is not being installed.
    #[error("update {0} is not being installed")]
    NotInstalling(String),

    /// The running installation cannot be cancelled any more.
    #[error("installation of {0} cannot be cancelled")]
    NotCancellable(String),

    #[error("could not bind to the update engine")]
    BindFailed,

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("installation cancelled")]
    Cancelled,

    #[error("{0} panicked")]
    Panicked(&'static str),
}
