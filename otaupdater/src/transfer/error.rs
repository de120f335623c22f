//! Transfer error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a transfer could not complete.
///
/// The registry never shows these to callers; they end up in the log and the
/// update lands in `PausedError`.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A resume was requested but the partial file is gone.
    #[error("cannot resume, {path} is missing: {source}")]
    MissingDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The request could not be sent or no response was received.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The server answered with a status the transfer cannot use.
    #[error("{url} replied with status {status}")]
    UnexpectedStatus { url: String, status: u16 },

    /// A redirect target was unusable.
    #[error("cannot follow redirect to {url}: {reason}")]
    Redirect { url: String, reason: String },

    /// Reading the response body failed.
    #[error("reading body of {url} failed: {source}")]
    Read {
        url: String,
        #[source]
        source: io::Error,
    },

    /// Writing to the destination file failed.
    #[error("writing {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    /// The worker thread could not be started.
    #[error("failed to spawn transfer thread: {0}")]
    Spawn(#[source] io::Error),

    /// The transfer was cancelled.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Whether the error came from a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
