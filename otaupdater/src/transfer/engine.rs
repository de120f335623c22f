//! Resumable single-file transfer.
//!
//! A [`TransferJob`] streams one URL into one file on the calling thread and
//! reports everything it does through a [`TransferReporter`]. The registry
//! runs jobs on their own thread via [`spawn_transfer`] and keeps the
//! returned [`TransferHandle`] to cancel them.
//!
//! ```text
//!   TransferJob::run
//!        │
//!        ├── open destination (resume: must exist)
//!        ├── GET  ──3xx──► Location, then rel=duplicate mirrors
//!        ├── Headers
//!        ├── loop: read 64 KiB ─► cancelled? ─► write ─► Progress
//!        ├── Progress { terminal: true }
//!        └── Succeeded | Failed { cancelled }
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::links::duplicate_links;
use super::speed::SpeedEstimator;
use super::transport::{HttpResponse, HttpTransport};

/// Buffer size for reading/writing during transfers (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Identifies one run of a transfer.
///
/// A fresh id is handed out every time a download is started or resumed, so
/// events from a cancelled job can be told apart from its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Append to the existing file using a range request.
    pub resume: bool,
}

/// Snapshot of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_read: u64,
    pub total_bytes: u64,
    /// Bytes per second, unknown until the first sample interval passed.
    pub speed: Option<u64>,
    pub eta: Option<Duration>,
    /// The final snapshot after the body loop ended.
    pub terminal: bool,
}

/// Everything a transfer reports, in order.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// The final response's headers, before any body byte.
    Headers(HeaderMap),
    Progress(TransferProgress),
    Succeeded,
    Failed { cancelled: bool },
}

/// Receives the events of one transfer.
pub type TransferReporter = Box<dyn FnMut(TransferEvent) + Send>;

/// A single transfer, run synchronously.
pub struct TransferJob {
    request: TransferRequest,
    transport: Arc<dyn HttpTransport>,
    cancel: CancellationToken,
}

impl TransferJob {
    /// Create a job for `request`.
    pub fn new(request: TransferRequest, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            request,
            transport,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels this job when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the transfer to completion on the current thread.
    ///
    /// Always ends with exactly one `Succeeded` or `Failed` event.
    pub fn run(self, report: &mut dyn FnMut(TransferEvent)) {
        match self.execute(report) {
            Ok(()) => {
                info!(url = %self.request.url, "Transfer finished");
                report(TransferEvent::Succeeded);
            }
            Err(e) => {
                let cancelled = e.is_cancelled() || self.cancel.is_cancelled();
                if cancelled {
                    debug!(url = %self.request.url, "Transfer cancelled");
                } else {
                    warn!(url = %self.request.url, error = %e, "Transfer failed");
                }
                report(TransferEvent::Failed { cancelled });
            }
        }
    }

    fn execute(&self, report: &mut dyn FnMut(TransferEvent)) -> Result<(), TransferError> {
        let destination = &self.request.destination;
        let already_read = if self.request.resume {
            fs::metadata(destination)
                .map_err(|e| TransferError::MissingDestination {
                    path: destination.clone(),
                    source: e,
                })?
                .len()
        } else {
            0
        };

        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let range = self.request.resume.then_some(already_read);
        let mut response = self.connect(range)?;
        report(TransferEvent::Headers(response.headers.clone()));

        if self.request.resume {
            if response.status != StatusCode::PARTIAL_CONTENT {
                return Err(TransferError::UnexpectedStatus {
                    url: self.request.url.clone(),
                    status: response.status.as_u16(),
                });
            }
            debug!(offset = already_read, "Server fulfilled the range request");
        } else if !response.status.is_success() {
            return Err(TransferError::UnexpectedStatus {
                url: self.request.url.clone(),
                status: response.status.as_u16(),
            });
        }

        let total = response
            .content_length()
            .map_or(0, |len| len.saturating_add(already_read));
        let file = self.open_destination()?;
        self.stream(&mut response, file, already_read, total, report)
    }

    fn open_destination(&self) -> Result<File, TransferError> {
        let path = &self.request.destination;
        let mut options = OpenOptions::new();
        if self.request.resume {
            options.append(true);
        } else {
            options.write(true).create(true).truncate(true);
        }
        options.open(path).map_err(|e| TransferError::Write {
            path: path.clone(),
            source: e,
        })
    }

    fn stream(
        &self,
        response: &mut HttpResponse,
        mut file: File,
        already_read: u64,
        total: u64,
        report: &mut dyn FnMut(TransferEvent),
    ) -> Result<(), TransferError> {
        let mut estimator = SpeedEstimator::new(already_read, Instant::now());
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut bytes_read = already_read;

        let result = loop {
            if self.cancel.is_cancelled() {
                break Err(TransferError::Cancelled);
            }
            let count = match response.body.read(&mut buffer) {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    break Err(TransferError::Read {
                        url: self.request.url.clone(),
                        source: e,
                    })
                }
            };
            if self.cancel.is_cancelled() {
                break Err(TransferError::Cancelled);
            }
            if let Err(e) = file.write_all(&buffer[..count]) {
                break Err(TransferError::Write {
                    path: self.request.destination.clone(),
                    source: e,
                });
            }

            bytes_read += count as u64;
            estimator.sample(bytes_read, Instant::now());
            report(TransferEvent::Progress(snapshot(
                &estimator, bytes_read, total, false,
            )));
        };

        let flushed = file.flush().map_err(|e| TransferError::Write {
            path: self.request.destination.clone(),
            source: e,
        });
        report(TransferEvent::Progress(snapshot(
            &estimator, bytes_read, total, true,
        )));
        result.and(flushed)
    }

    /// Send the request, resolving a redirect by trying the `Location`
    /// target and then every announced mirror.
    fn connect(&self, range: Option<u64>) -> Result<HttpResponse, TransferError> {
        let url = &self.request.url;
        let response = self.transport.get(url, range)?;
        if !response.status.is_redirection() {
            return Ok(response);
        }

        let origin = Url::parse(url).map_err(|e| TransferError::Redirect {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let mut candidates = Vec::new();
        if let Some(location) = response.headers.get(LOCATION).and_then(|v| v.to_str().ok()) {
            candidates.push(location.to_string());
        }
        candidates.extend(duplicate_links(&response.headers));
        drop(response);

        let mut last_error = TransferError::Redirect {
            url: url.clone(),
            reason: "no redirect target".to_string(),
        };
        for candidate in candidates {
            match self.try_candidate(&origin, &candidate, range) {
                Ok(response) => return Ok(response),
                Err(TransferError::Cancelled) => return Err(TransferError::Cancelled),
                Err(e) => {
                    warn!(candidate = %candidate, error = %e, "Redirect target failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn try_candidate(
        &self,
        origin: &Url,
        candidate: &str,
        range: Option<u64>,
    ) -> Result<HttpResponse, TransferError> {
        let target = origin.join(candidate).map_err(|e| TransferError::Redirect {
            url: candidate.to_string(),
            reason: e.to_string(),
        })?;
        if target.scheme() != origin.scheme() {
            return Err(TransferError::Redirect {
                url: target.to_string(),
                reason: "protocol changes are not allowed".to_string(),
            });
        }
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        debug!(url = %target, "Downloading from redirect target");
        let response = self.transport.get(target.as_str(), range)?;
        if !response.status.is_success() {
            return Err(TransferError::UnexpectedStatus {
                url: target.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn snapshot(estimator: &SpeedEstimator, bytes_read: u64, total: u64, terminal: bool) -> TransferProgress {
    TransferProgress {
        bytes_read,
        total_bytes: total,
        speed: estimator.speed(),
        eta: estimator.eta(total, bytes_read),
        terminal,
    }
}

/// A transfer running on its own thread.
#[derive(Debug)]
pub struct TransferHandle {
    job: JobId,
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl TransferHandle {
    /// The job this handle controls.
    pub fn job_id(&self) -> JobId {
        self.job
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker thread to exit.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(job = self.job.0, "Transfer thread panicked");
            }
        }
    }
}

/// Start `request` on a new thread.
pub fn spawn_transfer(
    job: JobId,
    request: TransferRequest,
    transport: Arc<dyn HttpTransport>,
    mut reporter: TransferReporter,
) -> Result<TransferHandle, TransferError> {
    let transfer = TransferJob::new(request, transport);
    let cancel = transfer.cancel_token();
    let thread = thread::Builder::new()
        .name(format!("transfer-{}", job.0))
        .spawn(move || transfer.run(&mut *reporter))
        .map_err(TransferError::Spawn)?;

    Ok(TransferHandle {
        job,
        cancel,
        thread: Some(thread),
    })
}
