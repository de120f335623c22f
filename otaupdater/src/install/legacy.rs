//! Recovery-based ("legacy") installation.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{EngineError, InstallError};

/// Extension of the copy handed to recovery when the package cannot be
/// used in place.
pub const UNCRYPT_EXTENSION: &str = "uncrypt";

/// Minimum time between two copy progress reports.
pub const COPY_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Privileged recovery installer.
pub trait RecoveryInstaller: Send + Sync {
    /// Hand the package at `path` to recovery.
    fn install_package(&self, path: &Path) -> Result<(), EngineError>;

    /// Whether the package must first be copied to a location recovery can
    /// read.
    fn requires_copy(&self, path: &Path) -> bool;
}

/// Runs an external command with the package path as last argument.
#[derive(Debug, Clone)]
pub struct CommandRecoveryInstaller {
    program: String,
    args: Vec<String>,
    copy_before_install: bool,
}

impl CommandRecoveryInstaller {
    /// Parse `command` as a whitespace-separated program and arguments.
    pub fn new(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            copy_before_install: false,
        })
    }

    /// Copy the package to an `.uncrypt` file before installing it.
    pub fn with_copy_before_install(mut self, copy: bool) -> Self {
        self.copy_before_install = copy;
        self
    }
}

impl RecoveryInstaller for CommandRecoveryInstaller {
    fn install_package(&self, path: &Path) -> Result<(), EngineError> {
        info!(program = %self.program, package = %path.display(), "Invoking recovery installer");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Rejected {
                operation: "recovery install",
                reason: status.to_string(),
            })
        }
    }

    fn requires_copy(&self, _path: &Path) -> bool {
        self.copy_before_install
    }
}

/// Installer for hosts without recovery support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedRecoveryInstaller;

impl RecoveryInstaller for UnsupportedRecoveryInstaller {
    fn install_package(&self, _path: &Path) -> Result<(), EngineError> {
        Err(EngineError::Unavailable("recovery installer"))
    }

    fn requires_copy(&self, _path: &Path) -> bool {
        false
    }
}

/// Path of the recovery copy of `package`.
pub fn uncrypt_path(package: &Path) -> PathBuf {
    let mut name = package.as_os_str().to_owned();
    name.push(".");
    name.push(UNCRYPT_EXTENSION);
    PathBuf::from(name)
}

/// Copy `source` to `destination`, reporting whole-percent progress.
///
/// A report is made when the percentage changed and at least
/// [`COPY_PROGRESS_INTERVAL`] passed since the previous one; 100 is always
/// reported at the end. On cancellation or error the partial copy is
/// removed.
pub fn copy_with_progress(
    source: &Path,
    destination: &Path,
    cancel: &CancellationToken,
    on_progress: &mut dyn FnMut(u8),
) -> Result<(), InstallError> {
    let result = copy_inner(source, destination, cancel, on_progress);
    if result.is_err() {
        match fs::remove_file(destination) {
            Ok(()) => debug!(path = %destination.display(), "Removed partial copy"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => debug!(path = %destination.display(), error = %e, "Could not remove partial copy"),
        }
    }
    result
}

fn copy_inner(
    source: &Path,
    destination: &Path,
    cancel: &CancellationToken,
    on_progress: &mut dyn FnMut(u8),
) -> Result<(), InstallError> {
    let mut input = File::open(source).map_err(io_error(source))?;
    let total = input.metadata().map_err(io_error(source))?.len();
    let mut output = File::create(destination).map_err(io_error(destination))?;

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    let mut last_percent = 0u8;
    let mut last_report = Instant::now();

    loop {
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }
        let count = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_error(source)(e)),
        };
        output.write_all(&buffer[..count]).map_err(io_error(destination))?;
        copied += count as u64;

        let percent = if total == 0 {
            100
        } else {
            ((copied as f64 * 100.0 / total as f64).round() as u64).min(100) as u8
        };
        if percent != last_percent && last_report.elapsed() >= COPY_PROGRESS_INTERVAL {
            on_progress(percent);
            last_percent = percent;
            last_report = Instant::now();
        }
    }

    output.flush().map_err(io_error(destination))?;
    on_progress(100);
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> InstallError {
    let path = path.to_path_buf();
    move |source| InstallError::Io { path, source }
}
