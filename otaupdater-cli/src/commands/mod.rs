//! CLI command implementations.
//!
//! - `updates`: listing, catalog refresh, status and deletion
//! - `download`: downloads with a progress bar
//! - `install`: local import and installation
//! - `export`: copying a verified package elsewhere
//! - `config`: configuration file inspection

pub mod config;
pub mod download;
pub mod export;
pub mod install;
pub mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use otaupdater::model::UpdateRecord;
use otaupdater::registry::UpdateRegistry;

use crate::error::CliError;

/// How often waiting commands poll the registry.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Flag raised by Ctrl-C.
pub(crate) fn interrupt_flag() -> Result<Arc<AtomicBool>, CliError> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Runtime(format!("Failed to set signal handler: {}", e)))?;
    Ok(flag)
}

/// Poll `id` until `done` accepts it.
///
/// `tick` sees every snapshot. When `interrupted` is raised `on_interrupt`
/// runs once and waiting continues until `done` holds.
pub(crate) fn wait_for(
    registry: &UpdateRegistry,
    id: &str,
    interrupted: &AtomicBool,
    mut on_interrupt: impl FnMut(),
    mut tick: impl FnMut(&UpdateRecord),
    done: impl Fn(&UpdateRecord) -> bool,
) -> Result<UpdateRecord, CliError> {
    let mut interrupt_sent = false;
    loop {
        let record = registry
            .get_update(id)
            .ok_or_else(|| CliError::UnknownUpdate(id.to_string()))?;
        tick(&record);
        if done(&record) {
            return Ok(record);
        }
        if !interrupt_sent && interrupted.load(Ordering::SeqCst) {
            interrupt_sent = true;
            on_interrupt();
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Look up `id` or fail with [`CliError::UnknownUpdate`].
pub(crate) fn require_update(registry: &UpdateRegistry, id: &str) -> Result<UpdateRecord, CliError> {
    registry
        .get_update(id)
        .ok_or_else(|| CliError::UnknownUpdate(id.to_string()))
}

/// Human readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
