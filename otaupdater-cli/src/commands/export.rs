//! Copying a verified package out of the download directory.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use otaupdater::export::export_update;

use super::format_size;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Copy the verified package of `id` to `destination` (Ctrl-C cancels).
pub fn run_export(runner: &CliRunner, id: &str, destination: &Path) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .map_err(|e| CliError::Runtime(format!("Failed to set signal handler: {}", e)))?;

    let session = runner.open_session()?;
    let bar = ProgressBar::new(100);
    let bar_style = ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━");
    bar.set_style(bar_style);
    bar.set_prefix(id.to_string());

    let result = export_update(&session.registry, id, destination, &cancel, &mut |percent| {
        bar.set_position(u64::from(percent))
    });
    bar.finish_and_clear();
    runner.close_session(session);

    let target = result?;
    let size = std::fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
    println!("Exported {} to {} ({})", id, target.display(), format_size(size));
    Ok(())
}
