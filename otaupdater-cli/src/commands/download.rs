//! Downloading packages with a progress bar.
//!
//! Ctrl-C pauses the download; the partial file is kept so that
//! `otaupdater resume <id>` can continue it later.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use otaupdater::model::{UpdateRecord, UpdateStatus};

use super::{interrupt_flag, require_update, wait_for};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Start a fresh download of `id`.
pub fn run_download(runner: &CliRunner, id: &str) -> Result<(), CliError> {
    run(runner, id, false)
}

/// Continue the paused download of `id`.
pub fn run_resume(runner: &CliRunner, id: &str) -> Result<(), CliError> {
    run(runner, id, true)
}

fn run(runner: &CliRunner, id: &str, resume: bool) -> Result<(), CliError> {
    let interrupted = interrupt_flag()?;
    let session = runner.open_online_session()?;
    let registry = &session.registry;

    let result = require_update(registry, id).and_then(|update| {
        if update.status == UpdateStatus::Verified {
            println!("{} is already downloaded and verified", id);
            return Ok(update);
        }
        if update.is_local_only() {
            return Err(CliError::Download(format!(
                "'{}' is not listed by the catalog; run 'otaupdater refresh' first",
                id
            )));
        }

        if resume {
            registry.resume_download(id);
        } else {
            registry.start_download(id);
        }

        let bar = progress_bar(&update);
        let record = wait_for(
            registry,
            id,
            &interrupted,
            || {
                bar.set_message("pausing");
                registry.pause_download(id);
            },
            |record| update_bar(&bar, record),
            is_settled,
        )?;
        bar.finish_and_clear();
        Ok(record)
    });

    runner.close_session(session);
    let record = result?;
    report(&record)
}

/// Whether the download has come to rest.
fn is_settled(record: &UpdateRecord) -> bool {
    matches!(
        record.status,
        UpdateStatus::Verified
            | UpdateStatus::VerificationFailed
            | UpdateStatus::Paused
            | UpdateStatus::PausedError
    )
}

fn report(record: &UpdateRecord) -> Result<(), CliError> {
    match record.status {
        UpdateStatus::Verified => {
            println!("{} {}", style("Downloaded and verified").green(), record.id);
            if let Some(path) = &record.file_path {
                println!("  {}", path.display());
            }
            Ok(())
        }
        UpdateStatus::Paused => {
            println!(
                "Paused at {}%. Run 'otaupdater resume {}' to continue.",
                record.progress_percent, record.id
            );
            Ok(())
        }
        UpdateStatus::PausedError => Err(CliError::Download(format!(
            "transfer of '{}' stopped with an error; run 'otaupdater resume {}' to retry",
            record.id, record.id
        ))),
        _ => Err(CliError::Download(format!(
            "package of '{}' failed verification and was deleted",
            record.id
        ))),
    }
}

fn progress_bar(update: &UpdateRecord) -> ProgressBar {
    let bar = ProgressBar::new(update.expected_size);
    let bar_style = ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━");
    bar.set_style(bar_style);
    bar.set_prefix(update.id.clone());
    bar
}

fn update_bar(bar: &ProgressBar, record: &UpdateRecord) {
    if record.expected_size > 0 {
        bar.set_length(record.expected_size);
    }
    bar.set_position(record.bytes_on_disk);
    let message = match (record.status, record.speed, record.eta) {
        (UpdateStatus::Verifying, _, _) => "verifying".to_string(),
        (UpdateStatus::Downloading, Some(speed), Some(eta)) => format!(
            "{}/s, {}s left",
            super::format_size(speed),
            eta.as_secs()
        ),
        (status, _, _) => status.name().to_string(),
    };
    bar.set_message(message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_statuses() {
        let mut record = UpdateRecord::new("rom-42");
        for status in [UpdateStatus::Starting, UpdateStatus::Downloading, UpdateStatus::Verifying] {
            record.status = status;
            assert!(!is_settled(&record));
        }
        for status in [UpdateStatus::Verified, UpdateStatus::Paused, UpdateStatus::PausedError] {
            record.status = status;
            assert!(is_settled(&record));
        }
    }

    #[test]
    fn test_report_paused_is_not_an_error() {
        let mut record = UpdateRecord::new("rom-42");
        record.status = UpdateStatus::Paused;
        assert!(report(&record).is_ok());
        record.status = UpdateStatus::PausedError;
        assert!(matches!(report(&record), Err(CliError::Download(_))));
    }
}
