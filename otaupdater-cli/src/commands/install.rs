//! Importing and installing packages.

use std::path::Path;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use otaupdater::import::import_local_package;
use otaupdater::model::{PersistentStatus, UpdateRecord, UpdateStatus};

use super::{format_size, interrupt_flag, require_update, wait_for};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Copy `file` into the download directory as the local update.
pub fn run_import(runner: &CliRunner, file: &Path) -> Result<(), CliError> {
    println!("Importing {}", file.display());
    let session = runner.open_session()?;
    let result = import_local_package(&session.registry, file);
    runner.close_session(session);
    let record = result?;

    println!(
        "Imported {} ({}), install it with 'otaupdater install {}'",
        record.version,
        format_size(record.expected_size),
        record.id
    );
    Ok(())
}

/// Install a verified update and wait for the outcome.
///
/// Ctrl-C asks the installer to cancel.
pub fn run_install(runner: &CliRunner, id: &str) -> Result<(), CliError> {
    let interrupted = interrupt_flag()?;
    let session = runner.open_session()?;
    let registry = &session.registry;

    let result = require_update(registry, id).and_then(|update| {
        if update.persistent_status != PersistentStatus::Verified {
            return Err(CliError::Install(format!(
                "'{}' has no verified package; download it first",
                id
            )));
        }
        if registry.is_waiting_for_reboot(id) {
            println!("{} is already installed. Reboot the device to finish the update.", id);
            return Ok(update);
        }

        registry.install_update(id);
        let bar = ProgressBar::new(100);
        let bar_style = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸━");
        bar.set_style(bar_style);
        bar.set_prefix(id.to_string());

        let record = wait_for(
            registry,
            id,
            &interrupted,
            || {
                bar.set_message("cancelling");
                registry.cancel_install(id);
            },
            |record| {
                bar.set_position(u64::from(record.install_progress_percent));
                if record.is_finalizing {
                    bar.set_message("finalizing");
                }
            },
            |record| is_finished(record.status),
        )?;
        bar.finish_and_clear();
        Ok(record)
    });

    let waiting = registry.is_waiting_for_reboot(id);
    runner.close_session(session);
    report(&result?, waiting)
}

fn is_finished(status: UpdateStatus) -> bool {
    !matches!(
        status,
        UpdateStatus::Installing | UpdateStatus::InstallationSuspended
    )
}

fn report(record: &UpdateRecord, waiting_for_reboot: bool) -> Result<(), CliError> {
    match record.status {
        UpdateStatus::Installed if waiting_for_reboot => {
            println!(
                "{} {}. Reboot the device to finish the update.",
                style("Installed").green(),
                record.id
            );
            Ok(())
        }
        UpdateStatus::Installed => {
            println!("Handed {} to recovery.", record.id);
            Ok(())
        }
        UpdateStatus::InstallationCancelled => {
            println!("Installation of {} cancelled.", record.id);
            Ok(())
        }
        UpdateStatus::Verified => Err(CliError::Install(format!(
            "'{}' was not started; another installation is active or a reboot is pending",
            record.id
        ))),
        status => Err(CliError::Install(format!("'{}' ended as {}", record.id, status))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_finished() {
        assert!(!is_finished(UpdateStatus::Installing));
        assert!(!is_finished(UpdateStatus::InstallationSuspended));
        assert!(is_finished(UpdateStatus::Installed));
        assert!(is_finished(UpdateStatus::InstallationFailed));
        assert!(is_finished(UpdateStatus::Verified));
    }

    #[test]
    fn test_report_failure_is_error() {
        let mut record = UpdateRecord::new("local");
        record.status = UpdateStatus::InstallationFailed;
        assert!(matches!(report(&record, false), Err(CliError::Install(_))));
        record.status = UpdateStatus::Installed;
        assert!(report(&record, true).is_ok());
    }
}
