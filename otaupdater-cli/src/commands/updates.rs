//! Listing, refreshing and deleting updates.

use chrono::DateTime;

use otaupdater::catalog::Catalog;
use otaupdater::model::UpdateRecord;

use super::{format_size, require_update};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Print every known update, newest first.
pub fn run_list(runner: &CliRunner) -> Result<(), CliError> {
    let session = runner.open_online_session()?;
    let updates = session.registry.list_updates();
    runner.close_session(session);

    if updates.is_empty() {
        println!("No updates known. Run 'otaupdater refresh' to query the catalog.");
        return Ok(());
    }

    println!("{:<28} {:<12} {:<10} {:<22} {:>10}", "ID", "VERSION", "TYPE", "STATUS", "SIZE");
    for update in &updates {
        println!(
            "{:<28} {:<12} {:<10} {:<22} {:>10}",
            update.id,
            update.version,
            update.release_type,
            status_label(update),
            format_size(update.expected_size)
        );
    }
    Ok(())
}

/// Print the details of one update.
pub fn run_status(runner: &CliRunner, id: &str) -> Result<(), CliError> {
    let session = runner.open_online_session()?;
    let result = require_update(&session.registry, id);
    let waiting = session.registry.is_waiting_for_reboot(id);
    runner.close_session(session);
    let update = result?;

    println!("Update {}", update.id);
    println!("  Name:       {}", update.name);
    println!("  Version:    {}", update.version);
    println!("  Type:       {}", update.release_type);
    println!("  Built:      {}", format_build_date(update.build_timestamp));
    println!("  Status:     {}", status_label(&update));
    println!(
        "  Downloaded: {} of {} ({}%)",
        format_size(update.bytes_on_disk),
        format_size(update.expected_size),
        update.progress_percent
    );
    if let Some(path) = &update.file_path {
        println!("  File:       {}", path.display());
    }
    println!("  Online:     {}", if update.available_online { "yes" } else { "no" });
    if waiting {
        println!();
        println!("Installed. Reboot the device to finish the update.");
    }
    Ok(())
}

/// Query the catalog and merge it into the registry.
pub fn run_refresh(runner: &CliRunner, catalog: Option<String>) -> Result<(), CliError> {
    let location = catalog
        .or_else(|| runner.config().updater.catalog.clone())
        .ok_or_else(|| {
            CliError::Config(
                "No catalog specified. Use --catalog or set catalog in config.ini [updater] section."
                    .to_string(),
            )
        })?;

    println!("Fetching catalog from {}", location);
    let catalog = Catalog::load(&location)?;

    let session = runner.open_session()?;
    let added = catalog.apply(&session.registry);
    let known = session.registry.list_updates().len();
    runner.close_session(session);

    println!("{} updates listed, {} new, {} known in total", catalog.updates.len(), added, known);
    Ok(())
}

/// Delete the package of one update.
pub fn run_delete(runner: &CliRunner, id: &str) -> Result<(), CliError> {
    let session = runner.open_online_session()?;
    let result = require_update(&session.registry, id).map(|update| {
        session.registry.delete_update(id);
        update
    });
    let still_known = session.registry.get_update(id);
    runner.close_session(session);
    let update = result?;

    match still_known {
        Some(record) if record.file_path.is_some() => {
            return Err(CliError::Runtime(format!(
                "'{}' is in use ({}), not deleted",
                id,
                status_label(&record)
            )));
        }
        Some(_) => println!("Deleted package of {}", update.id),
        None => println!("Deleted {}", update.id),
    }
    Ok(())
}

fn status_label(update: &UpdateRecord) -> String {
    let name = update.status.name();
    if update.status.is_transferring() || (update.progress_percent > 0 && update.progress_percent < 100) {
        format!("{} ({}%)", name, update.progress_percent)
    } else {
        name.to_string()
    }
}

fn format_build_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|date| date.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use otaupdater::model::UpdateStatus;

    #[test]
    fn test_status_label_shows_partial_progress() {
        let mut update = UpdateRecord::new("rom-42");
        update.status = UpdateStatus::Paused;
        update.progress_percent = 40;
        assert!(status_label(&update).ends_with("(40%)"));

        update.status = UpdateStatus::Verified;
        update.progress_percent = 100;
        assert!(!status_label(&update).contains('%'));
    }

    #[test]
    fn test_format_build_date() {
        assert_eq!(format_build_date(1_700_000_000), "2023-11-14 22:13 UTC");
    }
}
