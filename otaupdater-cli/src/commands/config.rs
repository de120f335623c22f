//! Configuration CLI commands.

use std::path::Path;

use clap::Subcommand;
use otaupdater::config::{config_file_path, UpdaterConfig};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration
    Show,

    /// Write the effective configuration to the configuration file
    Init,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);
    match command {
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Show => run_show(&path),
        ConfigCommands::Init => run_init(&path),
    }
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = UpdaterConfig::load_from(path)?;
    let not_set = || "(not set)".to_string();

    println!("[updater]");
    println!("  download_dir = {}", config.updater.download_dir.display());
    println!("  state_dir = {}", config.updater.state_dir.display());
    println!("  catalog = {}", config.updater.catalog.clone().unwrap_or_else(not_set));
    println!(
        "  progress_interval_ms = {}",
        config.updater.progress_interval.as_millis()
    );
    println!();
    println!("[install]");
    println!("  performance_mode = {}", config.install.performance_mode);
    println!(
        "  recovery_command = {}",
        config.install.recovery_command.clone().unwrap_or_else(not_set)
    );
    println!("  copy_before_install = {}", config.install.copy_before_install);
    println!("  auto_delete = {}", config.install.auto_delete);
    println!();
    println!("[logging]");
    println!("  level = {}", config.logging.level);
    println!(
        "  directory = {}",
        config
            .logging
            .directory
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(not_set)
    );
    Ok(())
}

fn run_init(path: &Path) -> Result<(), CliError> {
    if path.exists() {
        return Err(CliError::Config(format!("{} already exists", path.display())));
    }
    UpdaterConfig::default().save_to(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        run(ConfigCommands::Init, Some(&path)).unwrap();

        assert!(path.exists());
        let loaded = UpdaterConfig::load_from(&path).unwrap();
        assert_eq!(loaded.logging.level, UpdaterConfig::default().logging.level);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[logging]\nlevel = debug\n").unwrap();

        let result = run(ConfigCommands::Init, Some(&path));

        assert!(matches!(result, Err(CliError::Config(_))));
        let loaded = UpdaterConfig::load_from(&path).unwrap();
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn test_show_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        assert!(run(ConfigCommands::Show, Some(&dir.path().join("absent.ini"))).is_ok());
    }
}
