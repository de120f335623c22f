//! otaupdater CLI - Command-line interface
//!
//! Lists, downloads, verifies and installs OS update packages using the
//! otaupdater library.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;

use commands::config::ConfigCommands;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "otaupdater", version, about = "Download, verify and install OS updates")]
struct Cli {
    /// Use this configuration file instead of the default one
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List known updates, newest first
    List,

    /// Show details of one update
    Status {
        /// Update id
        id: String,
    },

    /// Fetch the catalog and record the updates it lists
    Refresh {
        /// Catalog path or URL (defaults to the configured one)
        #[arg(long)]
        catalog: Option<String>,
    },

    /// Download and verify an update (Ctrl-C pauses)
    Download {
        /// Update id
        id: String,
    },

    /// Resume a paused download (Ctrl-C pauses)
    Resume {
        /// Update id
        id: String,
    },

    /// Import a package file as the local update
    Import {
        /// Package file
        file: PathBuf,
    },

    /// Install a verified update (Ctrl-C cancels)
    Install {
        /// Update id
        id: String,
    },

    /// Copy a verified package to a file or directory (Ctrl-C cancels)
    Export {
        /// Update id
        id: String,
        /// Target file or directory
        destination: PathBuf,
    },

    /// Delete the package of an update
    Delete {
        /// Update id
        id: String,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    if let Commands::Config { command } = cli.command {
        return commands::config::run(command, config_path);
    }

    let runner = CliRunner::new(config_path)?;
    match cli.command {
        Commands::List => {
            runner.log_startup("list");
            commands::updates::run_list(&runner)
        }
        Commands::Status { id } => {
            runner.log_startup("status");
            commands::updates::run_status(&runner, &id)
        }
        Commands::Refresh { catalog } => {
            runner.log_startup("refresh");
            commands::updates::run_refresh(&runner, catalog)
        }
        Commands::Download { id } => {
            runner.log_startup("download");
            commands::download::run_download(&runner, &id)
        }
        Commands::Resume { id } => {
            runner.log_startup("resume");
            commands::download::run_resume(&runner, &id)
        }
        Commands::Import { file } => {
            runner.log_startup("import");
            commands::install::run_import(&runner, &file)
        }
        Commands::Install { id } => {
            runner.log_startup("install");
            commands::install::run_install(&runner, &id)
        }
        Commands::Export { id, destination } => {
            runner.log_startup("export");
            commands::export::run_export(&runner, &id, &destination)
        }
        Commands::Delete { id } => {
            runner.log_startup("delete");
            commands::updates::run_delete(&runner, &id)
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
