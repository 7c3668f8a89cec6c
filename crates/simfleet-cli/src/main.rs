//! Command-line tool for resetting the local iOS Simulator fleet.
//!
//! Kills running Simulator processes, deletes every simulator device,
//! and recreates one simulator per (device type, runtime) pairing for
//! the installed runtimes. Run it after switching Xcode versions to get
//! back to a clean, fully-provisioned fleet.
//!
//! # Usage
//!
//! ```bash
//! # Full reset with defaults
//! simfleet
//!
//! # Same, with a longer shutdown loop
//! simfleet reset --shutdown-attempts 10
//!
//! # Show the current fleet
//! simfleet list
//! simfleet list --json
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use simfleet_core::reset::{FleetReset, ResetConfig, ResetError};
use simfleet_core::simctl::{Simctl, SimctlError};

/// Reset the local iOS Simulator fleet.
#[derive(Parser)]
#[command(name = "simfleet")]
#[command(about = "Reset the local iOS Simulator fleet")]
#[command(version)]
struct Cli {
    /// Suppress informational output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Tear down and recreate every simulator (the default)
    Reset {
        /// Maximum passes of the device shutdown loop
        #[arg(long, default_value_t = 6, env = "SIMFLEET_SHUTDOWN_ATTEMPTS")]
        shutdown_attempts: u32,
    },

    /// List simulator devices
    List {
        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code(&e)
        }
    }
}

/// Maps each fatal error class to a distinct exit code so callers (CI
/// scripts, mostly) can tell a wedged backend from a failed command.
fn exit_code(err: &ResetError) -> ExitCode {
    match err {
        ResetError::ProcessKillTimeout { .. } | ResetError::ServiceTimeout { .. } => {
            ExitCode::from(2)
        }
        ResetError::Io(_) => ExitCode::from(4),
        _ => ExitCode::from(1),
    }
}

fn run(cli: &Cli) -> Result<(), ResetError> {
    match &cli.command {
        None => run_reset(cli.quiet, ResetConfig::default()),
        Some(Command::Reset { shutdown_attempts }) => run_reset(
            cli.quiet,
            ResetConfig {
                shutdown_attempts: *shutdown_attempts,
                ..ResetConfig::default()
            },
        ),
        Some(Command::List { json }) => run_list(*json),
    }
}

fn run_reset(quiet: bool, config: ResetConfig) -> Result<(), ResetError> {
    let summary = FleetReset::new(config).run()?;

    if !quiet {
        println!(
            "Done! Deleted {} simulators, created {} ({} failed).",
            summary.deleted, summary.created, summary.failed_creations
        );
    }
    Ok(())
}

fn run_list(json: bool) -> Result<(), ResetError> {
    let devices = Simctl::list_devices()?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&devices).map_err(SimctlError::from)?;
        println!("{}", rendered);
    } else if devices.is_empty() {
        eprintln!("No simulator devices found");
    } else {
        for device in &devices {
            let state = if device.is_running() {
                format!(" ({})", device.state)
            } else {
                String::new()
            };
            println!("{} -- {}{}", device.udid, device.name, state);
        }
    }
    Ok(())
}
