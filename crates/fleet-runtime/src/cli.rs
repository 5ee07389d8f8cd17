//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fleetd", about = "GPU fleet lifecycle controller")]
pub struct Cli {
    /// Path to a TOML config file. Missing fields fall back to defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the sqlite database path.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Use in-memory fake drivers and a fake secret surface instead of the
    /// real provider automation and process environment. For local
    /// development only.
    #[arg(long, global = true)]
    pub fake_drivers: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the lifecycle controller: boot reconciliation, auto-discovery,
    /// the four control loops, and (if configured) the control socket.
    Daemon(DaemonOpts),
    /// Print a point-in-time snapshot of every worker and the alternation state.
    Status,
    /// Run auto-discovery once against the current secret surface and exit.
    Discover,
    /// Compute a rotation schedule from the current inventory without
    /// starting or stopping anything.
    Plan {
        /// Print the schedule as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
pub struct DaemonOpts {
    /// Run the UDS control socket alongside the control loops.
    #[arg(long)]
    pub control_socket: bool,
}

/// Default config path, `$XDG_CONFIG_HOME/gpu-fleet/fleetd.toml` or
/// `~/.config/gpu-fleet/fleetd.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(dir).join("gpu-fleet/fleetd.toml"));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config/gpu-fleet/fleetd.toml"))
}
