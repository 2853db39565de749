//! Command-line interface for CraftOps.
//!
//! Argument parsing uses the `clap` derive API. Global flags override the
//! matching configuration file settings.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Minecraft server operations and mod management.
#[derive(Debug, Parser)]
#[command(name = "craftops", version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Show what would be done without making changes
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a configuration file with default settings
    InitConfig(InitConfigArgs),
    /// Update all configured mods to their latest compatible versions
    UpdateMods(UpdateModsArgs),
    /// List installed mods
    ListMods,
    /// Backup management
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Server lifecycle management
    #[command(subcommand)]
    Server(ServerCommand),
    /// Validate configuration and system setup
    HealthCheck,
}

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Output path for the configuration file
    #[arg(short, long, value_name = "PATH", default_value = "config.toml")]
    pub output: PathBuf,

    /// Overwrite an existing configuration file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct UpdateModsArgs {
    /// Re-download mods that are already installed
    #[arg(long)]
    pub force: bool,

    /// Skip the backup taken before updating
    #[arg(long)]
    pub no_backup: bool,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum BackupCommand {
    /// Create a backup of the server directory
    Create,
    /// List available backups
    List,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ServerCommand {
    /// Start the server
    Start,
    /// Stop the server gracefully
    Stop,
    /// Warn players, then restart the server
    Restart,
    /// Show whether the server is running
    Status,
}
