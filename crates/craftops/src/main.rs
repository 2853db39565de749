//! CraftOps command line entry point.
//!
//! Parses arguments, loads and validates the configuration, installs
//! logging and signal handling, then hands the command to
//! [`app::Application`].

mod app;
mod cli;
mod config;
mod logging;
mod output;
mod signals;

use anyhow::Result;
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use app::{Application, Services};
use cli::{Cli, Commands};
use config::AppConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut stdout = io::stdout().lock();

    // Writing a fresh configuration must not depend on the current one.
    if let Commands::InitConfig(args) = &cli.command {
        return app::init_config(args, &mut stdout);
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if cli.debug {
        config.debug = true;
    }
    if config.debug {
        config.logging.level = "DEBUG".to_string();
    }
    if cli.dry_run {
        config.dry_run = true;
    }

    logging::setup_logging(&config.logging, &config.paths.logs)?;
    debug!(
        dry_run = config.dry_run,
        server = %config.paths.server.display(),
        "Configuration loaded"
    );

    let cancel = CancellationToken::new();
    let signal_task = signals::cancel_on_signal(cancel.clone());

    let services = Services::from_config(&config)?;
    let application = Application::new(config, services, cancel.clone());
    let result = application.run(cli.command, &mut stdout).await;

    stdout.flush()?;
    cancel.cancel();
    let _ = signal_task.await;
    result
}
