//! Command orchestration.
//!
//! [`Application`] owns the configuration, the root cancellation token and
//! one handle per engine subsystem, and sequences them for each command.
//! Subsystems are held as trait objects so tests can swap in fakes.

use anyhow::{bail, Context, Result};
use craftops_engine::health::check_path;
use craftops_engine::{
    BackupArchiver, BackupError, BackupManager, HealthCheck, HealthStatus, ModManager, ModUpdater,
    Notifier, ServerController, ServerManager, WebhookNotifier,
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::{BackupCommand, Commands, InitConfigArgs, ServerCommand, UpdateModsArgs};
use crate::config::AppConfig;
use crate::output;

/// Handles to every engine subsystem.
#[derive(Clone)]
pub struct Services {
    pub backups: Arc<dyn BackupManager>,
    pub mods: Arc<dyn ModManager>,
    pub server: Arc<dyn ServerManager>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// Builds the production subsystems from the configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mods = ModUpdater::new(config.to_mods_config()).context("failed to set up mod updater")?;
        let notifier = WebhookNotifier::new(config.to_notifier_config())
            .context("failed to set up notifications")?;

        Ok(Self {
            backups: Arc::new(BackupArchiver::new(config.to_backup_config())),
            mods: Arc::new(mods),
            server: Arc::new(ServerController::with_screen(config.to_lifecycle_config())),
            notifier: Arc::new(notifier),
        })
    }
}

/// Main application struct.
pub struct Application {
    config: AppConfig,
    services: Services,
    cancel: CancellationToken,
}

impl Application {
    pub fn new(config: AppConfig, services: Services, cancel: CancellationToken) -> Self {
        Self {
            config,
            services,
            cancel,
        }
    }

    /// Runs one command, writing its human-readable result to `out`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal failure of the command. `init-config` is
    /// handled by [`init_config`] before the configuration is loaded.
    pub async fn run(&self, command: Commands, out: &mut dyn Write) -> Result<()> {
        if self.config.dry_run {
            writeln!(out, "Dry run mode: no changes will be made")?;
        }

        match command {
            Commands::InitConfig(args) => init_config(&args, out),
            Commands::UpdateMods(args) => self.update_mods(&args, out).await,
            Commands::ListMods => self.list_mods(out),
            Commands::Backup(BackupCommand::Create) => self.backup_create(out).await,
            Commands::Backup(BackupCommand::List) => self.backup_list(out),
            Commands::Server(command) => self.server(command, out).await,
            Commands::HealthCheck => self.health_check(out).await,
        }
    }

    async fn update_mods(&self, args: &UpdateModsArgs, out: &mut dyn Write) -> Result<()> {
        if args.no_backup {
            info!("Skipping pre-update backup");
        } else {
            writeln!(out, "Creating backup before updating mods...")?;
            match self.services.backups.create(&self.cancel).await {
                Ok(path) => writeln!(out, "Backup created: {}", path.display())?,
                Err(BackupError::Disabled) => writeln!(out, "Backups are disabled, continuing")?,
                Err(e) => return Err(e).context("pre-update backup failed"),
            }
        }

        writeln!(out, "Updating mods...")?;
        let result = self
            .services
            .mods
            .update_all(args.force, &self.cancel)
            .await
            .context("mod update failed")?;

        info!(
            updated = result.updated.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            "Mod update finished"
        );
        write!(out, "{}", output::update_report(&result))?;
        Ok(())
    }

    fn list_mods(&self, out: &mut dyn Write) -> Result<()> {
        let mods = self
            .services
            .mods
            .list_installed()
            .context("failed to list installed mods")?;
        write!(out, "{}", output::installed_mods(&mods))?;
        Ok(())
    }

    async fn backup_create(&self, out: &mut dyn Write) -> Result<()> {
        match self.services.backups.create(&self.cancel).await {
            Ok(path) => writeln!(out, "Backup created: {}", path.display())?,
            Err(BackupError::Disabled) => {
                writeln!(out, "Backup creation skipped: backups are disabled")?
            }
            Err(e) => return Err(e).context("backup failed"),
        }
        Ok(())
    }

    fn backup_list(&self, out: &mut dyn Write) -> Result<()> {
        let records = self
            .services
            .backups
            .list()
            .context("failed to list backups")?;
        write!(out, "{}", output::backup_list(&records))?;
        Ok(())
    }

    async fn server(&self, command: ServerCommand, out: &mut dyn Write) -> Result<()> {
        let server = &self.services.server;
        match command {
            ServerCommand::Start => {
                writeln!(out, "Starting server...")?;
                server
                    .start(&self.cancel)
                    .await
                    .context("failed to start server")?;
                writeln!(out, "Server is now running")?;
            }
            ServerCommand::Stop => {
                writeln!(out, "Stopping server...")?;
                server
                    .stop(&self.cancel)
                    .await
                    .context("failed to stop server")?;
                writeln!(out, "Server has been stopped")?;
            }
            ServerCommand::Restart => self.restart(out).await?,
            ServerCommand::Status => {
                let state = server.status().await;
                write!(out, "{}", output::server_status(&state))?;
            }
        }
        Ok(())
    }

    /// Warns players, restarts, then reports the outcome to the webhook.
    ///
    /// Warning and notification failures are logged and never abort the
    /// restart itself.
    async fn restart(&self, out: &mut dyn Write) -> Result<()> {
        let notifier = &self.services.notifier;

        if !self.config.notifications.warning_intervals.is_empty() {
            writeln!(out, "Sending restart warnings to players...")?;
            if let Err(e) = notifier.send_restart_warnings(&self.cancel).await {
                warn!(error = %e, "Failed to send restart warnings");
                writeln!(out, "Failed to send warnings: {e}")?;
            }
            if self.cancel.is_cancelled() {
                bail!("restart cancelled before the server was stopped");
            }
        }

        writeln!(out, "Restarting server...")?;
        match self.services.server.restart(&self.cancel).await {
            Ok(()) => {
                writeln!(out, "Server has been restarted")?;
                if let Err(e) = notifier
                    .send_success("Server restarted successfully", &self.cancel)
                    .await
                {
                    warn!(error = %e, "Failed to send success notification");
                }
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Server restart failed");
                if let Err(notify_err) = notifier
                    .send_error(&format!("Server restart failed: {e}"), &self.cancel)
                    .await
                {
                    warn!(error = %notify_err, "Failed to send error notification");
                }
                Err(e).context("failed to restart server")
            }
        }
    }

    /// Directory checks for every configured path.
    fn path_checks(&self) -> Vec<HealthCheck> {
        let paths = &self.config.paths;
        vec![
            check_path("Path: server", &paths.server),
            check_path("Path: mods", &paths.mods),
            check_path("Path: backups", &paths.backups),
            check_path("Path: logs", &paths.logs),
        ]
    }

    async fn health_check(&self, out: &mut dyn Write) -> Result<()> {
        let mut checks = self.path_checks();
        checks.extend(self.services.mods.health_check().await);
        checks.extend(self.services.server.health_check().await);
        checks.extend(self.services.backups.health_check().await);
        checks.extend(self.services.notifier.health_check().await);

        write!(out, "{}", output::health_report(&checks))?;

        let failed = checks
            .iter()
            .filter(|c| c.status == HealthStatus::Error)
            .count();
        if failed > 0 {
            bail!("health check failed: {failed} checks failed");
        }
        Ok(())
    }
}

/// Writes the default configuration to `args.output`.
///
/// An existing file is left untouched unless `args.force` is set; a
/// directory at the output path is always an error.
pub fn init_config(args: &InitConfigArgs, out: &mut dyn Write) -> Result<()> {
    let path: &Path = &args.output;
    if path.is_dir() {
        bail!("output path is a directory: {}", path.display());
    }
    if path.exists() && !args.force {
        writeln!(out, "Configuration file already exists: {}", path.display())?;
        writeln!(out, "Use --force to overwrite the existing file")?;
        return Ok(());
    }

    AppConfig::default().save(path)?;
    info!(path = %path.display(), "Configuration file created");

    writeln!(out, "Configuration file created: {}", path.display())?;
    writeln!(out, "Next steps:")?;
    writeln!(out, "  1. Edit {} with your server details", path.display())?;
    writeln!(out, "  2. Add Modrinth projects to [mods] modrinth_sources")?;
    writeln!(out, "  3. Validate the setup with: craftops health-check")?;
    Ok(())
}
