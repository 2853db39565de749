//! Subsystem interfaces.
//!
//! The orchestration layer talks to every subsystem through one of these
//! traits so it can treat them uniformly and so tests can substitute fakes.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::error::{BackupResult, ModResult, NotifyResult, ServerResult};
use crate::health::HealthCheck;
use crate::types::{BackupRecord, InstalledMod, ModUpdateResult, ServerState};

/// Backup creation, listing and retention.
#[async_trait]
pub trait BackupManager: Send + Sync {
    /// Creates one archive and applies retention; returns the archive path.
    async fn create(&self, cancel: &CancellationToken) -> BackupResult<PathBuf>;

    /// Existing archives, newest first.
    fn list(&self) -> BackupResult<Vec<BackupRecord>>;

    async fn health_check(&self) -> Vec<HealthCheck>;
}

/// Mod installation from the registry.
#[async_trait]
pub trait ModManager: Send + Sync {
    /// Updates every configured source; `force` re-downloads existing files.
    async fn update_all(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> ModResult<ModUpdateResult>;

    fn list_installed(&self) -> ModResult<Vec<InstalledMod>>;

    async fn health_check(&self) -> Vec<HealthCheck>;
}

/// Server process lifecycle.
#[async_trait]
pub trait ServerManager: Send + Sync {
    async fn start(&self, cancel: &CancellationToken) -> ServerResult<()>;

    async fn stop(&self, cancel: &CancellationToken) -> ServerResult<()>;

    async fn restart(&self, cancel: &CancellationToken) -> ServerResult<()>;

    /// Freshly observed state; never cached.
    async fn status(&self) -> ServerState;

    async fn health_check(&self) -> Vec<HealthCheck>;
}

/// Outbound notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_success(&self, message: &str, cancel: &CancellationToken) -> NotifyResult<()>;

    async fn send_error(&self, message: &str, cancel: &CancellationToken) -> NotifyResult<()>;

    /// Runs the full warning schedule before a restart.
    async fn send_restart_warnings(&self, cancel: &CancellationToken) -> NotifyResult<()>;

    async fn health_check(&self) -> Vec<HealthCheck>;
}
