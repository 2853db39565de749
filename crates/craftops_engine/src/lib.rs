//! # CraftOps Engine - Game Server Operations Core
//!
//! The engine behind the `craftops` command line tool. It keeps a single
//! game server host healthy: mods stay current, the world is backed up, and
//! the server process is started and stopped safely.
//!
//! ## Subsystems
//!
//! * **Mod Update Engine** ([`ModUpdater`]) - resolves the newest compatible
//!   release of each configured source from the Modrinth registry and
//!   installs it atomically, with bounded concurrency and retry
//! * **Backup Archiver** ([`BackupArchiver`]) - writes `tar.gz` snapshots of
//!   the server directory with exclusion rules and retention
//! * **Server Lifecycle Controller** ([`ServerController`]) - runs the server
//!   inside a detached supervisor session with idempotent, bounded start and
//!   stop operations
//! * **Notifier** ([`WebhookNotifier`]) - webhook messages and the
//!   restart-warning schedule
//!
//! Each subsystem is also reachable through a trait in [`services`] so the
//! orchestration layer can treat them uniformly.
//!
//! ## Configuration
//!
//! Every subsystem takes its own plain configuration struct from [`config`]
//! in its constructor. The engine never reads files or the environment.
//!
//! ## Cancellation
//!
//! Every long-running operation takes a
//! [`CancellationToken`](tokio_util::sync::CancellationToken). Cancellation
//! is honoured at every wait point (backoff sleeps, status polls, permit
//! acquisition, network reads, directory walk entries) and surfaces as the
//! subsystem's `Cancelled` error variant.
//!
//! ## Error Handling
//!
//! Each subsystem has its own error enum in [`error`]; registry and webhook
//! failures share [`ApiError`], whose status decides whether a retry may
//! help.

pub use backup::BackupArchiver;
pub use config::{BackupConfig, LifecycleConfig, ModsConfig, NotifierConfig};
pub use error::{ApiError, BackupError, ModError, NotifyError, ServerError};
pub use health::{HealthCheck, HealthStatus};
pub use mods::ModUpdater;
pub use notification::WebhookNotifier;
pub use server::{ScreenSupervisor, ServerController, SessionSupervisor};
pub use services::{BackupManager, ModManager, Notifier, ServerManager};
pub use types::{BackupRecord, InstalledMod, ModUpdateResult, ModVersionInfo, ServerState};

pub mod backup;
pub mod config;
pub mod error;
pub mod health;
pub mod mods;
pub mod notification;
pub mod retry;
pub mod server;
pub mod services;
pub mod types;

#[cfg(test)]
mod test_support;
