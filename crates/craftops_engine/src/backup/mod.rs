//! Backup archiver.
//!
//! Produces compressed `tar.gz` snapshots of the server directory, honours
//! exclusion rules, and enforces a retention count by deleting the oldest
//! archives after every successful backup.
//!
//! ## Ordering
//!
//! Archives are ordered by modification time, newest first. Ties are broken
//! by file name, descending, so a suffixed same-second archive ranks as the
//! newer one.

mod archive;
mod exclude;

pub use exclude::ExclusionRules;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};
use crate::health::{check_path, HealthCheck};
use crate::services::BackupManager;
use crate::types::BackupRecord;

use archive::{ARCHIVE_PREFIX, ARCHIVE_SUFFIX};

/// Path reported by a dry-run backup. Nothing is written.
pub const DRY_RUN_ARCHIVE: &str = "dry-run-backup.tar.gz";

/// Creates, lists and prunes server backups.
#[derive(Debug, Clone)]
pub struct BackupArchiver {
    config: BackupConfig,
}

impl BackupArchiver {
    pub fn new(config: BackupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Retention count actually enforced; zero is treated as one so a
    /// successful backup never deletes itself.
    pub fn retention(&self) -> usize {
        self.config.max_backups.max(1)
    }

    /// Archives the server directory and applies retention.
    ///
    /// The walk and compression run on a blocking thread. Cancellation is
    /// checked before every entry; a cancelled or failed run leaves no
    /// archive behind.
    pub async fn create(&self, cancel: &CancellationToken) -> BackupResult<PathBuf> {
        if !self.config.enabled {
            info!("Backups are disabled, skipping");
            return Err(BackupError::Disabled);
        }

        if self.config.dry_run {
            info!(
                source = %self.config.source_dir.display(),
                target = %self.config.backup_dir.display(),
                "Dry run: would create backup"
            );
            return Ok(PathBuf::from(DRY_RUN_ARCHIVE));
        }

        self.validate_source()?;
        let rules = ExclusionRules::new(self.config.include_logs, &self.config.exclude_patterns)?;

        tokio::fs::create_dir_all(&self.config.backup_dir)
            .await
            .map_err(|e| BackupError::CreateDirectory(self.config.backup_dir.clone(), e))?;

        let config = self.config.clone();
        let token = cancel.clone();
        let path = tokio::task::spawn_blocking(move || archive::create_archive(&config, &rules, &token))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))??;

        self.prune();
        Ok(path)
    }

    /// Archives currently in the backup directory, newest first.
    ///
    /// A backup directory that does not exist yet yields an empty list.
    pub fn list(&self) -> BackupResult<Vec<BackupRecord>> {
        let dir = &self.config.backup_dir;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::List(dir.clone(), e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BackupError::List(dir.clone(), e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_archive_name(&name) {
                continue;
            }
            // Entries removed or unreadable mid-listing are skipped.
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let Ok(modified) = meta.modified() else { continue };

            records.push(BackupRecord {
                name,
                path: entry.path(),
                created_at: DateTime::<Local>::from(modified),
                size_bytes: meta.len(),
            });
        }

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(records)
    }

    /// Deletes archives beyond the retention count. Deletion failures are
    /// logged and do not fail the backup that triggered them.
    fn prune(&self) -> usize {
        let records = match self.list() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to list backups for retention");
                return 0;
            }
        };

        let mut removed = 0;
        for old in records.iter().skip(self.retention()) {
            match fs::remove_file(&old.path) {
                Ok(()) => {
                    removed += 1;
                    info!(name = %old.name, "Removed old backup");
                }
                Err(e) => warn!(name = %old.name, error = %e, "Failed to remove old backup"),
            }
        }
        removed
    }

    fn validate_source(&self) -> BackupResult<()> {
        let source = &self.config.source_dir;
        match fs::metadata(source) {
            Err(_) => Err(BackupError::SourceMissing(source.clone())),
            Ok(meta) if !meta.is_dir() => Err(BackupError::SourceNotDirectory(source.clone())),
            Ok(_) => Ok(()),
        }
    }

    pub fn health_check(&self) -> Vec<HealthCheck> {
        if !self.config.enabled {
            return vec![HealthCheck::warn("Backup system", "Disabled")];
        }

        let retention = if self.config.max_backups == 0 {
            HealthCheck::warn("Backup retention", "max_backups is 0, keeping 1 backup")
        } else {
            HealthCheck::ok(
                "Backup retention",
                format!("Keeping {} backups", self.retention()),
            )
        };

        vec![check_path("Backup directory", &self.config.backup_dir), retention]
    }
}

fn is_archive_name(name: &str) -> bool {
    name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX)
}

#[async_trait]
impl BackupManager for BackupArchiver {
    async fn create(&self, cancel: &CancellationToken) -> BackupResult<PathBuf> {
        BackupArchiver::create(self, cancel).await
    }

    fn list(&self) -> BackupResult<Vec<BackupRecord>> {
        BackupArchiver::list(self)
    }

    async fn health_check(&self) -> Vec<HealthCheck> {
        BackupArchiver::health_check(self)
    }
}
