//! Mod update engine.
//!
//! Resolves the newest compatible release of every configured source from the
//! Modrinth registry and installs it into the mods directory. Sources are
//! processed concurrently up to the configured limit; each source's outcome
//! is recorded independently so one failure never aborts the others.
//!
//! ## Concurrency
//!
//! Every source runs as one future on the calling task; a
//! [`Semaphore`] bounds how many hold a permit at once. Outcomes are merged
//! into a shared [`ModUpdateResult`] behind a mutex that is never held across
//! an await point.

mod download;
mod registry;

pub use registry::{parse_project_id, RegistryClient};

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ModsConfig;
use crate::error::{ModError, ModResult};
use crate::health::{check_path, HealthCheck};
use crate::retry::RetryPolicy;
use crate::services::ModManager;
use crate::types::{InstalledMod, ModUpdateResult, ModVersionInfo};

/// User agent sent with every registry and download request.
pub const USER_AGENT: &str = concat!("craftops/", env!("CARGO_PKG_VERSION"));

/// Keeps the mods directory in sync with the configured sources.
#[derive(Debug, Clone)]
pub struct ModUpdater {
    config: ModsConfig,
    http: Client,
    registry: RegistryClient,
    retry: RetryPolicy,
}

impl ModUpdater {
    pub fn new(config: ModsConfig) -> ModResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| ModError::Http {
                url: config.api_base_url.clone(),
                source,
            })?;
        let registry = RegistryClient::new(
            http.clone(),
            config.api_base_url.clone(),
            config.game_version.clone(),
            config.loader.clone(),
        );
        let retry = RetryPolicy::new(config.max_retries, config.retry_delay);

        Ok(Self {
            config,
            http,
            registry,
            retry,
        })
    }

    pub fn config(&self) -> &ModsConfig {
        &self.config
    }

    /// Brings every configured source up to date.
    ///
    /// Per-source problems (bad source, registry errors, failed downloads)
    /// land in [`ModUpdateResult::failed`]; only a mods directory that cannot
    /// be created, or cancellation, fails the whole run.
    pub async fn update_all(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> ModResult<ModUpdateResult> {
        let sources = &self.config.sources;
        info!(force, sources = sources.len(), dry_run = self.config.dry_run, "Starting mod update");

        if sources.is_empty() {
            return Ok(ModUpdateResult::default());
        }

        if !self.config.dry_run {
            tokio::fs::create_dir_all(&self.config.mods_dir)
                .await
                .map_err(|e| ModError::CreateModsDirectory(self.config.mods_dir.clone(), e))?;
        }

        let result = Mutex::new(ModUpdateResult::default());
        let permits = Semaphore::new(self.config.concurrency.max(1));

        let tasks = sources.iter().map(|source| {
            let permits = &permits;
            let result = &result;
            async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return,
                    acquired = permits.acquire() => match acquired {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                let (name, outcome) = self.update_source(source, force, cancel).await;
                record(result, name, outcome);
            }
        });
        join_all(tasks).await;

        if cancel.is_cancelled() {
            warn!("Mod update cancelled");
            return Err(ModError::Cancelled);
        }

        let result = result.into_inner().unwrap_or_else(PoisonError::into_inner);
        info!(
            updated = result.updated.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            "Mod update complete"
        );
        Ok(result)
    }

    /// Processes one source and returns the name it is reported under: the
    /// project identifier when it could be parsed, the raw source otherwise.
    async fn update_source(
        &self,
        source: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> (String, ModResult<bool>) {
        let project_id = match parse_project_id(source) {
            Ok(id) => id,
            Err(e) => return (source.to_string(), Err(e)),
        };
        let outcome = self.update_project(&project_id, force, cancel).await;
        (project_id, outcome)
    }

    async fn update_project(
        &self,
        project_id: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> ModResult<bool> {
        let info = self
            .retry
            .run(cancel, |_| self.registry.latest_version(project_id, cancel))
            .await?;
        check_filename(&info)?;

        if self.config.dry_run {
            info!(project = project_id, filename = %info.filename, "Dry run: would download mod");
            return Ok(true);
        }

        let final_path = self.config.mods_dir.join(&info.filename);
        if !force && tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
            info!(project = project_id, filename = %info.filename, "Mod up to date, skipping");
            return Ok(false);
        }

        download::download_atomic(
            &self.http,
            &info.download_url,
            &self.config.mods_dir,
            &info.filename,
            &self.retry,
            cancel,
        )
        .await?;

        info!(
            project = project_id,
            version = %info.version_number,
            filename = %info.filename,
            "Downloaded mod"
        );
        Ok(true)
    }

    /// Jars currently in the mods directory, sorted by file name.
    pub fn list_installed(&self) -> ModResult<Vec<InstalledMod>> {
        let dir = &self.config.mods_dir;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ModError::List(dir.clone(), e.to_string())),
        };

        let mut mods: Vec<InstalledMod> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jar") {
                    return None;
                }
                let meta = entry.metadata().ok().filter(|m| m.is_file())?;
                let filename = entry.file_name().to_string_lossy().into_owned();
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| filename.clone());

                Some(InstalledMod {
                    name,
                    filename,
                    size: meta.len(),
                    modified: meta.modified().ok()?.into(),
                })
            })
            .collect();

        mods.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(mods)
    }

    pub async fn health_check(&self) -> Vec<HealthCheck> {
        let sources = match self.config.sources.len() {
            0 => HealthCheck::warn("Mod sources", "None configured"),
            n => HealthCheck::ok("Mod sources", format!("{n} sources")),
        };

        vec![
            check_path("Mods directory", &self.config.mods_dir),
            sources,
            self.registry.probe(self.config.probe_timeout).await,
        ]
    }
}

/// Rejects registry file names that would escape the mods directory.
fn check_filename(info: &ModVersionInfo) -> ModResult<()> {
    let as_path = Path::new(&info.filename);
    let is_plain = as_path.file_name().and_then(|n| n.to_str()) == Some(info.filename.as_str());
    if is_plain && !info.filename.contains(['/', '\\']) {
        Ok(())
    } else {
        Err(ModError::UnsafeFilename(info.filename.clone()))
    }
}

fn record(result: &Mutex<ModUpdateResult>, name: String, outcome: ModResult<bool>) {
    let mut result = result.lock().unwrap_or_else(PoisonError::into_inner);
    match outcome {
        Ok(true) => result.updated.push(name),
        Ok(false) => result.skipped.push(name),
        Err(e) => {
            warn!(name = %name, error = %e, "Failed to update mod");
            result.failed.insert(name, e.to_string());
        }
    }
}

#[async_trait]
impl ModManager for ModUpdater {
    async fn update_all(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> ModResult<ModUpdateResult> {
        ModUpdater::update_all(self, force, cancel).await
    }

    fn list_installed(&self) -> ModResult<Vec<InstalledMod>> {
        ModUpdater::list_installed(self)
    }

    async fn health_check(&self) -> Vec<HealthCheck> {
        ModUpdater::health_check(self).await
    }
}
