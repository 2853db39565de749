//! Configuration management for CraftOps.
//!
//! This module handles loading, validation, and conversion of the TOML
//! configuration file into the runtime configuration of each engine
//! subsystem.

use anyhow::{bail, Context, Result};
use craftops_engine::{BackupConfig, LifecycleConfig, ModsConfig, NotifierConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Supported modloaders, lower case.
const MODLOADERS: [&str; 4] = ["fabric", "forge", "quilt", "neoforge"];

/// Accepted log levels, upper case.
const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

const LOG_FORMATS: [&str; 2] = ["json", "text"];

/// Application configuration loaded from TOML file.
///
/// Every section and key is optional; anything missing falls back to the
/// production defaults of [`AppConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Verbose logging
    pub debug: bool,
    /// Log intended actions without changing anything
    pub dry_run: bool,
    pub minecraft: MinecraftSettings,
    pub paths: PathSettings,
    pub server: ServerSettings,
    pub mods: ModSettings,
    pub backup: BackupSettings,
    pub notifications: NotificationSettings,
    pub logging: LoggingSettings,
}

/// Target game version and modloader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinecraftSettings {
    pub version: String,
    pub modloader: String,
}

/// Directory locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub server: PathBuf,
    pub mods: PathBuf,
    pub backups: PathBuf,
    pub logs: PathBuf,
}

/// JVM launch and lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server jar, relative to the server directory
    pub jar_name: String,
    pub java_flags: Vec<String>,
    /// Console command that stops the server gracefully
    pub stop_command: String,
    /// Seconds to wait for the server to stop
    pub max_stop_wait: u64,
    /// Seconds to wait for the server to start
    pub startup_timeout: u64,
    /// Detached session name
    pub session_name: String,
}

/// Mod update settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModSettings {
    pub concurrent_downloads: usize,
    pub max_retries: u32,
    /// Base retry delay in seconds
    pub retry_delay: f64,
    /// Request timeout in seconds
    pub timeout: u64,
    /// Project slugs or Modrinth URLs
    pub modrinth_sources: Vec<String>,
    pub api_base_url: String,
}

/// Backup and retention settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub enabled: bool,
    pub max_backups: usize,
    pub compression_level: i32,
    pub include_logs: bool,
    pub exclude_patterns: Vec<String>,
}

/// Webhook and restart-warning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Empty disables notifications
    pub discord_webhook: String,
    /// Minutes before a restart at which warnings are sent
    pub warning_intervals: Vec<u64>,
    pub warning_message: String,
    pub success_notifications: bool,
    pub error_notifications: bool,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// DEBUG, INFO, WARNING, ERROR or CRITICAL
    pub level: String,
    /// `json` or `text`
    pub format: String,
    /// Append to `<paths.logs>/craftops.log`
    pub file_enabled: bool,
    /// Write to stderr
    pub console_enabled: bool,
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            dry_run: false,
            minecraft: MinecraftSettings::default(),
            paths: PathSettings::default(),
            server: ServerSettings::default(),
            mods: ModSettings::default(),
            backup: BackupSettings::default(),
            notifications: NotificationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for MinecraftSettings {
    fn default() -> Self {
        Self {
            version: "1.20.1".to_string(),
            modloader: "fabric".to_string(),
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        let home = home_dir();
        let server = home.join("minecraft").join("server");
        Self {
            mods: server.join("mods"),
            server,
            backups: home.join("minecraft").join("backups"),
            logs: home.join(".local").join("share").join("craftops").join("logs"),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            jar_name: "server.jar".to_string(),
            java_flags: [
                "-Xms4G",
                "-Xmx4G",
                "-XX:+UseG1GC",
                "-XX:+ParallelRefProcEnabled",
                "-XX:+UnlockExperimentalVMOptions",
                "-XX:+DisableExplicitGC",
                "-XX:+AlwaysPreTouch",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            stop_command: "stop".to_string(),
            max_stop_wait: 300,
            startup_timeout: 120,
            session_name: "minecraft".to_string(),
        }
    }
}

impl Default for ModSettings {
    fn default() -> Self {
        Self {
            concurrent_downloads: 5,
            max_retries: 3,
            retry_delay: 2.0,
            timeout: 30,
            modrinth_sources: Vec::new(),
            api_base_url: craftops_engine::config::DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_backups: 5,
            compression_level: 6,
            include_logs: false,
            exclude_patterns: BackupConfig::default().exclude_patterns,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        let defaults = NotifierConfig::default();
        Self {
            discord_webhook: String::new(),
            warning_intervals: defaults.warning_intervals,
            warning_message: defaults.warning_message,
            success_notifications: true,
            error_notifications: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: "json".to_string(),
            file_enabled: true,
            console_enabled: true,
        }
    }
}

/// Locations searched, in order, when no `--config` is given.
pub fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("config.toml")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("craftops").join("config.toml"));
    }
    candidates.push(PathBuf::from("/etc/craftops/config.toml"));
    candidates
}

impl AppConfig {
    /// Loads and validates the configuration.
    ///
    /// An explicit `path` must exist. Without one, the first existing file
    /// from [`default_config_candidates`] is used, and built-in defaults
    /// when none exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let source = match path {
            Some(path) => {
                if !path.exists() {
                    bail!("configuration file {} does not exist", path.display());
                }
                Some(path.to_path_buf())
            }
            None => default_config_candidates().into_iter().find(|p| p.is_file()),
        };

        let mut config = match source {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("configuration validation failed: {e}"))?;
        Ok(config)
    }

    /// Parses one TOML file without validating it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Writes the configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize configuration")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }

    /// Normalises case-insensitive values and checks every setting is
    /// within supported bounds.
    pub fn validate(&mut self) -> Result<(), String> {
        let modloader = self.minecraft.modloader.to_lowercase();
        if !MODLOADERS.contains(&modloader.as_str()) {
            return Err(format!(
                "unsupported modloader: {}. Must be one of {MODLOADERS:?}",
                self.minecraft.modloader
            ));
        }
        self.minecraft.modloader = modloader;

        let level = self.logging.level.to_uppercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(format!(
                "invalid log level: {}. Must be one of {LOG_LEVELS:?}",
                self.logging.level
            ));
        }
        self.logging.level = level;

        let format = self.logging.format.to_lowercase();
        if !LOG_FORMATS.contains(&format.as_str()) {
            return Err(format!(
                "invalid log format: {}. Must be one of {LOG_FORMATS:?}",
                self.logging.format
            ));
        }
        self.logging.format = format;

        if self.mods.concurrent_downloads == 0 {
            return Err("mods.concurrent_downloads must be at least 1".to_string());
        }
        if self.backup.max_backups == 0 {
            return Err("backup.max_backups must be at least 1".to_string());
        }
        if !self.mods.retry_delay.is_finite() || self.mods.retry_delay < 0.0 {
            return Err(format!("invalid mods.retry_delay: {}", self.mods.retry_delay));
        }
        if self.server.session_name.trim().is_empty() {
            return Err("server.session_name cannot be empty".to_string());
        }
        if self.server.stop_command.trim().is_empty() {
            return Err("server.stop_command cannot be empty".to_string());
        }

        Ok(())
    }

    pub fn to_backup_config(&self) -> BackupConfig {
        BackupConfig {
            enabled: self.backup.enabled,
            source_dir: self.paths.server.clone(),
            backup_dir: self.paths.backups.clone(),
            max_backups: self.backup.max_backups,
            compression_level: self.backup.compression_level,
            include_logs: self.backup.include_logs,
            exclude_patterns: self.backup.exclude_patterns.clone(),
            dry_run: self.dry_run,
        }
    }

    pub fn to_mods_config(&self) -> ModsConfig {
        ModsConfig {
            mods_dir: self.paths.mods.clone(),
            sources: self.mods.modrinth_sources.clone(),
            game_version: self.minecraft.version.clone(),
            loader: self.minecraft.modloader.clone(),
            concurrency: self.mods.concurrent_downloads,
            max_retries: self.mods.max_retries,
            retry_delay: Duration::from_secs_f64(self.mods.retry_delay.max(0.0)),
            request_timeout: Duration::from_secs(self.mods.timeout),
            api_base_url: self.mods.api_base_url.clone(),
            dry_run: self.dry_run,
            ..ModsConfig::default()
        }
    }

    pub fn to_lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            server_dir: self.paths.server.clone(),
            jar_name: self.server.jar_name.clone(),
            java_flags: self.server.java_flags.clone(),
            stop_command: self.server.stop_command.clone(),
            session_name: self.server.session_name.clone(),
            startup_timeout: Duration::from_secs(self.server.startup_timeout),
            max_stop_wait: Duration::from_secs(self.server.max_stop_wait),
            dry_run: self.dry_run,
            ..LifecycleConfig::default()
        }
    }

    pub fn to_notifier_config(&self) -> NotifierConfig {
        let webhook = self.notifications.discord_webhook.trim();
        NotifierConfig {
            webhook_url: (!webhook.is_empty()).then(|| webhook.to_string()),
            warning_intervals: self.notifications.warning_intervals.clone(),
            warning_message: self.notifications.warning_message.clone(),
            success_notifications: self.notifications.success_notifications,
            error_notifications: self.notifications.error_notifications,
            dry_run: self.dry_run,
            ..NotifierConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.minecraft.version, "1.20.1");
        assert_eq!(config.minecraft.modloader, "fabric");
        assert_eq!(config.server.jar_name, "server.jar");
        assert_eq!(config.server.max_stop_wait, 300);
        assert_eq!(config.server.startup_timeout, 120);
        assert_eq!(config.mods.concurrent_downloads, 5);
        assert_eq!(config.backup.max_backups, 5);
        assert_eq!(config.notifications.warning_intervals, vec![15, 10, 5, 1]);
        assert_eq!(config.logging.level, "INFO");
        assert!(config.paths.mods.starts_with(&config.paths.server));
    }

    #[test]
    fn test_validation_valid_config() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_normalises_case() {
        let mut config = AppConfig::default();
        config.minecraft.modloader = "NeoForge".to_string();
        config.logging.level = "debug".to_string();
        config.logging.format = "TEXT".to_string();

        config.validate().unwrap();
        assert_eq!(config.minecraft.modloader, "neoforge");
        assert_eq!(config.logging.level, "DEBUG");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases: [(fn(&mut AppConfig), &str); 7] = [
            (|c: &mut AppConfig| c.minecraft.modloader = "bukkit".into(), "unsupported modloader"),
            (|c: &mut AppConfig| c.logging.level = "TRACE".into(), "invalid log level"),
            (|c: &mut AppConfig| c.logging.format = "xml".into(), "invalid log format"),
            (|c: &mut AppConfig| c.mods.concurrent_downloads = 0, "concurrent_downloads"),
            (|c: &mut AppConfig| c.backup.max_backups = 0, "max_backups"),
            (|c: &mut AppConfig| c.server.session_name = " ".into(), "session_name"),
            (|c: &mut AppConfig| c.server.stop_command = String::new(), "stop_command"),
        ];

        for (mutate, expected) in cases {
            let mut config = AppConfig::default();
            mutate(&mut config);
            let err = config.validate().unwrap_err();
            assert!(err.contains(expected), "{err} should mention {expected}");
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let toml_content = r#"
dry_run = true

[minecraft]
version = "1.21"

[mods]
modrinth_sources = ["sodium", "https://modrinth.com/mod/lithium"]
retry_delay = 0.5

[notifications]
discord_webhook = "https://discord.com/api/webhooks/1/abc"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();

        assert!(config.dry_run);
        assert_eq!(config.minecraft.version, "1.21");
        assert_eq!(config.minecraft.modloader, "fabric");
        assert_eq!(config.mods.modrinth_sources.len(), 2);
        assert_eq!(config.mods.concurrent_downloads, 5);
        assert_eq!(config.server.session_name, "minecraft");

        let mods = config.to_mods_config();
        assert_eq!(mods.retry_delay, Duration::from_millis(500));
        assert!(mods.dry_run);
        assert!(config.to_notifier_config().webhook_url.is_some());
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.server.session_name = "survival".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_reports_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nlevel = \"LOUD\"\n").unwrap();

        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("invalid log level"));
    }

    #[test]
    fn test_conversions_carry_paths_and_flags() {
        let mut config = AppConfig::default();
        config.dry_run = true;
        config.paths.server = PathBuf::from("/srv/mc");
        config.paths.backups = PathBuf::from("/srv/backups");
        config.server.startup_timeout = 60;

        let backup = config.to_backup_config();
        assert_eq!(backup.source_dir, PathBuf::from("/srv/mc"));
        assert_eq!(backup.backup_dir, PathBuf::from("/srv/backups"));
        assert!(backup.dry_run);

        let lifecycle = config.to_lifecycle_config();
        assert_eq!(lifecycle.startup_timeout, Duration::from_secs(60));
        assert_eq!(lifecycle.server_dir, PathBuf::from("/srv/mc"));

        assert!(config.to_notifier_config().webhook_url.is_none());
    }
}
