//! Runtime configuration for each engine subsystem.
//!
//! These structures are built by the caller (normally from the TOML file
//! loaded by the `craftops` binary) and handed to each subsystem's
//! constructor. The engine never reads configuration on its own.

use std::path::PathBuf;
use std::time::Duration;

/// Default Modrinth API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.modrinth.com/v2";

/// Configuration for the backup archiver.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Whether backups are enabled at all
    pub enabled: bool,
    /// Server directory to archive
    pub source_dir: PathBuf,
    /// Directory receiving the archives
    pub backup_dir: PathBuf,
    /// Retention count
    pub max_backups: usize,
    /// gzip level; out-of-range values fall back to the default level
    pub compression_level: i32,
    /// Whether `logs/` is archived
    pub include_logs: bool,
    /// Glob patterns matched against relative paths
    pub exclude_patterns: Vec<String>,
    /// Log intended actions without touching the filesystem
    pub dry_run: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source_dir: PathBuf::from("server"),
            backup_dir: PathBuf::from("backups"),
            max_backups: 5,
            compression_level: 6,
            include_logs: false,
            exclude_patterns: vec![
                "*.log".to_string(),
                "*.log.*".to_string(),
                "cache/".to_string(),
                "temp/".to_string(),
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
            ],
            dry_run: false,
        }
    }
}

/// Configuration for the mod update engine.
#[derive(Debug, Clone)]
pub struct ModsConfig {
    /// Directory holding installed jars
    pub mods_dir: PathBuf,
    /// Configured slugs or Modrinth URLs
    pub sources: Vec<String>,
    /// Target game version, e.g. `1.20.1`
    pub game_version: String,
    /// Target modloader, e.g. `fabric`
    pub loader: String,
    /// Maximum number of sources processed at once
    pub concurrency: usize,
    /// Retries after the first attempt of a network operation
    pub max_retries: u32,
    /// Base delay between attempts
    pub retry_delay: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Timeout of the registry reachability probe
    pub probe_timeout: Duration,
    /// Registry API root
    pub api_base_url: String,
    /// Resolve versions but never download
    pub dry_run: bool,
}

impl Default for ModsConfig {
    fn default() -> Self {
        Self {
            mods_dir: PathBuf::from("server/mods"),
            sources: Vec::new(),
            game_version: "1.20.1".to_string(),
            loader: "fabric".to_string(),
            concurrency: 5,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            dry_run: false,
        }
    }
}

/// Configuration for the server lifecycle controller.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Server working directory
    pub server_dir: PathBuf,
    /// Server jar, relative to `server_dir`
    pub jar_name: String,
    /// JVM flags placed before `-jar`
    pub java_flags: Vec<String>,
    /// Runtime binary used to launch the jar
    pub java_binary: String,
    /// Console command that triggers a graceful shutdown
    pub stop_command: String,
    /// Supervisor session name
    pub session_name: String,
    /// Maximum wait for the session to appear after launch
    pub startup_timeout: Duration,
    /// Maximum wait for the session to disappear after the stop command
    pub max_stop_wait: Duration,
    /// Interval between status polls
    pub poll_interval: Duration,
    /// Pause between stop and start during a restart
    pub settle_delay: Duration,
    /// Log intended actions without touching the supervisor
    pub dry_run: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            server_dir: PathBuf::from("server"),
            jar_name: "server.jar".to_string(),
            java_flags: vec!["-Xms4G".to_string(), "-Xmx4G".to_string()],
            java_binary: "java".to_string(),
            stop_command: "stop".to_string(),
            session_name: "minecraft".to_string(),
            startup_timeout: Duration::from_secs(120),
            max_stop_wait: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
            dry_run: false,
        }
    }
}

/// Configuration for webhook notifications and restart warnings.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Discord webhook URL; `None` disables sending
    pub webhook_url: Option<String>,
    /// Minutes-before-restart at which warnings are sent
    pub warning_intervals: Vec<u64>,
    /// Warning text; `{minutes}` is substituted
    pub warning_message: String,
    pub success_notifications: bool,
    pub error_notifications: bool,
    /// Length of one warning-interval unit (one minute outside tests)
    pub interval_unit: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Retries after the first webhook attempt
    pub max_retries: u32,
    /// Base delay between webhook attempts
    pub retry_delay: Duration,
    /// Log intended sends without performing them
    pub dry_run: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            warning_intervals: vec![15, 10, 5, 1],
            warning_message: "Server will restart in {minutes} minute(s) for mod updates"
                .to_string(),
            success_notifications: true,
            error_notifications: true,
            interval_unit: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            dry_run: false,
        }
    }
}
