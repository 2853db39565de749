//! Error types for the operations engine.
//!
//! Each subsystem owns one error enum so callers can match on the failure
//! class (disabled, validation, remote, timeout, I/O, cancelled) without
//! string inspection. Every message carries the path, source or endpoint
//! involved so a one-line diagnostic can be rendered directly from it.

use std::{io::Error as IoError, path::PathBuf};
use thiserror::Error;

/// A non-success HTTP response from the registry or a webhook endpoint.
#[derive(Debug, Clone, Error)]
#[error("API error [{status}]: {message} (url: {url})")]
pub struct ApiError {
    pub url: String,
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(url: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// Server overload and rate limiting are the only transient failures.
    pub fn is_retryable(&self) -> bool {
        self.status >= 500 || self.status == 429
    }
}

/// Errors that the retry loop knows how to classify.
pub trait Retryable {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool;

    /// The value to surface when cancellation interrupts a backoff sleep.
    fn cancelled() -> Self;
}

/// Backup archiver errors
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backups are disabled")]
    Disabled,

    #[error("server directory {0} does not exist")]
    SourceMissing(PathBuf),

    #[error("server path {0} is not a directory")]
    SourceNotDirectory(PathBuf),

    #[error("invalid exclude pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("failed to create backup directory {0}: {1}")]
    CreateDirectory(PathBuf, IoError),

    #[error("failed to create archive {0}: {1}")]
    CreateArchive(PathBuf, IoError),

    #[error("failed to add {0} to archive: {1}")]
    AddEntry(PathBuf, IoError),

    #[error("failed to walk {0}: {1}")]
    Walk(PathBuf, String),

    #[error("failed to finalize {stage} layer of {path}: {source}")]
    Finalize {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: IoError,
    },

    #[error("backup file {0} is empty or was not created")]
    EmptyArchive(PathBuf),

    #[error("failed to list backups in {0}: {1}")]
    List(PathBuf, IoError),

    #[error("backup task failed: {0}")]
    Task(String),

    #[error("backup cancelled")]
    Cancelled,
}

/// Mod update engine errors
#[derive(Debug, Error)]
pub enum ModError {
    #[error("invalid Modrinth URL: {0}")]
    InvalidSource(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no compatible versions found for {0}")]
    NoCompatibleVersion(String),

    #[error("version {version} of {project} has no files")]
    NoFiles { project: String, version: String },

    #[error("registry returned unsafe file name '{0}'")]
    UnsafeFilename(String),

    #[error("failed to create mods directory {0}: {1}")]
    CreateModsDirectory(PathBuf, IoError),

    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, IoError),

    #[error("failed to list mods in {0}: {1}")]
    List(PathBuf, String),

    #[error("mod update cancelled")]
    Cancelled,
}

impl Retryable for ModError {
    fn is_retryable(&self) -> bool {
        matches!(self, ModError::Api(api) if api.is_retryable())
    }

    fn cancelled() -> Self {
        ModError::Cancelled
    }
}

/// Server lifecycle errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server JAR file not found: {0}")]
    ArtifactNotFound(PathBuf),

    #[error("failed to launch session '{session}': {source}")]
    Launch {
        session: String,
        #[source]
        source: IoError,
    },

    #[error("failed to send '{command}' to session '{session}': {source}")]
    SendCommand {
        session: String,
        command: String,
        #[source]
        source: IoError,
    },

    #[error("server failed to start within {0}s")]
    StartupTimeout(u64),

    #[error("server failed to stop within {0}s")]
    StopTimeout(u64),

    #[error("failed to {phase} server during restart: {source}")]
    Restart {
        phase: &'static str,
        #[source]
        source: Box<ServerError>,
    },

    #[error("server operation cancelled")]
    Cancelled,
}

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("webhook request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("notification cancelled")]
    Cancelled,
}

impl Retryable for NotifyError {
    fn is_retryable(&self) -> bool {
        matches!(self, NotifyError::Api(api) if api.is_retryable())
    }

    fn cancelled() -> Self {
        NotifyError::Cancelled
    }
}

pub type BackupResult<T> = Result<T, BackupError>;
pub type ModResult<T> = Result<T, ModError>;
pub type ServerResult<T> = Result<T, ServerError>;
pub type NotifyResult<T> = Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_retry_classification() {
        for status in [500, 502, 503, 504, 429] {
            assert!(ApiError::new("u", status, "x").is_retryable(), "{status}");
        }
        for status in [400, 401, 403, 404, 410, 418] {
            assert!(!ApiError::new("u", status, "x").is_retryable(), "{status}");
        }
    }

    #[test]
    fn test_mod_error_only_retries_transient_api_errors() {
        assert!(ModError::Api(ApiError::new("u", 503, "x")).is_retryable());
        assert!(!ModError::Api(ApiError::new("u", 404, "x")).is_retryable());
        assert!(!ModError::InvalidSource("a/b".into()).is_retryable());
        assert!(!ModError::NoCompatibleVersion("sodium".into()).is_retryable());
        assert!(!ModError::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = ApiError::new("https://api.modrinth.com/v2/project/x/version", 404, "request failed");
        let text = err.to_string();
        assert!(text.contains("404"));
        assert!(text.contains("/project/x/version"));

        let err = ServerError::Restart {
            phase: "stop",
            source: Box::new(ServerError::StopTimeout(300)),
        };
        assert_eq!(
            err.to_string(),
            "failed to stop server during restart: server failed to stop within 300s"
        );
    }
}
