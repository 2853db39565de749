//! Diagnostic primitives shared by every subsystem's health check.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Outcome of a single diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Warn,
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Warn => "WARN",
            HealthStatus::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// One diagnostic result: which component, how it fared, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
}

impl HealthCheck {
    pub fn new(name: impl Into<String>, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
        }
    }

    pub fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Ok, message)
    }

    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Warn, message)
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Error, message)
    }
}

/// Checks that `path` exists and is a directory.
///
/// A missing path is only a warning since most directories are created on
/// first use; a path that exists but is a file is an error.
pub fn check_path(name: &str, path: &Path) -> HealthCheck {
    match std::fs::metadata(path) {
        Err(_) => HealthCheck::warn(name, "Does not exist"),
        Ok(meta) if !meta.is_dir() => HealthCheck::error(name, "Not a directory"),
        Ok(_) => HealthCheck::ok(name, "OK"),
    }
}

/// Probes whether `binary` can be executed by running `<binary> -version`.
///
/// The probe is bounded by its own `timeout` and the child is killed if the
/// timeout elapses.
pub async fn check_binary(binary: &str, name: &str, timeout: Duration) -> HealthCheck {
    let probe = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(timeout, probe).await {
        Ok(Ok(status)) if status.success() => HealthCheck::ok(name, "Available"),
        Ok(Ok(status)) => {
            debug!(binary, ?status, "binary probe exited unsuccessfully");
            HealthCheck::error(name, format!("{binary} not found"))
        }
        Ok(Err(e)) => {
            debug!(binary, error = %e, "binary probe failed to spawn");
            HealthCheck::error(name, format!("{binary} not found"))
        }
        Err(_) => {
            debug!(binary, ?timeout, "binary probe timed out");
            HealthCheck::error(name, format!("{binary} not found"))
        }
    }
}

/// Renders a byte count as megabytes, switching to gigabytes at 1024 MB.
pub fn format_size(bytes: u64) -> String {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else {
        format!("{mb:.1} MB")
    }
}
