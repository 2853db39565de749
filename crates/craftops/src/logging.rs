//! Logging system setup.
//!
//! Installs the global `tracing` subscriber from the `[logging]` section of
//! the configuration: a console layer on stderr, an optional file layer, and
//! an [`EnvFilter`] that honours `RUST_LOG`.

use anyhow::{anyhow, Result};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::config::LoggingSettings;

/// Name of the log file inside the configured logs directory.
pub const LOG_FILE_NAME: &str = "craftops.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Maps a configured level onto a `tracing` filter directive.
///
/// `CRITICAL` has no `tracing` counterpart and maps to `error`.
pub fn filter_directive(level: &str) -> &'static str {
    match level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

fn layer_for<W>(json: bool, ansi: bool, writer: W) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer()
            .json()
            .with_target(false)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed()
    }
}

fn open_log_file(logs_dir: &Path) -> io::Result<(PathBuf, std::fs::File)> {
    std::fs::create_dir_all(logs_dir)?;
    let path = logs_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// Initialize the logging system.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `settings.level`. A log file that cannot be opened is reported once the
/// console layer is up and does not abort start-up.
///
/// # Errors
///
/// Fails only when a global subscriber is already installed.
pub fn setup_logging(settings: &LoggingSettings, logs_dir: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&settings.level)));
    let json = settings.format == "json";

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if settings.console_enabled {
        layers.push(layer_for(json, !json, io::stderr));
    }

    let mut file_error = None;
    if settings.file_enabled {
        match open_log_file(logs_dir) {
            Ok((_, file)) => layers.push(layer_for(json, false, Mutex::new(file))),
            Err(e) => file_error = Some(e),
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))?;

    if let Some(e) = file_error {
        warn!(
            dir = %logs_dir.display(),
            error = %e,
            "File logging disabled"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filter_directive_mapping() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("INFO"), "info");
        assert_eq!(filter_directive("warning"), "warn");
        assert_eq!(filter_directive("ERROR"), "error");
        assert_eq!(filter_directive("CRITICAL"), "error");
        assert_eq!(filter_directive("unknown"), "info");
    }

    #[test]
    fn test_open_log_file_creates_directory() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("nested").join("logs");

        let (path, _file) = open_log_file(&logs).unwrap();
        assert_eq!(path, logs.join(LOG_FILE_NAME));
        assert!(path.is_file());
    }
}
