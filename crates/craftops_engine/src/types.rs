//! Data model shared between the engine and its callers.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::health::format_size;

/// Latest compatible release of a project as resolved from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModVersionInfo {
    pub project_id: String,
    pub version_id: String,
    pub version_number: String,
    pub download_url: String,
    pub filename: String,
}

/// Aggregate outcome of one `update_all` run.
///
/// Every configured source lands in exactly one of the three buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModUpdateResult {
    pub updated: Vec<String>,
    pub failed: BTreeMap<String, String>,
    pub skipped: Vec<String>,
}

impl ModUpdateResult {
    /// Number of sources recorded across all buckets.
    pub fn total(&self) -> usize {
        self.updated.len() + self.failed.len() + self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// A jar already present in the mods directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledMod {
    pub name: String,
    pub filename: String,
    pub size: u64,
    pub modified: DateTime<Local>,
}

/// One backup archive on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    pub size_bytes: u64,
}

impl BackupRecord {
    pub fn size_formatted(&self) -> String {
        format_size(self.size_bytes)
    }
}

/// Observed server state. Never cached; every status query builds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerState {
    pub running: bool,
    pub session_name: String,
    pub checked_at: DateTime<Local>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_result_totals() {
        let mut result = ModUpdateResult::default();
        assert!(result.is_empty());

        result.updated.push("sodium".into());
        result.skipped.push("lithium".into());
        result
            .failed
            .insert("missing".into(), "no compatible versions found".into());
        assert_eq!(result.total(), 3);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_backup_record_size() {
        let record = BackupRecord {
            name: "minecraft_backup_20240101_000000.tar.gz".into(),
            path: PathBuf::from("/tmp/x.tar.gz"),
            created_at: Local::now(),
            size_bytes: 3 * 1024 * 1024,
        };
        assert_eq!(record.size_formatted(), "3.0 MB");
    }
}
