//! Blocking archive writer: directory walk into tar into gzip into a file.
//!
//! Everything here runs on a blocking thread. The three writer layers are
//! closed innermost first (tar, then gzip, then the file) and each close
//! result is checked, so a failure while flushing compressed data can never
//! leave a truncated archive behind that looks complete.

use chrono::{DateTime, Local};
use flate2::{write::GzEncoder, Compression};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::exclude::ExclusionRules;
use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};

pub(crate) const ARCHIVE_PREFIX: &str = "minecraft_backup_";
pub(crate) const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Bottom layer of the archive writer.
///
/// `close` must make the written bytes durable and report any failure in
/// doing so; dropping a sink without closing it is only acceptable on an
/// error path.
pub(crate) trait ArchiveSink: Write {
    fn close(self) -> io::Result<()>;
}

impl ArchiveSink for File {
    fn close(self) -> io::Result<()> {
        self.sync_all()
    }
}

/// gzip level for a configured value; anything outside 0..=9 uses the default.
pub(crate) fn compression_for(level: i32) -> Compression {
    match u32::try_from(level) {
        Ok(level) if level <= 9 => Compression::new(level),
        _ => Compression::default(),
    }
}

/// Archive file name for a timestamp, with an optional collision suffix.
pub(crate) fn archive_name(now: DateTime<Local>, suffix: u32) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");
    if suffix == 0 {
        format!("{ARCHIVE_PREFIX}{stamp}{ARCHIVE_SUFFIX}")
    } else {
        format!("{ARCHIVE_PREFIX}{stamp}_{suffix}{ARCHIVE_SUFFIX}")
    }
}

/// Creates a new, previously non-existent archive file in `dir`.
///
/// Two backups started within the same second get `_1`, `_2`, ... suffixes
/// instead of overwriting each other.
fn create_unique(dir: &Path, now: DateTime<Local>) -> BackupResult<(PathBuf, File)> {
    let mut suffix = 0;
    loop {
        let path = dir.join(archive_name(now, suffix));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(BackupError::CreateArchive(path, e)),
        }
    }
}

/// Writes a new archive of `config.source_dir` into `config.backup_dir`.
pub(crate) fn create_archive(
    config: &BackupConfig,
    rules: &ExclusionRules,
    cancel: &CancellationToken,
) -> BackupResult<PathBuf> {
    create_archive_with(config, rules, cancel, |file| file)
}

/// Same as [`create_archive`] with a caller-chosen bottom layer wrapped
/// around the opened file.
pub(crate) fn create_archive_with<S, F>(
    config: &BackupConfig,
    rules: &ExclusionRules,
    cancel: &CancellationToken,
    wrap: F,
) -> BackupResult<PathBuf>
where
    S: ArchiveSink,
    F: FnOnce(File) -> S,
{
    let (path, file) = create_unique(&config.backup_dir, Local::now())?;
    info!(path = %path.display(), source = %config.source_dir.display(), "Creating backup");

    let compression = compression_for(config.compression_level);
    let result = write_layers(wrap(file), &config.source_dir, &path, rules, compression, cancel)
        .and_then(|()| verify_non_empty(&path));

    match result {
        Ok(size) => {
            info!(path = %path.display(), size_bytes = size, "Backup written");
            Ok(path)
        }
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %remove_err, "Failed to remove partial archive");
            }
            Err(e)
        }
    }
}

fn write_layers<S: ArchiveSink>(
    sink: S,
    source_dir: &Path,
    path: &Path,
    rules: &ExclusionRules,
    compression: Compression,
    cancel: &CancellationToken,
) -> BackupResult<()> {
    let mut builder = Builder::new(GzEncoder::new(sink, compression));
    builder.follow_symlinks(false);

    append_tree(&mut builder, source_dir, rules, cancel)?;

    let encoder = builder.into_inner().map_err(|source| BackupError::Finalize {
        stage: "tar",
        path: path.to_path_buf(),
        source,
    })?;
    let sink = encoder.finish().map_err(|source| BackupError::Finalize {
        stage: "gzip",
        path: path.to_path_buf(),
        source,
    })?;
    sink.close().map_err(|source| BackupError::Finalize {
        stage: "file",
        path: path.to_path_buf(),
        source,
    })
}

fn append_tree<W: Write>(
    builder: &mut Builder<W>,
    root: &Path,
    rules: &ExclusionRules,
    cancel: &CancellationToken,
) -> BackupResult<()> {
    let mut entries = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = entries.next() {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        let entry = entry.map_err(|e| {
            let at = e.path().unwrap_or(root).to_path_buf();
            BackupError::Walk(at, e.to_string())
        })?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| BackupError::Walk(entry.path().to_path_buf(), e.to_string()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            debug!(path = %entry.path().display(), "Skipping symlink");
            continue;
        }

        let name = archive_path(rel);
        if rules.is_excluded(&name, file_type.is_dir()) {
            if file_type.is_dir() {
                entries.skip_current_dir();
            }
            continue;
        }

        let appended = if file_type.is_dir() {
            builder.append_dir(&name, entry.path())
        } else if file_type.is_file() {
            builder.append_path_with_name(entry.path(), &name)
        } else {
            append_special(builder, entry.path(), &name)
        };
        appended.map_err(|e| BackupError::AddEntry(entry.path().to_path_buf(), e))?;
    }

    Ok(())
}

/// Records a header-only entry for fifos, sockets and device nodes.
fn append_special<W: Write>(builder: &mut Builder<W>, path: &Path, name: &str) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    let mut header = Header::new_gnu();
    header.set_metadata(&metadata);
    header.set_size(0);
    builder.append_data(&mut header, name, io::empty())
}

/// Relative path with `/` separators regardless of platform.
fn archive_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn verify_non_empty(path: &Path) -> BackupResult<u64> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        _ => Err(BackupError::EmptyArchive(path.to_path_buf())),
    }
}
