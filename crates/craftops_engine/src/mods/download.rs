//! Atomic artifact download.
//!
//! Bytes are streamed into a hidden temporary file inside the mods
//! directory and only renamed over the final path once the whole body has
//! been written and synced. The rename replaces any existing file in one
//! step, so the final path always holds either the previous complete jar or
//! the new complete jar. The temporary file is removed on every failure
//! path when it is dropped.

use reqwest::Client;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder as TempBuilder;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::ensure_success;
use crate::error::{ModError, ModResult};
use crate::retry::RetryPolicy;

/// Prefix of in-progress download files.
pub(crate) const TEMP_PREFIX: &str = ".tmp-";

/// Downloads `url` to `dir/filename`, retrying transient failures.
pub(crate) async fn download_atomic(
    http: &Client,
    url: &str,
    dir: &Path,
    filename: &str,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> ModResult<PathBuf> {
    let final_path = dir.join(filename);
    let temp = TempBuilder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| ModError::Io(dir.to_path_buf(), e))?;

    // Each attempt starts from an empty file. `&File` implements `Write`,
    // so attempts share the handle without taking it out of `temp`.
    let file = temp.as_file();
    retry
        .run(cancel, |attempt| async move {
            debug!(url, attempt, "Downloading");
            fetch_into(http, url, file, cancel).await
        })
        .await?;

    temp.persist(&final_path)
        .map_err(|e| ModError::Io(final_path.clone(), e.error))?;
    Ok(final_path)
}

async fn fetch_into(
    http: &Client,
    url: &str,
    mut file: &File,
    cancel: &CancellationToken,
) -> ModResult<()> {
    let io_err = |e| ModError::Io(PathBuf::from(url), e);

    file.set_len(0).map_err(io_err)?;
    file.seek(SeekFrom::Start(0)).map_err(io_err)?;

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ModError::Cancelled),
        sent = http.get(url).send() => sent.map_err(|source| ModError::Http { url: url.to_string(), source })?,
    };
    let mut response = ensure_success(url, response, "download failed")?;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(ModError::Cancelled),
            chunk = response.chunk() => chunk.map_err(|source| ModError::Http { url: url.to_string(), source })?,
        };
        match chunk {
            Some(bytes) => file.write_all(&bytes).map_err(io_err)?,
            None => break,
        }
    }

    file.flush().map_err(io_err)?;
    file.sync_all().map_err(io_err)
}
