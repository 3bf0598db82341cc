// lecture-dl - Course Media Downloader
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! File operations used by the fetcher and the pipeline
//!
//! # Key Operations
//! - Safe file moves (atomic rename on the same filesystem, with retry)
//! - Existence checks that treat empty files as absent
//! - Best-effort deletion of intermediates

use crate::error::{DownloadError, Result};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Maximum retry attempts for file operations
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Safe move operation with retry
///
/// # Algorithm
/// 1. Check source exists
/// 2. Create destination directory
/// 3. Rename (atomic on the same filesystem, replaces an existing destination)
/// 4. Retry up to 3 times on failure
pub async fn safe_move(source: &Path, destination: &Path) -> Result<()> {
    let mut attempts = 0;

    loop {
        attempts += 1;

        match try_move(source, destination).await {
            Ok(()) => return Ok(()),
            Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                return Err(DownloadError::FileIoError(format!(
                    "Failed to move file after {} attempts: {} -> {}: {}",
                    MAX_RETRY_ATTEMPTS,
                    source.display(),
                    destination.display(),
                    e
                )));
            }
            Err(e) => {
                debug!(error = %e, attempt = attempts, "move failed, retrying");
                sleep(RETRY_DELAY).await;
            }
        }
    }
}

async fn try_move(source: &Path, destination: &Path) -> Result<()> {
    if !file_exists(source).await {
        return Err(DownloadError::FileNotFound(source.display().to_string()));
    }

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    fs::rename(source, destination).await?;
    Ok(())
}

/// Delete a file if it exists
///
/// Returns `Ok(true)` if a file was removed, `Ok(false)` if there was nothing to remove.
pub async fn safe_delete(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DownloadError::FileIoError(format!(
            "delete: {} - {}",
            path.display(),
            e
        ))),
    }
}

/// Delete a file, logging instead of failing
pub async fn delete_quietly(path: &Path) {
    if let Err(e) = safe_delete(path).await {
        warn!(path = %path.display(), error = %e, "could not delete file");
    }
}

/// Check if a regular file exists
pub async fn file_exists(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Check if a regular, non-empty file exists
pub async fn is_nonempty_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Size of a file, 0 if it does not exist
pub async fn file_size(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

/// Create a directory (and parents) if needed
pub async fn ensure_directory_exists(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await.map_err(|e| {
        DownloadError::FileIoError(format!("create_dir: {} - {}", path.display(), e))
    })
}
