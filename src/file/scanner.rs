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


//! Directory scanner for leftover encrypted lecture sources
//!
//! Walks an output tree looking for `<base>.encrypted.m4a` files whose final
//! `<base>.mp4` was never produced, and for intermediates whose final exists.

use crate::error::{DownloadError, Result};
use crate::file::manager::file_exists;
use crate::file::paths::{
    final_from_intermediate, is_intermediate, strip_suffix, with_suffix, DECRYPTED_AUDIO_SUFFIX,
    DECRYPTED_VIDEO_SUFFIX, ENCRYPTED_AUDIO_SUFFIX, FINAL_SUFFIX,
};
use std::path::{Path, PathBuf};
use tokio::fs;

/// An encrypted lecture left on disk without its final deliverable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSource {
    /// Shared base name of every file of this lecture
    pub base: PathBuf,

    /// Both decrypted intermediates are present, only the remux is missing
    pub decrypted_ready: bool,
}

/// Find encrypted sources under `root` that have no final `<base>.mp4`
///
/// Results are sorted by path.
pub async fn scan_encrypted_sources(root: &Path) -> Result<Vec<EncryptedSource>> {
    let files = list_files(root).await?;

    let mut sources = Vec::new();
    for file in files {
        let base = match strip_suffix(&file, ENCRYPTED_AUDIO_SUFFIX) {
            Some(base) => base,
            None => continue,
        };
        if file_exists(&with_suffix(&base, FINAL_SUFFIX)).await {
            continue;
        }

        let decrypted_ready = file_exists(&with_suffix(&base, DECRYPTED_VIDEO_SUFFIX)).await
            && file_exists(&with_suffix(&base, DECRYPTED_AUDIO_SUFFIX)).await;
        sources.push(EncryptedSource {
            base,
            decrypted_ready,
        });
    }

    Ok(sources)
}

/// Find `.(en|de)crypted.(mp4|m4a)` intermediates whose final deliverable exists
pub async fn scan_finished_intermediates(root: &Path) -> Result<Vec<PathBuf>> {
    let files = list_files(root).await?;

    let mut finished = Vec::new();
    for file in files.into_iter().filter(|f| is_intermediate(f)) {
        if let Some(final_path) = final_from_intermediate(&file) {
            if file_exists(&final_path).await {
                finished.push(file);
            }
        }
    }

    Ok(finished)
}

/// List every regular file under `root`, sorted
async fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(DownloadError::InvalidPath(format!(
            "Path is not a directory: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();
    scan_recursive(root, &mut files).await?;
    files.sort();
    Ok(files)
}

fn scan_recursive<'a>(
    dir: &'a Path,
    files: &'a mut Vec<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await.map_err(|e| {
            DownloadError::FileIoError(format!(
                "Failed to read directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            DownloadError::FileIoError(format!(
                "Failed to read directory entry in {}: {}",
                dir.display(),
                e
            ))
        })? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                scan_recursive(&path, files).await?;
            } else if file_type.is_file() {
                files.push(path);
            }
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(path, b"x").await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(scan_encrypted_sources(dir.path()).await.unwrap().is_empty());
        assert!(scan_finished_intermediates(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_classifies_sources() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        // finished lecture
        touch(&root.join("a/01 done.encrypted.m4a")).await;
        touch(&root.join("a/01 done.mp4")).await;
        // decrypted but never remuxed
        touch(&root.join("a/02 half.encrypted.m4a")).await;
        touch(&root.join("a/02 half.decrypted.mp4")).await;
        touch(&root.join("a/02 half.decrypted.m4a")).await;
        // still encrypted
        touch(&root.join("b/03 raw.encrypted.m4a")).await;
        touch(&root.join("b/03 raw.encrypted.mp4")).await;

        let sources = scan_encrypted_sources(root).await.unwrap();
        assert_eq!(
            sources,
            vec![
                EncryptedSource {
                    base: root.join("a/02 half"),
                    decrypted_ready: true,
                },
                EncryptedSource {
                    base: root.join("b/03 raw"),
                    decrypted_ready: false,
                },
            ]
        );

        let finished = scan_finished_intermediates(root).await.unwrap();
        assert_eq!(finished, vec![root.join("a/01 done.encrypted.m4a")]);
    }

    #[tokio::test]
    async fn test_scan_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        touch(&file).await;
        assert!(scan_encrypted_sources(&file).await.is_err());
    }
}
