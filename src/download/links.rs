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


//! External link manifest
//!
//! External-link assets are never fetched. Each one is appended to
//! `external-assets-links.txt` in its output directory as a two-line record:
//!
//! ```text
//!
//! <name>
//! <url>
//! ```
//!
//! A name already present in the file (compared case-insensitively) is not added again.

use crate::error::Result;
use crate::file::manager::ensure_directory_exists;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const LINK_MANIFEST_NAME: &str = "external-assets-links.txt";

/// Path of the manifest for a directory
pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(LINK_MANIFEST_NAME)
}

/// Append a link record unless `name` is already listed
///
/// Returns `true` if a record was written.
pub async fn record_external_link(dir: &Path, name: &str, url: &str) -> Result<bool> {
    ensure_directory_exists(dir).await?;
    let path = manifest_path(dir);

    let wanted = name.trim().to_lowercase();
    if let Ok(bytes) = fs::read(&path).await {
        let existing = String::from_utf8_lossy(&bytes);
        if existing.lines().any(|line| line.trim().to_lowercase() == wanted) {
            return Ok(false);
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(format!("\n{}\n{}\n", name, url).as_bytes())
        .await?;
    file.flush().await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_and_dedup() {
        let dir = TempDir::new().unwrap();

        assert!(record_external_link(dir.path(), "Rust Book", "https://doc.rust-lang.org/book/")
            .await
            .unwrap());
        assert!(!record_external_link(dir.path(), "RUST BOOK", "https://elsewhere/")
            .await
            .unwrap());
        assert!(record_external_link(dir.path(), "Cargo Guide", "https://doc.rust-lang.org/cargo/")
            .await
            .unwrap());

        let content = fs::read_to_string(manifest_path(dir.path())).await.unwrap();
        assert_eq!(
            content,
            "\nRust Book\nhttps://doc.rust-lang.org/book/\n\nCargo Guide\nhttps://doc.rust-lang.org/cargo/\n"
        );
    }
}
