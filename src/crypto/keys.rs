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


//! Key-ID → key mapping loaded from the keyfile
//!
//! The keyfile is a JSON object of lowercase hex key-IDs to hex content keys:
//!
//! ```json
//! { "abc123": "00112233445566778899aabbccddeeff" }
//! ```
//!
//! It is loaded once per run and shared read-only by every pipeline. A missing
//! or empty keyfile is not an error: decryption is skipped and encrypted files kept.

use crate::error::{DownloadError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDecryptorMap {
    keys: HashMap<String, String>,
}

impl KeyDecryptorMap {
    /// Build a map, normalizing key-IDs to lowercase
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            keys: entries
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v.into()))
                .collect(),
        }
    }

    /// Load the keyfile at `path`
    ///
    /// # Errors
    /// `InvalidKeyfile` if the file exists but is not a JSON object of strings.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "keyfile not found, decryption disabled");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let map = Self::parse(&content).map_err(|reason| DownloadError::InvalidKeyfile {
            path: path.display().to_string(),
            reason,
        })?;
        info!(path = %path.display(), keys = map.len(), "keyfile loaded");
        Ok(map)
    }

    /// Parse keyfile content; blank content is an empty map
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: HashMap<String, String> =
            serde_json::from_str(content).map_err(|e| e.to_string())?;
        Ok(Self::new(raw))
    }

    /// Look up the key for a key-ID, case-insensitively
    pub fn get(&self, key_id: &str) -> Option<&str> {
        self.keys
            .get(&key_id.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Look up the key, failing with `KeyNotFound`
    pub fn require(&self, key_id: &str) -> Result<&str> {
        self.get(key_id)
            .ok_or_else(|| DownloadError::KeyNotFound(key_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let map = KeyDecryptorMap::parse(r#"{"abc123": "00112233445566778899aabbccddeeff"}"#)
            .unwrap();

        assert_eq!(map.get("ABC123"), Some("00112233445566778899aabbccddeeff"));
        assert_eq!(map.get("abc123"), Some("00112233445566778899aabbccddeeff"));
        assert!(matches!(map.require("DEF456"), Err(DownloadError::KeyNotFound(k)) if k == "DEF456"));
    }

    #[tokio::test]
    async fn test_missing_keyfile_is_empty() {
        let dir = TempDir::new().unwrap();
        let map = KeyDecryptorMap::load(&dir.path().join("keyfile.json"))
            .await
            .unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_blank_keyfile_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keyfile.json");
        tokio::fs::write(&path, "  \n").await.unwrap();

        assert!(KeyDecryptorMap::load(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_keyfile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keyfile.json");
        tokio::fs::write(&path, "[1, 2]").await.unwrap();

        assert!(matches!(
            KeyDecryptorMap::load(&path).await,
            Err(DownloadError::InvalidKeyfile { .. })
        ));
    }
}
