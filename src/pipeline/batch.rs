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


//! Batch decryption of leftover encrypted sources
//!
//! Finishes lectures that were downloaded but never decrypted or remuxed (for
//! example because the keyfile was missing on the first run), then removes every
//! intermediate whose deliverable exists. Encrypted tracks are kept when the
//! pipeline is set to keep them.

use crate::error::Result;
use crate::file::manager::delete_quietly;
use crate::file::paths::is_encrypted_intermediate;
use crate::file::scanner::{scan_encrypted_sources, scan_finished_intermediates};
use crate::pipeline::encrypted::{EncryptedAssetSet, EncryptedStreamPipeline, PipelineOutcome};
use crate::pipeline::stages::PipelineStages;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub retained: usize,
    pub removed_intermediates: usize,
}

/// Decrypt and remux every unfinished lecture under `root`
pub async fn decrypt_all_sources<S: PipelineStages>(
    pipeline: &EncryptedStreamPipeline<S>,
    root: &Path,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    let sources = scan_encrypted_sources(root).await?;
    info!(root = %root.display(), count = sources.len(), "> Found encrypted sources");

    for source in sources {
        let assets = EncryptedAssetSet::from_base(&source.base);
        let title = assets.default_title();

        let outcome = if source.decrypted_ready {
            info!(title = %title, "> Decrypted tracks present, merging only");
            pipeline.remux_decrypted(&title, &assets).await
        } else {
            pipeline.resume_from_segments(&title, assets).await
        };

        match outcome {
            PipelineOutcome::Completed { .. } | PipelineOutcome::AlreadyDownloaded => {
                summary.completed += 1
            }
            PipelineOutcome::EncryptedRetained { .. } => summary.retained += 1,
            PipelineOutcome::Failed { error, .. } => {
                warn!(title = %title, error = %error, "> Skipping lecture");
                summary.failed += 1;
            }
        }
    }

    let keep_encrypted = pipeline.options().keep_encrypted;
    for leftover in scan_finished_intermediates(root).await? {
        if keep_encrypted && is_encrypted_intermediate(&leftover) {
            continue;
        }
        delete_quietly(&leftover).await;
        summary.removed_intermediates += 1;
    }

    info!(
        completed = summary.completed,
        failed = summary.failed,
        retained = summary.retained,
        removed = summary.removed_intermediates,
        "> Batch decryption finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyDecryptorMap;
    use crate::pipeline::encrypted::test_support::MockStages;
    use crate::pipeline::encrypted::PipelineOptions;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_batch_resumes_and_cleans() {
        let dir = TempDir::new().unwrap();
        let course = dir.path().join("01 Chapter");
        tokio::fs::create_dir_all(&course).await.unwrap();

        // Needs decrypt + remux
        tokio::fs::write(course.join("a.encrypted.mp4"), b"v").await.unwrap();
        tokio::fs::write(course.join("a.encrypted.m4a"), b"a").await.unwrap();
        // Needs remux only
        tokio::fs::write(course.join("b.encrypted.m4a"), b"a").await.unwrap();
        tokio::fs::write(course.join("b.decrypted.mp4"), b"v").await.unwrap();
        tokio::fs::write(course.join("b.decrypted.m4a"), b"a").await.unwrap();
        // Finished earlier, leftover intermediate
        tokio::fs::write(course.join("c.mp4"), b"final").await.unwrap();
        tokio::fs::write(course.join("c.encrypted.m4a"), b"a").await.unwrap();

        let stages = MockStages::with_kids(&[("a.encrypted.mp4", "ABC123"), ("a.encrypted.m4a", "ABC123")]);
        let keys = Arc::new(KeyDecryptorMap::new([("abc123", "00ff")]));
        let options = PipelineOptions::default();
        let pipeline = EncryptedStreamPipeline::new(stages, keys, options);

        let summary = decrypt_all_sources(&pipeline, dir.path()).await.unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 0);
        assert!(course.join("a.mp4").exists());
        assert!(course.join("b.mp4").exists());
        assert!(!course.join("c.encrypted.m4a").exists());
        assert!(!course.join("b.encrypted.m4a").exists());

        let calls = pipeline.stages().calls();
        assert!(calls.contains(&"mux b.decrypted.mp4 b.decrypted.m4a".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("decrypt") && c.contains(" b.")));
    }

    #[tokio::test]
    async fn test_batch_keeps_encrypted_tracks_when_asked() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.encrypted.mp4"), b"v").await.unwrap();
        tokio::fs::write(dir.path().join("a.encrypted.m4a"), b"a").await.unwrap();
        tokio::fs::write(dir.path().join("c.mp4"), b"final").await.unwrap();
        tokio::fs::write(dir.path().join("c.encrypted.m4a"), b"a").await.unwrap();
        tokio::fs::write(dir.path().join("c.decrypted.m4a"), b"a").await.unwrap();

        let stages = MockStages::with_kids(&[("a.encrypted.mp4", "ABC123"), ("a.encrypted.m4a", "ABC123")]);
        let keys = Arc::new(KeyDecryptorMap::new([("abc123", "00ff")]));
        let options = PipelineOptions {
            keep_encrypted: true,
            ..PipelineOptions::default()
        };
        let pipeline = EncryptedStreamPipeline::new(stages, keys, options);

        let summary = decrypt_all_sources(&pipeline, dir.path()).await.unwrap();

        assert_eq!(summary.completed, 1);
        assert!(dir.path().join("a.mp4").exists());
        assert!(dir.path().join("a.encrypted.mp4").exists());
        assert!(dir.path().join("a.encrypted.m4a").exists());
        assert!(dir.path().join("c.encrypted.m4a").exists());
        assert!(!dir.path().join("c.decrypted.m4a").exists());
        assert_eq!(summary.removed_intermediates, 1);
    }

    #[tokio::test]
    async fn test_batch_continues_after_missing_key() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.encrypted.m4a"), b"a").await.unwrap();
        tokio::fs::write(dir.path().join("b.encrypted.m4a"), b"a").await.unwrap();

        let stages = MockStages::with_kids(&[("a.encrypted.m4a", "FFFF"), ("b.encrypted.m4a", "ABC123")]);
        let keys = Arc::new(KeyDecryptorMap::new([("abc123", "00ff")]));
        let pipeline = EncryptedStreamPipeline::new(stages, keys, PipelineOptions::default());

        let summary = decrypt_all_sources(&pipeline, dir.path()).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 1);
        assert!(!dir.path().join("a.mp4").exists());
        assert!(dir.path().join("b.mp4").exists());
    }
}
