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


//! Pipeline stages
//!
//! Each step of the encrypted-stream pipeline sits behind [`PipelineStages`] so the
//! state machine can be driven without spawning any external tool.

use crate::crypto::decrypt::DecryptInvoker;
use crate::crypto::keys::KeyDecryptorMap;
use crate::crypto::widevine;
use crate::download::segments::SegmentFetcher;
use crate::download::target::EncryptedStream;
use crate::error::Result;
use crate::media::remux::RemuxInvoker;
use crate::media::tools::ExternalTools;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait PipelineStages: Send + Sync {
    /// Fetch every track of `stream` as `<base>.encrypted.<ext>`
    async fn download_segments(&self, stream: &EncryptedStream, base: &Path) -> Result<()>;

    /// Key-ID of an encrypted track; `None` if the track is not protected
    async fn extract_key_id(&self, encrypted: &Path) -> Result<Option<String>>;

    /// Decrypt one track
    async fn decrypt(
        &self,
        keys: &KeyDecryptorMap,
        key_id: &str,
        input: &Path,
        output: &Path,
    ) -> Result<()>;

    /// Remux tracks into the deliverable
    async fn mux(&self, title: &str, inputs: &[&Path], output: &Path) -> Result<()>;
}

/// Stages backed by the external tools
#[derive(Debug, Clone)]
pub struct ToolStages {
    segments: SegmentFetcher,
    decryptor: DecryptInvoker,
    remuxer: RemuxInvoker,
}

impl ToolStages {
    pub fn new(tools: ExternalTools, concurrent_fragments: u32) -> Self {
        Self {
            segments: SegmentFetcher::new(tools.clone()).with_concurrency(concurrent_fragments),
            decryptor: DecryptInvoker::new(tools.clone()),
            remuxer: RemuxInvoker::new(tools),
        }
    }
}

#[async_trait]
impl PipelineStages for ToolStages {
    async fn download_segments(&self, stream: &EncryptedStream, base: &Path) -> Result<()> {
        self.segments
            .fetch(stream.url(), stream.format_id(), base)
            .await
    }

    async fn extract_key_id(&self, encrypted: &Path) -> Result<Option<String>> {
        widevine::extract_key_id(encrypted).await
    }

    async fn decrypt(
        &self,
        keys: &KeyDecryptorMap,
        key_id: &str,
        input: &Path,
        output: &Path,
    ) -> Result<()> {
        self.decryptor.decrypt(keys, key_id, input, output).await
    }

    async fn mux(&self, title: &str, inputs: &[&Path], output: &Path) -> Result<()> {
        match inputs {
            [video, audio] => self.remuxer.mux(title, video, audio, output).await,
            _ => self.remuxer.mux_inputs(title, inputs, output).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DownloadError;

    fn missing_tools() -> ExternalTools {
        ExternalTools {
            ffmpeg: "/definitely/not/ffmpeg".into(),
            nice: false,
            ..ExternalTools::default()
        }
    }

    #[tokio::test]
    async fn test_two_track_mux_spawns_remuxer() {
        let stages = ToolStages::new(missing_tools(), 4);
        let result = stages
            .mux(
                "01 Intro",
                &[Path::new("/c/a.decrypted.mp4"), Path::new("/c/a.decrypted.m4a")],
                Path::new("/c/a.mp4"),
            )
            .await;
        assert!(matches!(result, Err(DownloadError::ToolNotFound(tool)) if tool == "ffmpeg"));
    }

    #[tokio::test]
    async fn test_single_track_mux_spawns_remuxer() {
        let stages = ToolStages::new(missing_tools(), 4);
        let result = stages
            .mux("01 Intro", &[Path::new("/c/a.decrypted.mp4")], Path::new("/c/a.mp4"))
            .await;
        assert!(matches!(result, Err(DownloadError::ToolNotFound(tool)) if tool == "ffmpeg"));
    }
}
