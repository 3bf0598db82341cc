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


//! Encrypted-stream pipeline
//!
//! # Stages
//! ```text
//! Idle → SegmentsDownloading → KeysExtracted → Decrypting → Remuxed → CleanedUp
//!              │                                   │
//!              └→ SegmentDownloadFailed            └→ DecryptFailed
//! ```
//!
//! Stages run strictly in order, video before audio. Any error after the segment
//! download is caught here and becomes [`PipelineOutcome::Failed`], so a lecture
//! loop can log it and move on. Intermediates are removed only once the deliverable
//! exists on disk.

use crate::crypto::keys::KeyDecryptorMap;
use crate::download::segments::DEFAULT_CONCURRENT_FRAGMENTS;
use crate::download::target::EncryptedStream;
use crate::error::DownloadError;
use crate::file::manager::{delete_quietly, file_exists, is_nonempty_file};
use crate::file::paths::{
    encrypted_base, with_suffix, DECRYPTED_AUDIO_SUFFIX, DECRYPTED_VIDEO_SUFFIX,
    ENCRYPTED_AUDIO_SUFFIX, ENCRYPTED_VIDEO_SUFFIX, FINAL_SUFFIX,
};
use crate::pipeline::stages::PipelineStages;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    SegmentsDownloading,
    KeysExtracted,
    Decrypting,
    Remuxed,
    CleanedUp,
    SegmentDownloadFailed,
    DecryptFailed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::SegmentsDownloading => "segments-downloading",
            PipelineState::KeysExtracted => "keys-extracted",
            PipelineState::Decrypting => "decrypting",
            PipelineState::Remuxed => "remuxed",
            PipelineState::CleanedUp => "cleaned-up",
            PipelineState::SegmentDownloadFailed => "segment-download-failed",
            PipelineState::DecryptFailed => "decrypt-failed",
        };
        f.write_str(name)
    }
}

/// Every path of one encrypted lecture, derived from its base name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedAssetSet {
    pub base: PathBuf,
    pub encrypted_video: PathBuf,
    pub encrypted_audio: PathBuf,
    pub decrypted_video: PathBuf,
    pub decrypted_audio: PathBuf,
    pub output: PathBuf,
    pub video_key_id: Option<String>,
    pub audio_key_id: Option<String>,
}

impl EncryptedAssetSet {
    pub fn from_base(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            encrypted_video: with_suffix(&base, ENCRYPTED_VIDEO_SUFFIX),
            encrypted_audio: with_suffix(&base, ENCRYPTED_AUDIO_SUFFIX),
            decrypted_video: with_suffix(&base, DECRYPTED_VIDEO_SUFFIX),
            decrypted_audio: with_suffix(&base, DECRYPTED_AUDIO_SUFFIX),
            output: with_suffix(&base, FINAL_SUFFIX),
            video_key_id: None,
            audio_key_id: None,
            base,
        }
    }

    /// Asset set of a lecture whose deliverable is `lecture_path`
    pub fn for_lecture(lecture_path: &Path) -> Self {
        Self::from_base(encrypted_base(lecture_path))
    }

    /// Title used when none is known: the base file name
    pub fn default_title(&self) -> String {
        self.base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Decrypt and remux when keys are available
    pub decrypt: bool,
    /// Keep `<base>.encrypted.*` after a successful remux
    pub keep_encrypted: bool,
    pub concurrent_fragments: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            decrypt: true,
            keep_encrypted: false,
            concurrent_fragments: DEFAULT_CONCURRENT_FRAGMENTS,
        }
    }
}

#[derive(Debug)]
pub enum PipelineOutcome {
    /// Deliverable was already on disk
    AlreadyDownloaded,
    /// Deliverable produced and intermediates cleaned up
    Completed { output: PathBuf },
    /// Tracks downloaded and inspected, left encrypted
    EncryptedRetained {
        video_key_id: Option<String>,
        audio_key_id: Option<String>,
    },
    /// Lecture failed; the run goes on
    Failed {
        state: PipelineState,
        error: DownloadError,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, PipelineOutcome::Failed { .. })
    }
}

/// Drives one encrypted lecture at a time through the stages
pub struct EncryptedStreamPipeline<S> {
    stages: S,
    keys: Arc<KeyDecryptorMap>,
    options: PipelineOptions,
}

impl<S: PipelineStages> EncryptedStreamPipeline<S> {
    pub fn new(stages: S, keys: Arc<KeyDecryptorMap>, options: PipelineOptions) -> Self {
        Self {
            stages,
            keys,
            options,
        }
    }

    pub fn stages(&self) -> &S {
        &self.stages
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn decrypt_enabled(&self) -> bool {
        self.options.decrypt && !self.keys.is_empty()
    }

    /// Download, decrypt and remux one lecture
    pub async fn run(&self, stream: &EncryptedStream) -> PipelineOutcome {
        let assets = EncryptedAssetSet::for_lecture(&stream.lecture_path());
        if is_nonempty_file(&assets.output).await {
            info!(lecture = stream.filename(), "> Lecture already downloaded, skipping...");
            return PipelineOutcome::AlreadyDownloaded;
        }

        transition(stream.title(), PipelineState::Idle, PipelineState::SegmentsDownloading);

        if let Err(e) = self.stages.download_segments(stream, &assets.base).await {
            error!(lecture = stream.filename(), error = %e, "> Error downloading lecture segments");
            return PipelineOutcome::Failed {
                state: PipelineState::SegmentDownloadFailed,
                error: e,
            };
        }

        self.resume_from_segments(stream.title(), assets).await
    }

    /// Continue a lecture whose encrypted tracks are already on disk
    pub async fn resume_from_segments(&self, title: &str, mut assets: EncryptedAssetSet) -> PipelineOutcome {
        let has_video = file_exists(&assets.encrypted_video).await;
        let has_audio = file_exists(&assets.encrypted_audio).await;
        if !has_video && !has_audio {
            return PipelineOutcome::Failed {
                state: PipelineState::SegmentDownloadFailed,
                error: DownloadError::FileNotFound(format!(
                    "no encrypted tracks for {}",
                    assets.base.display()
                )),
            };
        }

        if has_video {
            match self.stages.extract_key_id(&assets.encrypted_video).await {
                Ok(kid) => assets.video_key_id = kid,
                Err(e) => return failed(title, PipelineState::DecryptFailed, e),
            }
        }
        if has_audio {
            match self.stages.extract_key_id(&assets.encrypted_audio).await {
                Ok(kid) => assets.audio_key_id = kid,
                Err(e) => return failed(title, PipelineState::DecryptFailed, e),
            }
        }
        info!(
            title,
            video_kid = ?assets.video_key_id,
            audio_kid = ?assets.audio_key_id,
            "> Key-IDs extracted"
        );
        transition(title, PipelineState::SegmentsDownloading, PipelineState::KeysExtracted);

        if !self.decrypt_enabled() {
            info!(title, "> Decryption disabled or no keys loaded, keeping encrypted tracks");
            return PipelineOutcome::EncryptedRetained {
                video_key_id: assets.video_key_id,
                audio_key_id: assets.audio_key_id,
            };
        }

        transition(title, PipelineState::KeysExtracted, PipelineState::Decrypting);
        let mut inputs = Vec::with_capacity(2);
        let tracks = [
            (
                has_video,
                &assets.video_key_id,
                &assets.encrypted_video,
                &assets.decrypted_video,
            ),
            (
                has_audio,
                &assets.audio_key_id,
                &assets.encrypted_audio,
                &assets.decrypted_audio,
            ),
        ];
        for (present, kid, encrypted, decrypted) in tracks {
            if !present {
                continue;
            }
            match kid {
                Some(kid) => {
                    if let Err(e) = self.stages.decrypt(&self.keys, kid, encrypted, decrypted).await {
                        return failed(title, PipelineState::DecryptFailed, e);
                    }
                    inputs.push(decrypted.as_path());
                }
                None => {
                    debug!(track = %encrypted.display(), "track not protected, muxing as is");
                    inputs.push(encrypted.as_path());
                }
            }
        }

        self.mux_and_clean(title, &assets, &inputs).await
    }

    /// Remux already decrypted tracks, then clean up
    pub async fn remux_decrypted(&self, title: &str, assets: &EncryptedAssetSet) -> PipelineOutcome {
        let inputs = [assets.decrypted_video.as_path(), assets.decrypted_audio.as_path()];
        self.mux_and_clean(title, assets, &inputs).await
    }

    async fn mux_and_clean(&self, title: &str, assets: &EncryptedAssetSet, inputs: &[&Path]) -> PipelineOutcome {
        if let Err(e) = self.stages.mux(title, inputs, &assets.output).await {
            return failed(title, PipelineState::DecryptFailed, e);
        }
        transition(title, PipelineState::Decrypting, PipelineState::Remuxed);

        if !file_exists(&assets.output).await {
            return failed(
                title,
                PipelineState::DecryptFailed,
                DownloadError::OutputMissing(assets.output.display().to_string()),
            );
        }

        self.cleanup(assets).await;
        transition(title, PipelineState::Remuxed, PipelineState::CleanedUp);
        info!(title, output = %assets.output.display(), "> Lecture complete");

        PipelineOutcome::Completed {
            output: assets.output.clone(),
        }
    }

    async fn cleanup(&self, assets: &EncryptedAssetSet) {
        if !self.options.keep_encrypted {
            delete_quietly(&assets.encrypted_video).await;
            delete_quietly(&assets.encrypted_audio).await;
        }
        delete_quietly(&assets.decrypted_video).await;
        delete_quietly(&assets.decrypted_audio).await;
    }
}

fn transition(title: &str, from: PipelineState, to: PipelineState) {
    debug!(title, %from, %to, "pipeline transition");
}

fn failed(title: &str, state: PipelineState, error: DownloadError) -> PipelineOutcome {
    if error.is_crypto_error() {
        warn!(title, error = %error, "> Cannot decrypt, skipping lecture");
    } else {
        error!(title, %state, error = %error, "> Lecture failed");
    }
    PipelineOutcome::Failed { state, error }
}
