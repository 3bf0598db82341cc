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


//! Download management and streaming
//!
//! This module fetches course media: lecture streams, assets, subtitles and
//! external links, plus the segmented download of DRM-protected lectures.
//!
//! - `target` - what to download, with filenames fixed at construction
//! - `state` - per-call partial-file bookkeeping
//! - `stream` - resumable HTTP fetch of a single resource
//! - `hls` - unencrypted HLS through ffmpeg
//! - `segments` - encrypted tracks through yt-dlp/aria2c
//! - `links` - the external link manifest
//! - `manager` - configuration, shared context, the download queue

pub mod hls;
pub mod links;
pub mod manager;
pub mod progress;
pub mod segments;
pub mod state;
pub mod stream;
pub mod target;

// Re-export commonly used types
pub use manager::{interrupt_signal, DownloadConfig, DownloadContext, DownloadQueue, DownloadSummary};
pub use progress::{ProgressCallback, TransferProgress};
pub use state::TransferState;
pub use stream::{ChunkedFetcher, FetchOutcome};
pub use target::{DownloadTarget, Downloadable, EncryptedStream, MediaKind};
