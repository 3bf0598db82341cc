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


//! Audio/video remuxing
//!
//! Combines the decrypted video and audio tracks of a lecture into one MP4
//! without re-encoding:
//!
//! ```text
//! ffmpeg -y -i <video> -i <audio> -acodec copy -vcodec copy -fflags +bitexact \
//!        -map_metadata -1 -metadata title=<title> <output>
//! ```
//!
//! Pre-existing container metadata is stripped and only the title is written.
//! A non-zero ffmpeg exit is reported as `ExternalToolFailure`; callers still check
//! that the output exists before deleting any input.

use crate::error::Result;
use crate::media::tools::{ExternalTools, Invocation};
use std::path::Path;
use tracing::info;

/// Remuxer front-end over ffmpeg
#[derive(Debug, Clone)]
pub struct RemuxInvoker {
    tools: ExternalTools,
}

impl RemuxInvoker {
    pub fn new(tools: ExternalTools) -> Self {
        Self { tools }
    }

    /// Mux `video_path` and `audio_path` into `output_path` with a title tag
    pub async fn mux(
        &self,
        title: &str,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<()> {
        self.mux_inputs(title, &[video_path, audio_path], output_path)
            .await
    }

    /// Mux any number of tracks (one when a lecture lacks audio or video)
    pub async fn mux_inputs(&self, title: &str, inputs: &[&Path], output_path: &Path) -> Result<()> {
        info!(title, output = %output_path.display(), tracks = inputs.len(), "> Merging tracks...");
        let invocation = build_mux_invocation(&self.tools, title, inputs, output_path);
        self.tools.run(invocation).await
    }
}

/// Build the ffmpeg command line for a stream-copy remux
pub fn build_mux_invocation(
    tools: &ExternalTools,
    title: &str,
    inputs: &[&Path],
    output_path: &Path,
) -> Invocation {
    let mut invocation = Invocation::new("ffmpeg", &tools.ffmpeg)
        .niced(tools.nice)
        .arg("-y");

    for input in inputs {
        invocation = invocation.arg("-i").arg(input);
    }

    invocation
        .args(["-acodec", "copy", "-vcodec", "copy"])
        .args(["-fflags", "+bitexact"])
        .args(["-map_metadata", "-1"])
        .arg("-metadata")
        .arg(format!("title={}", title))
        .arg(output_path)
}
