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


//! HLS lecture download
//!
//! Unencrypted HLS playlists are fetched by ffmpeg into `<stem>.hls-part.mp4`
//! next to the destination; a zero exit status promotes it to the final name.

use crate::download::target::DownloadTarget;
use crate::error::Result;
use crate::file::manager::safe_move;
use crate::media::tools::{ExternalTools, Invocation};
use std::path::{Path, PathBuf};
use tracing::info;

const HLS_PART_SUFFIX: &str = ".hls-part.mp4";

/// Temporary output of an HLS download: `lecture.mp4` → `lecture.hls-part.mp4`
pub fn hls_part_path(destination: &Path) -> PathBuf {
    let stem = destination
        .to_string_lossy()
        .trim_end_matches(".mp4")
        .to_string();
    PathBuf::from(format!("{}{}", stem, HLS_PART_SUFFIX))
}

/// Download an HLS playlist to the target's destination
pub async fn download_hls(tools: &ExternalTools, target: &DownloadTarget) -> Result<()> {
    let destination = target.destination();
    let part = hls_part_path(&destination);

    info!(url = %target.url(), output = %part.display(), "> Downloading HLS stream...");
    tools
        .run(build_hls_invocation(tools, target, &part))
        .await?;

    safe_move(&part, &destination).await
}

/// Build the ffmpeg command line for an HLS download
pub fn build_hls_invocation(tools: &ExternalTools, target: &DownloadTarget, output: &Path) -> Invocation {
    let mut invocation = Invocation::new("ffmpeg", &tools.ffmpeg).args(["-y", "-loglevel", "warning"]);

    if let Some(token) = target.token() {
        invocation = invocation
            .arg("-headers")
            .arg(format!("Authorization: Bearer {}\r\n", token));
    }

    invocation
        .arg("-i")
        .arg(target.url().as_str())
        .args(["-c", "copy", "-bsf:a", "aac_adtstoasc"])
        .arg(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::target::MediaKind;

    #[test]
    fn test_hls_part_path() {
        assert_eq!(
            hls_part_path(Path::new("/c/01 Intro.mp4")),
            PathBuf::from("/c/01 Intro.hls-part.mp4")
        );
    }

    #[test]
    fn test_hls_command_with_token() {
        let target = DownloadTarget::new(
            MediaKind::HlsStream,
            "https://cdn.example.com/hls/index.m3u8",
            "/c",
            "01 Intro",
            "mp4",
        )
        .unwrap()
        .with_token("secret");

        let inv = build_hls_invocation(&ExternalTools::default(), &target, Path::new("/c/01 Intro.hls-part.mp4"));

        assert_eq!(
            inv.args_lossy(),
            vec![
                "-y",
                "-loglevel",
                "warning",
                "-headers",
                "Authorization: Bearer secret\r\n",
                "-i",
                "https://cdn.example.com/hls/index.m3u8",
                "-c",
                "copy",
                "-bsf:a",
                "aac_adtstoasc",
                "/c/01 Intro.hls-part.mp4",
            ]
        );
    }
}
