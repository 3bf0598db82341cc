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


//! Segmented download of encrypted lecture streams
//!
//! The manifest is handed to `yt-dlp`, which fetches fragments through `aria2c` in
//! parallel and writes one file per track:
//!
//! ```text
//! yt-dlp --force-generic-extractor --allow-unplayable-formats \
//!        --concurrent-fragments <N> --downloader aria2c --fixup never -k \
//!        -o "<base>.encrypted.%(ext)s" -f <format_id> <url>
//! ```
//!
//! The tracks are left encrypted (`--allow-unplayable-formats`, `--fixup never`) and
//! kept separate (`-k`), so the result is `<base>.encrypted.mp4` and `<base>.encrypted.m4a`.

use crate::error::Result;
use crate::media::tools::{ExternalTools, Invocation};
use std::path::Path;
use tracing::info;
use url::Url;

/// Default number of fragments fetched in parallel
pub const DEFAULT_CONCURRENT_FRAGMENTS: u32 = 10;

/// Output template suffix; the tool substitutes the track extension
const OUTPUT_TEMPLATE_SUFFIX: &str = ".encrypted.%(ext)s";

/// Front-end over the external segmented fetcher
#[derive(Debug, Clone)]
pub struct SegmentFetcher {
    tools: ExternalTools,
    concurrent_fragments: u32,
}

impl SegmentFetcher {
    pub fn new(tools: ExternalTools) -> Self {
        Self {
            tools,
            concurrent_fragments: DEFAULT_CONCURRENT_FRAGMENTS,
        }
    }

    pub fn with_concurrency(mut self, concurrent_fragments: u32) -> Self {
        self.concurrent_fragments = concurrent_fragments.max(1);
        self
    }

    /// Download all tracks of `url` next to `base`
    ///
    /// `base` is the lecture path without extension; see
    /// [`crate::file::paths::encrypted_base`].
    pub async fn fetch(&self, url: &Url, format_id: &str, base: &Path) -> Result<()> {
        info!(url = %url, format_id, fragments = self.concurrent_fragments, "> Downloading Lecture Tracks...");
        let invocation = build_segment_invocation(
            &self.tools,
            url,
            format_id,
            base,
            self.concurrent_fragments,
        );
        self.tools.run(invocation).await?;
        info!("> Lecture Tracks Downloaded");
        Ok(())
    }
}

/// Build the segmented fetcher command line
pub fn build_segment_invocation(
    tools: &ExternalTools,
    url: &Url,
    format_id: &str,
    base: &Path,
    concurrent_fragments: u32,
) -> Invocation {
    let mut template = base.as_os_str().to_os_string();
    template.push(OUTPUT_TEMPLATE_SUFFIX);

    Invocation::new("yt-dlp", &tools.yt_dlp)
        .args(["--force-generic-extractor", "--allow-unplayable-formats"])
        .arg("--concurrent-fragments")
        .arg(concurrent_fragments.to_string())
        .arg("--downloader")
        .arg(&tools.aria2c)
        .args(["--fixup", "never", "-k"])
        .arg("-o")
        .arg(template)
        .arg("-f")
        .arg(format_id)
        .arg(url.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_command_line() {
        let tools = ExternalTools::default();
        let url = Url::parse("https://cdn.example.com/lecture/index.mpd").unwrap();
        let inv = build_segment_invocation(&tools, &url, "bv+ba", Path::new("/c/01 Intro"), 10);

        assert_eq!(inv.tool, "yt-dlp");
        assert!(!inv.niced);
        assert_eq!(
            inv.args_lossy(),
            vec![
                "--force-generic-extractor",
                "--allow-unplayable-formats",
                "--concurrent-fragments",
                "10",
                "--downloader",
                "aria2c",
                "--fixup",
                "never",
                "-k",
                "-o",
                "/c/01 Intro.encrypted.%(ext)s",
                "-f",
                "bv+ba",
                "https://cdn.example.com/lecture/index.mpd",
            ]
        );
    }

    #[test]
    fn test_concurrency_floor() {
        let fetcher = SegmentFetcher::new(ExternalTools::default()).with_concurrency(0);
        assert_eq!(fetcher.concurrent_fragments, 1);
    }
}
