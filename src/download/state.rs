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


//! Per-call transfer state
//!
//! A [`TransferState`] is created when a fetch starts, from the size of any
//! `<final>.part` file already on disk, and dropped when the fetch returns.
//! On completion the partial file is promoted to the final name; otherwise
//! it stays on disk so the next call resumes from it.

use crate::error::Result;
use crate::file::manager::{file_size, safe_delete, safe_move};
use crate::file::paths::{with_suffix, PART_SUFFIX};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct TransferState {
    /// Final destination path
    final_path: PathBuf,

    /// `<final>.part`
    temp_path: PathBuf,

    /// Size of the partial file when the call started
    resume_offset: u64,

    /// Bytes confirmed written, resume offset included
    bytes_written: u64,

    /// Total expected size (None if unknown)
    total_expected: Option<u64>,
}

impl TransferState {
    /// Create state for `final_path`, resuming from an existing `.part` file
    pub async fn open(final_path: &Path) -> Self {
        let temp_path = with_suffix(final_path, PART_SUFFIX);
        let resume_offset = file_size(&temp_path).await;

        Self {
            final_path: final_path.to_path_buf(),
            temp_path,
            resume_offset,
            bytes_written: resume_offset,
            total_expected: None,
        }
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn total_expected(&self) -> Option<u64> {
        self.total_expected
    }

    pub fn is_resuming(&self) -> bool {
        self.resume_offset > 0
    }

    /// `Range` header value for resuming, if there is anything to resume
    pub fn range_header(&self) -> Option<String> {
        self.is_resuming()
            .then(|| format!("bytes={}-", self.resume_offset))
    }

    /// Server ignored the range request; start over from byte 0
    pub fn restart(&mut self) {
        self.resume_offset = 0;
        self.bytes_written = 0;
    }

    /// Record the expected total from the body length of the response
    ///
    /// A resumed response only carries the remaining bytes, so the offset is added.
    pub fn set_expected_from_body_length(&mut self, body_length: Option<u64>) {
        self.total_expected = body_length.map(|len| len + self.resume_offset);
    }

    /// Record one written chunk
    pub fn record(&mut self, chunk_len: u64) {
        self.bytes_written += chunk_len;
    }

    /// Whether the bytes written match the expected total exactly
    ///
    /// With an unknown total, a cleanly finished stream counts as complete.
    pub fn matches_expected(&self) -> bool {
        match self.total_expected {
            Some(total) => self.bytes_written == total,
            None => true,
        }
    }

    /// Rename the partial file to the final name
    pub async fn promote(&self) -> Result<()> {
        safe_move(&self.temp_path, &self.final_path).await
    }

    /// Remove the partial file
    pub async fn discard(&mut self) -> Result<()> {
        safe_delete(&self.temp_path).await?;
        self.bytes_written = 0;
        Ok(())
    }
}
