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


//! HTTP streaming with resume support
//!
//! # Resume Mechanism
//! 1. Size of `<final>.part` on disk is the resume offset
//! 2. Offset > 0 → send `Range: bytes=<offset>-` and append to the partial
//! 3. Expected total = `Content-Length` + offset; a 206 whose `Content-Range` starts
//!    elsewhere or reports another total means the resource changed, so the partial
//!    is dropped and the transfer restarts from byte 0
//! 4. Stream the body in 16 KiB chunks, reporting progress after each one
//! 5. Exact size match → rename `.part` to the final name
//!
//! A short read leaves the partial on disk and reports [`FetchOutcome::Incomplete`];
//! retrying is the caller's decision. A sample with zero elapsed time or zero bytes
//! transferred since the offset is a malformed transfer: the partial is deleted.
//!
//! Cancellation is by dropping the future (Ctrl-C); the partial file stays behind.

use crate::download::hls::download_hls;
use crate::download::links::record_external_link;
use crate::download::progress::{Clock, ProgressCallback, SystemClock, TransferProgress};
use crate::download::state::TransferState;
use crate::download::target::{DownloadTarget, MediaKind};
use crate::error::{DownloadError, Result};
use crate::file::manager::{ensure_directory_exists, file_exists, is_nonempty_file};
use crate::file::paths::srt_sibling;
use crate::media::tools::ExternalTools;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Transfer chunk size
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Browser user agent sent with every request
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.3; Win64; x64; rv:85.0) Gecko/20100101 Firefox/85.0";

/// Result of one fetch call
#[derive(Debug)]
pub enum FetchOutcome {
    /// Destination (or its converted `.srt` sibling) was already on disk
    AlreadyDownloaded,
    /// Transfer completed and the partial was promoted
    Downloaded,
    /// External link appended to the manifest (or already listed)
    LinkRecorded,
    /// Stream ended early; the partial is kept for the next call
    Incomplete { written: u64, expected: Option<u64> },
    /// Transfer failed with a reason
    Failed(DownloadError),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            FetchOutcome::AlreadyDownloaded | FetchOutcome::Downloaded | FetchOutcome::LinkRecorded
        )
    }

    pub fn message(&self) -> String {
        match self {
            FetchOutcome::AlreadyDownloaded => "already downloaded".to_string(),
            FetchOutcome::Downloaded => "download".to_string(),
            FetchOutcome::LinkRecorded => "link recorded".to_string(),
            FetchOutcome::Incomplete { written, expected } => match expected {
                Some(total) => format!("incomplete: {} of {} bytes", written, total),
                None => format!("incomplete: {} bytes", written),
            },
            FetchOutcome::Failed(e) => e.to_string(),
        }
    }
}

/// Resumable single-resource downloader
///
/// The HTTP client is supplied by the caller and shared across fetches.
#[derive(Clone)]
pub struct ChunkedFetcher {
    client: Client,
    clock: Arc<dyn Clock>,
    tools: ExternalTools,
    user_agent: String,
}

impl ChunkedFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            clock: Arc::new(SystemClock),
            tools: ExternalTools::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Replace the clock used for rate computation
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Tools used for HLS targets
    pub fn with_tools(mut self, tools: ExternalTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Fetch one target
    ///
    /// Never returns an error: every failure is a [`FetchOutcome::Failed`].
    pub async fn fetch(
        &self,
        target: &DownloadTarget,
        progress: Option<&ProgressCallback>,
    ) -> FetchOutcome {
        if target.media_kind() == MediaKind::ExternalLink {
            return match record_external_link(
                target.output_dir(),
                target.filename(),
                target.url().as_str(),
            )
            .await
            {
                Ok(written) => {
                    debug!(name = target.filename(), written, "external link");
                    FetchOutcome::LinkRecorded
                }
                Err(e) => FetchOutcome::Failed(e),
            };
        }

        let destination = target.destination();
        if is_already_downloaded(&destination).await {
            return FetchOutcome::AlreadyDownloaded;
        }

        if let Err(e) = ensure_directory_exists(target.output_dir()).await {
            return FetchOutcome::Failed(e);
        }

        if target.media_kind() == MediaKind::HlsStream {
            return match download_hls(&self.tools, target).await {
                Ok(()) => FetchOutcome::Downloaded,
                Err(e) => FetchOutcome::Failed(e),
            };
        }

        let mut state = TransferState::open(&destination).await;
        match self.transfer(target, &mut state, progress).await {
            Ok(outcome) => outcome,
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    async fn transfer(
        &self,
        target: &DownloadTarget,
        state: &mut TransferState,
        progress: Option<&ProgressCallback>,
    ) -> Result<FetchOutcome> {
        let started = self.clock.now();
        let mut response = match self.send(target, state).await {
            Ok(response) => response,
            Err(e) => return Ok(FetchOutcome::Failed(e)),
        };

        match response.status() {
            StatusCode::PARTIAL_CONTENT if state.is_resuming() => {
                state.set_expected_from_body_length(response.content_length());
                if !range_continues_partial(&response, state) {
                    warn!(
                        offset = state.resume_offset(),
                        content_range = ?response.headers().get(CONTENT_RANGE),
                        "partial no longer matches the resource, restarting"
                    );
                    drop(response);
                    state.discard().await?;
                    state.restart();
                    response = match self.send(target, state).await {
                        Ok(response) => response,
                        Err(e) => return Ok(FetchOutcome::Failed(e)),
                    };
                    if !response.status().is_success() {
                        return Ok(FetchOutcome::Failed(status_error(&response)));
                    }
                    state.set_expected_from_body_length(response.content_length());
                }
            }
            StatusCode::RANGE_NOT_SATISFIABLE if state.is_resuming() => {
                // Partial already holds the whole resource
                if content_range(&response).and_then(|r| r.total) == Some(state.resume_offset()) {
                    state.promote().await?;
                    return Ok(FetchOutcome::AlreadyDownloaded);
                }
                return Ok(FetchOutcome::Failed(status_error(&response)));
            }
            status if status.is_success() => {
                if state.is_resuming() {
                    info!(
                        offset = state.resume_offset(),
                        "server ignored range request, restarting"
                    );
                    state.restart();
                }
                state.set_expected_from_body_length(response.content_length());
            }
            _ => return Ok(FetchOutcome::Failed(status_error(&response))),
        }

        let file = if state.is_resuming() {
            OpenOptions::new()
                .append(true)
                .open(state.temp_path())
                .await?
        } else {
            File::create(state.temp_path()).await?
        };
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);

        let mut body = response.bytes_stream();
        while let Some(next) = body.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, written = state.bytes_written(), "stream interrupted");
                    break;
                }
            };

            for chunk in bytes.chunks(CHUNK_SIZE) {
                writer.write_all(chunk).await?;
                state.record(chunk.len() as u64);

                let elapsed = self.clock.now().saturating_duration_since(started);
                match TransferProgress::sample(
                    state.bytes_written(),
                    state.resume_offset(),
                    state.total_expected(),
                    elapsed,
                ) {
                    Some(sample) => {
                        if let Some(callback) = progress {
                            callback(sample);
                        }
                    }
                    None => {
                        drop(writer);
                        state.discard().await?;
                        return Ok(FetchOutcome::Failed(DownloadError::MalformedTransfer(
                            target.filename().to_string(),
                        )));
                    }
                }
            }
        }

        writer.flush().await?;
        drop(writer);

        conclude(state).await
    }

    async fn send(&self, target: &DownloadTarget, state: &TransferState) -> Result<Response> {
        let mut request = self
            .client
            .get(target.url().clone())
            .header(USER_AGENT, &self.user_agent);

        if let Some(range) = state.range_header() {
            debug!(range = %range, "resuming");
            request = request.header(RANGE, range);
        }
        if let Some(token) = target.token() {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .map_err(|e| DownloadError::connection(e.to_string()))
    }
}

/// Promote the partial if it holds exactly the expected bytes
async fn conclude(state: &mut TransferState) -> Result<FetchOutcome> {
    if state.matches_expected() {
        state.promote().await?;
        Ok(FetchOutcome::Downloaded)
    } else {
        Ok(FetchOutcome::Incomplete {
            written: state.bytes_written(),
            expected: state.total_expected(),
        })
    }
}

async fn is_already_downloaded(destination: &Path) -> bool {
    if let Some(srt) = srt_sibling(destination) {
        if file_exists(&srt).await {
            return true;
        }
    }
    is_nonempty_file(destination).await
}

/// `Content-Range: bytes <start>-<end>/<total>`; a `*` part is `None`
#[derive(Debug, PartialEq, Eq)]
struct ContentRange {
    start: Option<u64>,
    total: Option<u64>,
}

fn parse_content_range(value: &str) -> Option<ContentRange> {
    let (range, total) = value.trim().strip_prefix("bytes")?.trim_start().split_once('/')?;
    Some(ContentRange {
        start: range.split_once('-').and_then(|(start, _)| start.trim().parse().ok()),
        total: total.trim().parse().ok(),
    })
}

fn content_range(response: &Response) -> Option<ContentRange> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

/// Whether a 206 answer starts at the resume offset of an unchanged resource
///
/// Without a `Content-Range` header the body is taken as the requested range.
fn range_continues_partial(response: &Response, state: &TransferState) -> bool {
    let Some(range) = content_range(response) else {
        return true;
    };
    if range.start != Some(state.resume_offset()) {
        return false;
    }
    match (range.total, state.total_expected()) {
        (Some(total), Some(expected)) => total == expected,
        _ => true,
    }
}

fn status_error(response: &Response) -> DownloadError {
    let status = response.status();
    DownloadError::HttpStatus {
        status_code: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}
