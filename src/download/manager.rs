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


//! Download queue for a course
//!
//! # Queue Processing
//! - Units are processed in order, one at a time
//! - Every outcome is logged: skipped, downloaded, link recorded, incomplete, failed
//! - A failing unit never stops the queue
//! - The whole run races Ctrl-C; an interrupt aborts immediately with
//!   [`DownloadError::Interrupted`] and leaves `.part` files for the next run
//!
//! Plain targets without a pipeline can be fetched concurrently with
//! [`DownloadQueue::fetch_all`], bounded by `max_concurrent_fetches`.

use crate::crypto::keys::KeyDecryptorMap;
use crate::download::progress::ProgressCallback;
use crate::download::segments::DEFAULT_CONCURRENT_FRAGMENTS;
use crate::download::stream::{ChunkedFetcher, FetchOutcome, DEFAULT_USER_AGENT};
use crate::download::target::{DownloadTarget, Downloadable, MediaKind};
use crate::error::{DownloadError, Result};
use crate::file::paths::path_extension;
use crate::media::tools::ExternalTools;
use crate::pipeline::encrypted::{EncryptedStreamPipeline, PipelineOptions, PipelineOutcome};
use crate::pipeline::stages::{PipelineStages, ToolStages};
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root directory for course output
    pub output_directory: PathBuf,

    /// JSON keyfile mapping key-ID → key
    pub keyfile: Option<PathBuf>,

    /// Decrypt and remux DRM-protected lectures when keys are available
    pub decrypt: bool,

    /// Keep encrypted tracks after a successful remux
    pub keep_encrypted: bool,

    /// Fragments fetched in parallel by the segmented fetcher
    pub concurrent_fragments: u32,

    /// Connect timeout for HTTP requests
    pub request_timeout_secs: u64,

    pub user_agent: String,

    /// Plain fetches running at once in `fetch_all`
    pub max_concurrent_fetches: usize,

    pub tools: ExternalTools,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            keyfile: None,
            decrypt: true,
            keep_encrypted: false,
            concurrent_fragments: DEFAULT_CONCURRENT_FRAGMENTS,
            request_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrent_fetches: 1,
            tools: ExternalTools::default(),
        }
    }
}

impl DownloadConfig {
    /// Load a JSON config file; absent fields keep their defaults
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            DownloadError::InvalidConfiguration(format!("{}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| DownloadError::InvalidConfiguration(format!("{}: {}", path.display(), e)))
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            decrypt: self.decrypt,
            keep_encrypted: self.keep_encrypted,
            concurrent_fragments: self.concurrent_fragments,
        }
    }

    /// Build the shared HTTP client
    pub fn build_client(&self) -> Result<Client> {
        Ok(Client::builder()
            .connect_timeout(Duration::from_secs(self.request_timeout_secs))
            .cookie_store(true)
            .build()?)
    }
}

/// Everything a run shares: client, configuration and keys
#[derive(Clone)]
pub struct DownloadContext {
    pub client: Client,
    pub config: DownloadConfig,
    pub keys: Arc<KeyDecryptorMap>,
}

impl DownloadContext {
    /// Build the client and load the keyfile (missing keyfile → no keys)
    pub async fn from_config(config: DownloadConfig) -> Result<Self> {
        let client = config.build_client()?;
        let keys = match (&config.keyfile, config.decrypt) {
            (Some(path), true) => KeyDecryptorMap::load(path).await?,
            _ => KeyDecryptorMap::default(),
        };

        Ok(Self {
            client,
            config,
            keys: Arc::new(keys),
        })
    }

    pub fn fetcher(&self) -> ChunkedFetcher {
        ChunkedFetcher::new(self.client.clone())
            .with_tools(self.config.tools.clone())
            .with_user_agent(self.config.user_agent.clone())
    }

    pub fn pipeline(&self) -> EncryptedStreamPipeline<ToolStages> {
        EncryptedStreamPipeline::new(
            ToolStages::new(self.config.tools.clone(), self.config.concurrent_fragments),
            Arc::clone(&self.keys),
            self.config.pipeline_options(),
        )
    }

    pub fn queue(&self) -> DownloadQueue<ToolStages> {
        DownloadQueue::new(self.fetcher(), self.pipeline())
            .with_max_concurrent(self.config.max_concurrent_fetches)
    }
}

/// Per-run outcome counts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub already_downloaded: usize,
    pub downloaded: usize,
    pub links_recorded: usize,
    pub incomplete: usize,
    /// `(label, reason)` of every failed unit
    pub failed: Vec<(String, String)>,
    /// Failed units a later run may still complete
    pub retryable: usize,
    /// Subtitles fetched as `.vtt`, waiting for conversion
    pub subtitles_fetched: Vec<PathBuf>,
}

impl DownloadSummary {
    pub fn total(&self) -> usize {
        self.already_downloaded
            + self.downloaded
            + self.links_recorded
            + self.incomplete
            + self.failed.len()
    }
}

/// Sequential download queue
pub struct DownloadQueue<S> {
    fetcher: ChunkedFetcher,
    pipeline: EncryptedStreamPipeline<S>,
    progress: Option<ProgressCallback>,
    max_concurrent: usize,
}

impl<S: PipelineStages> DownloadQueue<S> {
    pub fn new(fetcher: ChunkedFetcher, pipeline: EncryptedStreamPipeline<S>) -> Self {
        Self {
            fetcher,
            pipeline,
            progress: None,
            max_concurrent: 1,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn pipeline(&self) -> &EncryptedStreamPipeline<S> {
        &self.pipeline
    }

    /// Process every unit, aborting on Ctrl-C
    pub async fn run(&self, items: &[Downloadable]) -> Result<DownloadSummary> {
        self.run_until(items, interrupt_signal()).await
    }

    /// Process every unit, aborting when `shutdown` resolves
    pub async fn run_until<F>(&self, items: &[Downloadable], shutdown: F) -> Result<DownloadSummary>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = shutdown => {
                warn!("> User Interrupted..");
                Err(DownloadError::Interrupted)
            }
            summary = self.process(items) => Ok(summary),
        }
    }

    async fn process(&self, items: &[Downloadable]) -> DownloadSummary {
        let mut summary = DownloadSummary::default();
        for (index, item) in items.iter().enumerate() {
            info!(index = index + 1, total = items.len(), "> Downloading {}", item.label());
            match item {
                Downloadable::Direct(target) => {
                    let outcome = self.fetcher.fetch(target, self.progress.as_ref()).await;
                    record_fetch(&mut summary, item, target, outcome);
                }
                Downloadable::Encrypted(stream) => {
                    let outcome = self.pipeline.run(stream).await;
                    record_pipeline(&mut summary, item, outcome);
                }
            }
        }

        info!(
            total = summary.total(),
            downloaded = summary.downloaded,
            skipped = summary.already_downloaded,
            failed = summary.failed.len(),
            retryable = summary.retryable,
            "> Queue finished"
        );
        summary
    }

    /// Fetch plain targets concurrently; outcomes are in input order
    pub async fn fetch_all(&self, targets: &[DownloadTarget]) -> Vec<FetchOutcome> {
        stream::iter(targets)
            .map(|target| self.fetcher.fetch(target, self.progress.as_ref()))
            .buffered(self.max_concurrent)
            .collect()
            .await
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
pub async fn interrupt_signal() {
    interrupt_from(tokio::signal::ctrl_c()).await
}

async fn interrupt_from<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "could not listen for Ctrl-C, interrupts are disabled");
        std::future::pending::<()>().await;
    }
}

fn record_fetch(
    summary: &mut DownloadSummary,
    item: &Downloadable,
    target: &DownloadTarget,
    outcome: FetchOutcome,
) {
    match outcome {
        FetchOutcome::AlreadyDownloaded => {
            info!("> {} already downloaded, skipping...", item.label());
            summary.already_downloaded += 1;
        }
        FetchOutcome::Downloaded => {
            info!("> {} downloaded", item.label());
            summary.downloaded += 1;
            let destination = target.destination();
            if target.media_kind() == MediaKind::Subtitle
                && path_extension(&destination).as_deref() == Some("vtt")
            {
                summary.subtitles_fetched.push(destination);
            }
        }
        FetchOutcome::LinkRecorded => {
            info!("> {} saved to link manifest", item.label());
            summary.links_recorded += 1;
        }
        incomplete @ FetchOutcome::Incomplete { .. } => {
            warn!("> {} {}, will resume on the next run", item.label(), incomplete.message());
            summary.incomplete += 1;
        }
        FetchOutcome::Failed(e) => {
            error!("> {} failed: {}", item.label(), e);
            record_failure(summary, item, &e);
        }
    }
}

fn record_pipeline(summary: &mut DownloadSummary, item: &Downloadable, outcome: PipelineOutcome) {
    match outcome {
        PipelineOutcome::AlreadyDownloaded => summary.already_downloaded += 1,
        PipelineOutcome::Completed { .. } => summary.downloaded += 1,
        PipelineOutcome::EncryptedRetained { .. } => {
            info!("> {} kept encrypted", item.label());
            summary.downloaded += 1;
        }
        PipelineOutcome::Failed { error, .. } => record_failure(summary, item, &error),
    }
}

fn record_failure(summary: &mut DownloadSummary, item: &Downloadable, error: &DownloadError) {
    if error.is_retryable() {
        summary.retryable += 1;
    }
    summary.failed.push((item.label(), error.user_message()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::target::EncryptedStream;
    use crate::pipeline::encrypted::test_support::MockStages;
    use tempfile::TempDir;

    fn queue() -> DownloadQueue<MockStages> {
        let stages = MockStages::with_kids(&[("Intro.encrypted.mp4", "ABC123")]);
        let keys = Arc::new(KeyDecryptorMap::new([("abc123", "00ff")]));
        DownloadQueue::new(
            ChunkedFetcher::new(Client::new()),
            EncryptedStreamPipeline::new(stages, keys, PipelineOptions::default()),
        )
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: DownloadConfig =
            serde_json::from_str(r#"{"output_directory": "/courses", "keep_encrypted": true}"#).unwrap();

        assert_eq!(config.output_directory, PathBuf::from("/courses"));
        assert!(config.keep_encrypted);
        assert!(config.decrypt);
        assert_eq!(config.concurrent_fragments, 10);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.max_concurrent_fetches, 1);
    }

    #[tokio::test]
    async fn test_config_from_missing_file() {
        let result = DownloadConfig::from_file(Path::new("/nonexistent/lecture-dl.json")).await;
        assert!(matches!(result, Err(DownloadError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_context_without_keyfile_has_no_keys() {
        let dir = TempDir::new().unwrap();
        let config = DownloadConfig {
            keyfile: Some(dir.path().join("keyfile.json")),
            ..DownloadConfig::default()
        };
        let context = DownloadContext::from_config(config).await.unwrap();
        assert!(context.keys.is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_queue() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.pdf")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/ok.pdf")
            .with_status(200)
            .with_body("pdf")
            .create_async()
            .await;
        server
            .mock("GET", "/s.vtt")
            .with_status(200)
            .with_body("WEBVTT\n")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let url = server.url();
        let items: Vec<Downloadable> = vec![
            DownloadTarget::new(MediaKind::Asset, &format!("{}/missing.pdf", url), dir.path(), "missing", "pdf")
                .unwrap()
                .into(),
            DownloadTarget::new(MediaKind::Asset, &format!("{}/ok.pdf", url), dir.path(), "ok", "pdf")
                .unwrap()
                .into(),
            DownloadTarget::subtitle(&format!("{}/s.vtt", url), dir.path(), "Intro", "en", "vtt")
                .unwrap()
                .into(),
            DownloadTarget::new(MediaKind::ExternalLink, "https://example.com/ref", dir.path(), "Reference", "txt")
                .unwrap()
                .into(),
            EncryptedStream::new("https://cdn.example.com/i.mpd", "bv+ba", "Intro", dir.path())
                .unwrap()
                .into(),
        ];

        let summary = queue().run_until(&items, std::future::pending()).await.unwrap();

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "Asset : 'missing.pdf'");
        assert_eq!(summary.failed[0].1, "HTTP 404: Not Found");
        assert_eq!(summary.retryable, 0);
        assert_eq!(summary.downloaded, 3);
        assert_eq!(summary.links_recorded, 1);
        assert_eq!(summary.subtitles_fetched, vec![dir.path().join("Intro.en.vtt")]);
        assert!(dir.path().join("ok.pdf").exists());
        assert!(dir.path().join("Intro.mp4").exists());
    }

    #[tokio::test]
    async fn test_server_errors_counted_as_retryable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/busy.pdf")
            .with_status(503)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let items: Vec<Downloadable> = vec![
            DownloadTarget::new(MediaKind::Asset, &format!("{}/busy.pdf", server.url()), dir.path(), "busy", "pdf")
                .unwrap()
                .into(),
            DownloadTarget::new(MediaKind::Asset, "http://127.0.0.1:1/down.pdf", dir.path(), "down", "pdf")
                .unwrap()
                .into(),
        ];

        let summary = queue().run_until(&items, std::future::pending()).await.unwrap();
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(summary.retryable, 2);
    }

    #[tokio::test]
    async fn test_interrupt_aborts_run() {
        let dir = TempDir::new().unwrap();
        let items: Vec<Downloadable> = vec![DownloadTarget::new(
            MediaKind::Asset,
            "http://127.0.0.1:1/a.pdf",
            dir.path(),
            "a",
            "pdf",
        )
        .unwrap()
        .into()];

        let result = queue().run_until(&items, std::future::ready(())).await;
        assert!(matches!(result, Err(DownloadError::Interrupted)));
    }

    #[tokio::test]
    async fn test_signal_setup_failure_does_not_interrupt() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/a.pdf")
            .with_status(200)
            .with_body("a")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let items: Vec<Downloadable> = vec![DownloadTarget::new(
            MediaKind::Asset,
            &format!("{}/a.pdf", server.url()),
            dir.path(),
            "a",
            "pdf",
        )
        .unwrap()
        .into()];

        let no_handler = interrupt_from(std::future::ready(Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "signal driver unavailable",
        ))));
        let summary = queue().run_until(&items, no_handler).await.unwrap();

        assert_eq!(summary.downloaded, 1);
        assert!(dir.path().join("a.pdf").exists());
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/a.pdf")
            .with_status(200)
            .with_body("a")
            .create_async()
            .await;
        server
            .mock("GET", "/b.pdf")
            .with_status(500)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let targets = vec![
            DownloadTarget::new(MediaKind::Asset, &format!("{}/a.pdf", server.url()), dir.path(), "a", "pdf").unwrap(),
            DownloadTarget::new(MediaKind::Asset, &format!("{}/b.pdf", server.url()), dir.path(), "b", "pdf").unwrap(),
        ];

        let outcomes = queue().with_max_concurrent(2).fetch_all(&targets).await;
        assert!(matches!(outcomes[0], FetchOutcome::Downloaded));
        assert!(matches!(
            outcomes[1],
            FetchOutcome::Failed(DownloadError::HttpStatus { status_code: 500, .. })
        ));
    }
}
