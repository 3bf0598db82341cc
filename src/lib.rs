//! lecture-dl - resumable course-media downloader
//!
//! Fetches lecture streams, assets, subtitles and external links with partial
//! download resume, and runs DRM-protected lectures through segmented download,
//! key-ID extraction, decryption and remux into a single file.
//!
//! # Modules
//! - [`download`] - targets, resumable fetcher, download queue, configuration
//! - [`crypto`] - Widevine key-IDs, keyfile, decryptor invocation
//! - [`media`] - external tool invocation and remuxing
//! - [`pipeline`] - the encrypted-lecture state machine and batch decryption
//! - [`file`] - path conventions, sanitizing, safe file operations
//! - [`error`] - the crate error type

pub mod crypto;
pub mod download;
pub mod error;
pub mod file;
pub mod media;
pub mod pipeline;

pub use download::{
    ChunkedFetcher, DownloadConfig, DownloadContext, DownloadQueue, DownloadTarget, Downloadable,
    EncryptedStream, FetchOutcome, MediaKind,
};
pub use error::{DownloadError, Result};
pub use pipeline::{EncryptedStreamPipeline, PipelineOutcome};
