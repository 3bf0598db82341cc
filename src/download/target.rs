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


//! Downloadable units
//!
//! Every unit of a course download (lecture stream, asset, subtitle, external
//! link, DRM-protected lecture) is described by plain data and dispatched on its
//! kind. Filenames are computed once, at construction, and are always sanitized.

use crate::error::{DownloadError, Result};
use crate::file::paths::{long_path, sanitize_filename};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Kind of media a [`DownloadTarget`] points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    /// Single progressive file fetched over HTTP
    PlainStream,
    /// HLS playlist handed to the external segmented downloader
    HlsStream,
    /// Lecture attachment (pdf, zip, source code...)
    Asset,
    /// Caption file, usually `.vtt`
    Subtitle,
    /// Link to a third-party resource, recorded but never fetched
    ExternalLink,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::PlainStream => "plain-stream",
            MediaKind::HlsStream => "hls-stream",
            MediaKind::Asset => "asset",
            MediaKind::Subtitle => "subtitle",
            MediaKind::ExternalLink => "external-link",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain-stream" | "plain" => Ok(MediaKind::PlainStream),
            "hls-stream" | "hls" => Ok(MediaKind::HlsStream),
            "asset" => Ok(MediaKind::Asset),
            "subtitle" => Ok(MediaKind::Subtitle),
            "external-link" | "link" => Ok(MediaKind::ExternalLink),
            other => Err(DownloadError::InvalidConfiguration(format!(
                "unknown media kind: {}",
                other
            ))),
        }
    }
}

/// Immutable description of one file to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    url: Url,
    output_dir: PathBuf,
    filename: String,
    kind: MediaKind,
    token: Option<String>,
}

impl DownloadTarget {
    /// Describe a stream, asset or link named `<title>.<extension>`
    pub fn new(
        kind: MediaKind,
        url: &str,
        output_dir: impl Into<PathBuf>,
        title: &str,
        extension: &str,
    ) -> Result<Self> {
        let filename = format!("{}.{}", sanitize_filename(title), extension_of(extension));
        Self::with_filename(kind, url, output_dir, &filename)
    }

    /// Describe a subtitle named `<title>.<language>.<extension>`
    pub fn subtitle(
        url: &str,
        output_dir: impl Into<PathBuf>,
        title: &str,
        language: &str,
        extension: &str,
    ) -> Result<Self> {
        let filename = format!(
            "{}.{}.{}",
            sanitize_filename(title),
            sanitize_filename(language),
            extension_of(extension)
        );
        Self::with_filename(MediaKind::Subtitle, url, output_dir, &filename)
    }

    /// Describe a target with an explicit filename (sanitized here)
    pub fn with_filename(
        kind: MediaKind,
        url: &str,
        output_dir: impl Into<PathBuf>,
        filename: &str,
    ) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| DownloadError::InvalidDownloadUrl(format!("{}: {}", url, e)))?;

        Ok(Self {
            url,
            output_dir: output_dir.into(),
            filename: sanitize_filename(filename),
            kind,
            token: None,
        })
    }

    /// Attach a bearer token sent with the request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn media_kind(&self) -> MediaKind {
        self.kind
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Full destination path of the deliverable
    pub fn destination(&self) -> PathBuf {
        long_path(self.output_dir.join(&self.filename))
    }
}

fn extension_of(extension: &str) -> &str {
    extension.trim_start_matches('.')
}

/// A DRM-protected lecture, downloaded through the encrypted-stream pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedStream {
    url: Url,
    format_id: String,
    title: String,
    output_dir: PathBuf,
    filename: String,
}

impl EncryptedStream {
    /// `format_id` is the segmented fetcher's format selector (e.g. `bv+ba`)
    pub fn new(
        url: &str,
        format_id: &str,
        title: &str,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| DownloadError::InvalidDownloadUrl(format!("{}: {}", url, e)))?;

        Ok(Self {
            url,
            format_id: format_id.to_string(),
            title: title.to_string(),
            output_dir: output_dir.into(),
            filename: format!("{}.mp4", sanitize_filename(title)),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn format_id(&self) -> &str {
        &self.format_id
    }

    /// Title written into the remuxed file's metadata
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<sanitized title>.mp4`
    pub fn lecture_path(&self) -> PathBuf {
        long_path(self.output_dir.join(&self.filename))
    }
}

/// Any unit the download queue knows how to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downloadable {
    /// Plain stream, HLS stream, asset, subtitle or external link
    Direct(DownloadTarget),
    /// DRM-protected lecture
    Encrypted(EncryptedStream),
}

impl Downloadable {
    pub fn url(&self) -> &Url {
        match self {
            Downloadable::Direct(t) => t.url(),
            Downloadable::Encrypted(s) => s.url(),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Downloadable::Direct(t) => t.filename(),
            Downloadable::Encrypted(s) => s.filename(),
        }
    }

    /// Media kind; encrypted lectures are segmented streams
    pub fn media_kind(&self) -> MediaKind {
        match self {
            Downloadable::Direct(t) => t.media_kind(),
            Downloadable::Encrypted(_) => MediaKind::HlsStream,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Downloadable::Encrypted(_))
    }

    /// Label used in log lines, e.g. `Lecture : '01 Intro.mp4'`
    pub fn label(&self) -> String {
        let what = match self {
            Downloadable::Encrypted(_) => "Lecture",
            Downloadable::Direct(t) => match t.media_kind() {
                MediaKind::PlainStream | MediaKind::HlsStream => "Lecture",
                MediaKind::Asset | MediaKind::ExternalLink => "Asset",
                MediaKind::Subtitle => "Subtitle",
            },
        };
        format!("{} : '{}'", what, self.filename())
    }
}

impl From<DownloadTarget> for Downloadable {
    fn from(target: DownloadTarget) -> Self {
        Downloadable::Direct(target)
    }
}

impl From<EncryptedStream> for Downloadable {
    fn from(stream: EncryptedStream) -> Self {
        Downloadable::Encrypted(stream)
    }
}
