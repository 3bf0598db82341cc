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


//! External media tools and remuxing
//!
//! This module drives the command-line tools the downloader depends on.
//!
//! ## tools
//! - `ExternalTools` - binary locations, niceness, timeout policy
//! - `Invocation` - one command line, built before it is spawned
//!
//! ## remux
//! - `RemuxInvoker` - stream-copy mux of decrypted video and audio with a title tag
//!
//! # Installation
//! - FFmpeg: https://ffmpeg.org/download.html
//! - mp4decrypt: part of Bento4 (https://www.bento4.com/downloads/)
//! - yt-dlp and aria2c: available from most package managers

pub mod remux;
pub mod tools;

pub use remux::RemuxInvoker;
pub use tools::{ExternalTools, Invocation};
