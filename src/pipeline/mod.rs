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


//! DRM-protected lecture pipeline
//!
//! Segmented download → key-ID extraction → decrypt → remux → cleanup.
//!
//! - [`encrypted`] - the per-lecture state machine and its path set
//! - [`stages`] - the stage trait and its external-tool implementation
//! - [`batch`] - finishing encrypted sources left on disk by earlier runs

pub mod batch;
pub mod encrypted;
pub mod stages;

pub use batch::{decrypt_all_sources, BatchSummary};
pub use encrypted::{
    EncryptedAssetSet, EncryptedStreamPipeline, PipelineOptions, PipelineOutcome, PipelineState,
};
pub use stages::{PipelineStages, ToolStages};
