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


//! File management and path utilities
//!
//! This module handles file operations, filename sanitizing, and the suffix
//! convention tying encrypted, decrypted and final media paths together.

pub mod manager;
pub mod paths;
pub mod scanner;

// Re-export commonly used items
pub use paths::{sanitize_filename, with_suffix};
pub use scanner::{scan_encrypted_sources, EncryptedSource};
