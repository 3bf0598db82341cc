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


//! Key-IDs, keys and track decryption
//!
//! # Flow
//! 1. [`widevine::extract_key_id`] reads the Widevine PSSH of an encrypted track
//! 2. [`KeyDecryptorMap`] maps the key-ID to a content key from the keyfile
//! 3. [`DecryptInvoker`] runs the decryptor with that key
//!
//! Key-IDs are compared case-insensitively: the extractor emits uppercase hex,
//! the keyfile is conventionally lowercase.

pub mod decrypt;
pub mod keys;
pub mod widevine;

pub use decrypt::DecryptInvoker;
pub use keys::KeyDecryptorMap;
pub use widevine::{extract_key_id, WIDEVINE_SYSTEM_ID};
