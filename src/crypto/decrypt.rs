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


//! Key-based decryption of a single track
//!
//! Looks up the content key for a key-ID and runs
//! `mp4decrypt --key 1:<key> <input> <output>`.

use crate::crypto::keys::KeyDecryptorMap;
use crate::error::Result;
use crate::media::tools::{ExternalTools, Invocation};
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct DecryptInvoker {
    tools: ExternalTools,
}

impl DecryptInvoker {
    pub fn new(tools: ExternalTools) -> Self {
        Self { tools }
    }

    /// Decrypt `input` into `output` with the key for `key_id`
    ///
    /// # Errors
    /// - `KeyNotFound` if the keyfile has no entry for `key_id` (nothing is spawned)
    /// - `ExternalToolFailure` if the decryptor exits non-zero
    pub async fn decrypt(
        &self,
        keys: &KeyDecryptorMap,
        key_id: &str,
        input: &Path,
        output: &Path,
    ) -> Result<()> {
        let key = keys.require(key_id).map_err(|e| {
            error!(key_id, "> Key not found for this kid");
            e
        })?;

        info!(key_id, input = %input.display(), "> Decrypting...");
        let invocation = build_decrypt_invocation(&self.tools, key, input, output);
        self.tools.run(invocation).await
    }
}

/// Build the decryptor command line
pub fn build_decrypt_invocation(
    tools: &ExternalTools,
    key: &str,
    input: &Path,
    output: &Path,
) -> Invocation {
    Invocation::new("mp4decrypt", &tools.mp4decrypt)
        .niced(tools.nice)
        .arg("--key")
        .arg(format!("1:{}", key))
        .arg(input)
        .arg(output)
}
