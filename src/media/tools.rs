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


//! External tool invocation
//!
//! The decryptor (`mp4decrypt`), the remuxer (`ffmpeg`) and the segmented fetcher
//! (`yt-dlp` driving `aria2c`) are black boxes: this module builds their argument
//! vectors, spawns them, waits (optionally with a timeout) and turns a non-zero exit
//! into [`DownloadError::ExternalToolFailure`].
//!
//! # Niceness
//! On non-Windows hosts heavy tools are started through `nice -n 7` when
//! [`ExternalTools::nice`] is set. This only affects scheduling.

use crate::error::{DownloadError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Niceness passed to `nice -n`
const NICE_LEVEL: &str = "7";

/// Exit status of `nice` when the wrapped program cannot be found
const NICE_PROGRAM_NOT_FOUND: i32 = 127;

/// Locations and process policy of the external tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalTools {
    /// Remuxer and HLS downloader
    pub ffmpeg: PathBuf,

    /// Key-based decryptor (Bento4)
    pub mp4decrypt: PathBuf,

    /// Segmented fetcher for encrypted streams
    pub yt_dlp: PathBuf,

    /// Fragment downloader used by yt-dlp
    pub aria2c: PathBuf,

    /// Prefix CPU-heavy tools with `nice -n 7` (ignored on Windows)
    pub nice: bool,

    /// Kill a tool that runs longer than this many seconds
    pub timeout_seconds: Option<u64>,
}

impl Default for ExternalTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            mp4decrypt: PathBuf::from("mp4decrypt"),
            yt_dlp: PathBuf::from("yt-dlp"),
            aria2c: PathBuf::from("aria2c"),
            nice: !cfg!(target_os = "windows"),
            timeout_seconds: None,
        }
    }
}

/// A fully built command line for one tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Name used in logs and errors
    pub tool: &'static str,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Start through `nice`
    pub niced: bool,
}

impl Invocation {
    pub fn new(tool: &'static str, program: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
            niced: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn niced(mut self, niced: bool) -> Self {
        self.niced = niced && !cfg!(target_os = "windows");
        self
    }

    /// Arguments as lossy strings, for logging and tests
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn into_command(self) -> Command {
        let mut cmd = if self.niced {
            let mut cmd = Command::new("nice");
            cmd.arg("-n").arg(NICE_LEVEL).arg(&self.program);
            cmd
        } else {
            Command::new(&self.program)
        };
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }
}

impl ExternalTools {
    /// Run an invocation to completion, inheriting stdout/stderr
    ///
    /// # Errors
    /// - `ToolNotFound` if the binary cannot be spawned, or `nice` could not find it
    /// - `ToolTimeout` if `timeout_seconds` elapses (the process is killed)
    /// - `ExternalToolFailure` on a non-zero exit
    pub async fn run(&self, invocation: Invocation) -> Result<()> {
        let tool = invocation.tool;
        let niced = invocation.niced;
        debug!(tool, program = %invocation.program.display(), args = ?invocation.args_lossy(), "spawning");

        let mut child = invocation.into_command().spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DownloadError::ToolNotFound(tool.to_string())
            } else {
                DownloadError::FileIoError(format!("Failed to execute {}: {}", tool, e))
            }
        })?;

        let status = match self.timeout_seconds {
            Some(seconds) => {
                match tokio::time::timeout(Duration::from_secs(seconds), child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        let _ = child.kill().await;
                        return Err(DownloadError::ToolTimeout {
                            tool: tool.to_string(),
                            seconds,
                        });
                    }
                }
            }
            None => child.wait().await?,
        };

        info!(tool, code = ?status.code(), "tool finished");
        if niced && status.code() == Some(NICE_PROGRAM_NOT_FOUND) {
            return Err(DownloadError::ToolNotFound(tool.to_string()));
        }
        if !status.success() {
            return Err(DownloadError::tool_failed(tool, status));
        }
        Ok(())
    }

    /// Probe each tool by spawning it once
    ///
    /// A tool is missing only if spawning fails with NotFound; a non-zero exit
    /// (e.g. usage message) still means it is installed.
    pub async fn check_available(&self) -> Vec<(&'static str, bool)> {
        let probes: [(&'static str, &PathBuf, &[&str]); 4] = [
            ("aria2c", &self.aria2c, &["-v"]),
            ("ffmpeg", &self.ffmpeg, &["-version"]),
            ("mp4decrypt", &self.mp4decrypt, &[]),
            ("yt-dlp", &self.yt_dlp, &["--version"]),
        ];

        let mut results = Vec::with_capacity(probes.len());
        for (name, program, args) in probes {
            let spawned = Command::new(program)
                .args(args)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            let available = !matches!(&spawned, Err(e) if e.kind() == std::io::ErrorKind::NotFound);
            results.push((name, available));
        }
        results
    }
}
