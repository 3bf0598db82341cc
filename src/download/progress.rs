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


//! Download progress tracking and reporting
//!
//! # Progress Information
//! - Bytes received so far (including a resumed offset)
//! - Fraction complete
//! - Rate in KB/s over the bytes transferred by this call
//! - Estimated time remaining in seconds
//!
//! A sample whose rate or ETA would divide by zero marks the transfer as
//! malformed; see [`TransferProgress::sample`].

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Progress snapshot for a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes on disk so far, resume offset included
    pub bytes_done: u64,

    /// Total bytes expected (None if the server did not say)
    pub total_bytes: Option<u64>,

    /// Fraction complete (0.0 - 1.0), 0.0 when the total is unknown
    pub fraction: f64,

    /// Transfer rate of this call in KB/s
    pub rate_kbps: f64,

    /// Estimated time remaining in seconds
    pub eta_seconds: f64,
}

impl TransferProgress {
    /// Compute a progress sample
    ///
    /// `offset` is the resume offset the call started from, `elapsed` the time since the
    /// request was issued. Returns `None` when the rate or the ETA cannot be computed
    /// because the elapsed time is zero or no byte was transferred since `offset`.
    pub fn sample(
        bytes_done: u64,
        offset: u64,
        total_bytes: Option<u64>,
        elapsed: Duration,
    ) -> Option<Self> {
        let elapsed_secs = elapsed.as_secs_f64();
        let transferred = bytes_done.saturating_sub(offset);
        if elapsed_secs <= 0.0 || transferred == 0 {
            return None;
        }

        let rate_kbps = (transferred as f64 / 1024.0) / elapsed_secs;
        let remaining = total_bytes
            .map(|t| t.saturating_sub(bytes_done))
            .unwrap_or(0);
        let eta_seconds = remaining as f64 / (rate_kbps * 1024.0);

        let fraction = match total_bytes {
            Some(total) if total > 0 => bytes_done as f64 / total as f64,
            _ => 0.0,
        };

        Some(Self {
            bytes_done,
            total_bytes,
            fraction,
            rate_kbps,
            eta_seconds,
        })
    }

    /// Status line in the form shown while downloading
    ///
    /// `  1,048,576 Bytes [50.00%] received. Rate: [ 512 KB/s].  ETA: [2 secs]`
    pub fn display_string(&self) -> String {
        format!(
            "  {} Bytes [{:.2}%] received. Rate: [{:4.0} KB/s].  ETA: [{:.0} secs]",
            group_thousands(self.bytes_done),
            self.fraction * 100.0,
            self.rate_kbps,
            self.eta_seconds
        )
    }
}

/// Format an integer with `,` thousands separators
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Callback type for progress updates
pub type ProgressCallback = std::sync::Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Source of the current time for rate computation
///
/// The fetcher reads the clock once when the request is sent and once per chunk.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
