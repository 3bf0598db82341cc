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


//! Filename sanitizing and media path conventions
//!
//! # Naming Convention
//! Every file produced for an encrypted lecture is derived from one base name by
//! suffix substitution, never chosen independently:
//! - `<base>.encrypted.mp4` / `<base>.encrypted.m4a` - segmented fetcher output
//! - `<base>.decrypted.mp4` / `<base>.decrypted.m4a` - decryptor output
//! - `<base>.mp4` - remuxed deliverable
//!
//! The final name doubles as the idempotence check: if it exists, the lecture is done.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

pub const ENCRYPTED_VIDEO_SUFFIX: &str = ".encrypted.mp4";
pub const ENCRYPTED_AUDIO_SUFFIX: &str = ".encrypted.m4a";
pub const DECRYPTED_VIDEO_SUFFIX: &str = ".decrypted.mp4";
pub const DECRYPTED_AUDIO_SUFFIX: &str = ".decrypted.m4a";
pub const FINAL_SUFFIX: &str = ".mp4";

/// Suffix of the temp file a plain transfer writes into
pub const PART_SUFFIX: &str = ".part";

/// Windows refuses paths longer than this without the `\\?\` prefix
#[cfg(target_os = "windows")]
const LONG_PATH_THRESHOLD: usize = 250;

lazy_static! {
    static ref INTERMEDIATE_RE: Regex =
        Regex::new(r"\.(de|en)crypted\.m(p4|4a)$").expect("static regex");
}

/// Sanitize a title into a filename
///
/// Path separators and the characters reserved on common filesystems
/// (`\ / : * ? " < > |`) are replaced with `_`, as are control characters.
pub fn sanitize_filename(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Trim leading/trailing whitespace and trailing dots
    result = result.trim().trim_end_matches('.').to_string();

    if cfg!(target_os = "windows") {
        result = handle_windows_reserved_names(&result);
    }

    if result.is_empty() {
        result = "file".to_string();
    }

    result
}

/// Handle Windows reserved filenames
fn handle_windows_reserved_names(name: &str) -> String {
    let upper = name.to_uppercase();
    let reserved = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    for reserved_name in &reserved {
        if upper == *reserved_name || upper.starts_with(&format!("{}.", reserved_name)) {
            return format!("_{}", name);
        }
    }

    name.to_string()
}

/// Apply the extended-length prefix to long paths on Windows
pub fn long_path(path: PathBuf) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let text = path.to_string_lossy();
        if text.len() > LONG_PATH_THRESHOLD && !text.starts_with(r"\\?\") {
            return PathBuf::from(format!(r"\\?\{}", text));
        }
    }
    path
}

/// Append a suffix to the full file name (not replacing the extension)
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Strip `suffix` from the end of the path's text, if present
pub fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    path.to_str()
        .and_then(|s| s.strip_suffix(suffix))
        .map(PathBuf::from)
}

/// Base name for an encrypted lecture
///
/// `lecture_path` is `<dir>/<sanitized title>.mp4`; the `.mp4` extension is dropped and
/// `%` removed from the file name because the segmented fetcher treats it as an output
/// template marker. The directory is left untouched.
pub fn encrypted_base(lecture_path: &Path) -> PathBuf {
    let name = lecture_path
        .file_name()
        .map(|n| n.to_string_lossy().replace('%', ""))
        .unwrap_or_default();
    let stem = name.strip_suffix(FINAL_SUFFIX).unwrap_or(&name);
    match lecture_path.parent() {
        Some(dir) => dir.join(stem),
        None => PathBuf::from(stem),
    }
}

/// `<base>.decrypted.mp4` for `<base>.encrypted.mp4`, `<base>.decrypted.m4a` for `.m4a`
pub fn decrypted_from_encrypted(encrypted: &Path) -> Option<PathBuf> {
    if let Some(base) = strip_suffix(encrypted, ENCRYPTED_VIDEO_SUFFIX) {
        return Some(with_suffix(&base, DECRYPTED_VIDEO_SUFFIX));
    }
    strip_suffix(encrypted, ENCRYPTED_AUDIO_SUFFIX)
        .map(|base| with_suffix(&base, DECRYPTED_AUDIO_SUFFIX))
}

/// Final deliverable path for any encrypted or decrypted intermediate
pub fn final_from_intermediate(intermediate: &Path) -> Option<PathBuf> {
    let text = intermediate.to_str()?;
    if !INTERMEDIATE_RE.is_match(text) {
        return None;
    }
    Some(PathBuf::from(
        INTERMEDIATE_RE.replace(text, FINAL_SUFFIX).into_owned(),
    ))
}

/// True for any `.(en|de)crypted.(mp4|m4a)` intermediate
pub fn is_intermediate(path: &Path) -> bool {
    path.to_str().map_or(false, |s| INTERMEDIATE_RE.is_match(s))
}

/// True for `<base>.encrypted.mp4` and `<base>.encrypted.m4a`
pub fn is_encrypted_intermediate(path: &Path) -> bool {
    path.to_str().map_or(false, |s| {
        s.ends_with(ENCRYPTED_VIDEO_SUFFIX) || s.ends_with(ENCRYPTED_AUDIO_SUFFIX)
    })
}

/// `.srt` sibling of a `.vtt` subtitle
pub fn srt_sibling(vtt_path: &Path) -> Option<PathBuf> {
    match path_extension(vtt_path).as_deref() {
        Some("vtt") => Some(vtt_path.with_extension("srt")),
        _ => None,
    }
}

/// Lowercased extension of a path
pub fn path_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
