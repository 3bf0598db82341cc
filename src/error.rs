//! Error types for lecture-dl
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by domain (transfer, DRM, external tools, files) so callers
//! can decide per unit of work whether to skip, retry later, or abort the run.
//!
//! ## Outcome taxonomy
//!
//! - `ConnectionError` - network-layer failure, returned to the caller as a failed fetch
//! - `MalformedTransfer` - zero-progress or corrupt stream, the partial file is purged
//! - `HttpStatus` - server answered with a non-success status
//! - `KeyNotFound` - decryption key missing for a required key-ID, aborts the lecture
//! - `ExternalToolFailure` - a decryptor/remuxer/segment fetcher exited non-zero
//! - `Interrupted` - user pressed Ctrl-C, always propagates to process exit
//!
//! "Already downloaded" and "short read" are not errors: they are reported through
//! [`crate::download::FetchOutcome`].

use thiserror::Error;

/// Result type alias using our DownloadError type
pub type Result<T> = std::result::Result<T, DownloadError>;

/// Main error type for lecture-dl
#[derive(Error, Debug)]
pub enum DownloadError {
    // ===== Transfer Errors =====

    /// Connection could not be established or was refused
    #[error("connection-error: {0}")]
    ConnectionError(String),

    /// Stream offered no transferable bytes (rate or ETA would divide by zero)
    #[error("malformed transfer: lecture has malfunction or is zero byte(s) ({0})")]
    MalformedTransfer(String),

    /// Server returned a non-success status code
    #[error("HTTP {status_code}: {reason}")]
    HttpStatus {
        status_code: u16,
        reason: String,
    },

    /// Invalid download URL format or protocol
    #[error("Invalid download URL: {0}")]
    InvalidDownloadUrl(String),

    // ===== DRM Errors =====

    /// No key in the keyfile for the extracted key-ID
    #[error("Key not found for key-ID {0}")]
    KeyNotFound(String),

    /// Container could not be parsed while looking for protection headers
    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    /// Keyfile exists but is not a JSON object of strings
    #[error("Invalid keyfile {path}: {reason}")]
    InvalidKeyfile {
        path: String,
        reason: String,
    },

    // ===== External Tool Errors =====

    /// External tool exited with a non-zero status
    #[error("{tool} exited with status {code}")]
    ExternalToolFailure {
        tool: String,
        /// -1 when the process was killed by a signal
        code: i32,
    },

    /// External tool binary could not be spawned
    #[error("{0} not found. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    /// External tool did not finish within the configured timeout
    #[error("{tool} timed out after {seconds} seconds")]
    ToolTimeout {
        tool: String,
        seconds: u64,
    },

    /// Pipeline finished decrypting but the remuxed output is missing
    #[error("Remux output was not created: {0}")]
    OutputMissing(String),

    // ===== File Errors =====

    /// File or directory not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// Invalid file path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Configuration file is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ===== General Errors =====

    /// User interrupted the run (Ctrl-C)
    #[error("User Interrupted")]
    Interrupted,

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Protobuf decoding error
    #[error("Protobuf decode error: {0}")]
    ProtobufError(#[from] prost::DecodeError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// Helper methods for creating common errors
impl DownloadError {
    /// Create a ConnectionError from anything displayable
    pub fn connection<S: Into<String>>(detail: S) -> Self {
        DownloadError::ConnectionError(detail.into())
    }

    /// Create an ExternalToolFailure from an exit status
    pub fn tool_failed<S: Into<String>>(tool: S, status: std::process::ExitStatus) -> Self {
        DownloadError::ExternalToolFailure {
            tool: tool.into(),
            code: status.code().unwrap_or(-1),
        }
    }

    /// Check if error is retryable by re-running the same target later
    ///
    /// Connection problems and 5xx responses may succeed on a later attempt; the
    /// `.part` file left on disk lets the next attempt resume.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::ConnectionError(_) | DownloadError::ToolTimeout { .. } => true,
            DownloadError::HttpStatus { status_code, .. } => {
                (500..=599).contains(status_code) || *status_code == 429
            }
            DownloadError::ReqwestError(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Check if error is related to DRM/decryption
    pub fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            DownloadError::KeyNotFound(_)
                | DownloadError::InvalidContainer(_)
                | DownloadError::InvalidKeyfile { .. }
                | DownloadError::ProtobufError(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            DownloadError::ToolNotFound(tool) => {
                format!("{} is missing from your system or path!", tool)
            }
            DownloadError::KeyNotFound(kid) => {
                format!(
                    "No decryption key for key-ID {}. Add it to your keyfile and run again.",
                    kid
                )
            }
            DownloadError::MalformedTransfer(_) => {
                "It seems the lecture has a malfunction or is zero byte(s).".to_string()
            }
            DownloadError::Interrupted => "User Interrupted..".to_string(),
            _ => self.to_string(),
        }
    }
}
