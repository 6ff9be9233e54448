// src/error.rs

use std::path::PathBuf;

use thiserror::Error;

use crate::model::size::Size;

/// Core error types for loopdown
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Property-list parse errors
    #[error("Property list error: {0}")]
    Plist(#[from] plist::Error),

    /// JSON parse/serialize errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bad configuration (invalid server URL, bad selection, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata source could not be located, locally or via remote fallback
    #[error("Metadata source not found: {0}")]
    SourceNotFound(String),

    /// Metadata source parsed but is not an audio-content source
    #[error("Invalid metadata source {path}: {reason}")]
    InvalidSource { path: PathBuf, reason: String },

    /// Package transfer failed after exhausting retries
    #[error("Download failed for {name}: {reason}")]
    Download { name: String, reason: String },

    /// Downloaded artifact failed post-transfer verification
    #[error("Verification failed for {name}: {reason}")]
    Verification { name: String, reason: String },

    /// Not enough free space on the target volume for the resolved set
    #[error("Insufficient space available: {required} required, {available} available")]
    InsufficientSpace { required: Size, available: Size },

    /// Platform helper binary exited non-zero or produced unusable output
    #[error("{program} failed: {reason}")]
    CommandFailed { program: String, reason: String },

    /// Another loopdown instance holds the instance lock
    #[error("Another instance of loopdown is already running")]
    AlreadyRunning,

    /// No source across the whole run yielded any package
    #[error("No packages found for processing")]
    NothingToDo,
}

impl Error {
    /// Process exit code for this error. Distinct statuses for the
    /// already-running and nothing-to-do terminations; configuration and
    /// space failures share the pre-execution code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::InsufficientSpace { .. } => 2,
            Error::AlreadyRunning => 3,
            Error::NothingToDo => 4,
            _ => 1,
        }
    }
}

/// Result type alias using loopdown's Error type
pub type Result<T> = std::result::Result<T, Error>;
