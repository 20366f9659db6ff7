//! Error handling for Talkbook
//!
//! Every failure is reported synchronously at the call that caused it.
//! Nothing in the engine retries on its own.

use std::path::PathBuf;

use thiserror::Error;

use crate::data::{ProviderId, RelocationReport};
use crate::pcm::{PcmFormat, RiffCheck};
use crate::time::{Time, TimeDelta};

/// Result type alias for Talkbook operations
pub type Result<T> = std::result::Result<T, TalkbookError>;

/// Main error type for Talkbook operations
#[derive(Error, Debug)]
pub enum TalkbookError {
    // Format Errors
    #[error("Invalid RIFF/WAVE stream ({check}): {detail}")]
    InvalidRiffWave { check: RiffCheck, detail: String },

    #[error("Invalid PCM format: {reason}")]
    InvalidPcmFormat { reason: String },

    // Incompatibility Errors
    #[error("Incompatible PCM format: expected {expected}, got {actual}")]
    IncompatibleFormat {
        expected: PcmFormat,
        actual: PcmFormat,
    },

    // Bounds Errors
    #[error("Time {time} is outside the audio range [0, {duration}]")]
    TimeOutOfRange { time: Time, duration: TimeDelta },

    #[error("Invalid time range: {begin} .. {end}")]
    InvalidRange { begin: Time, end: Time },

    #[error("Source stream ended early: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    // Resource State Errors
    #[error("Data provider {id} is busy ({readers} open readers, writer open: {writer})")]
    ProviderBusy {
        id: ProviderId,
        readers: usize,
        writer: bool,
    },

    #[error("Data provider {id} is still referenced by {references} audio object(s)")]
    ProviderReferenced { id: ProviderId, references: usize },

    #[error("Data provider not found: {id}")]
    ProviderNotFound { id: ProviderId },

    #[error("Relocation failed: {report}")]
    RelocationFailed { report: RelocationReport },

    // Factory Errors
    #[error("No audio media data type registered for {tag}")]
    UnknownMediaType { tag: String },

    // File Errors
    #[error("Failed to read file: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory creation failed: {path}: {source}")]
    DirectoryCreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TalkbookError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            TalkbookError::InvalidRiffWave { .. } => "INVALID_RIFF_WAVE",
            TalkbookError::InvalidPcmFormat { .. } => "INVALID_PCM_FORMAT",
            TalkbookError::IncompatibleFormat { .. } => "INCOMPATIBLE_FORMAT",
            TalkbookError::TimeOutOfRange { .. } => "TIME_OUT_OF_RANGE",
            TalkbookError::InvalidRange { .. } => "INVALID_RANGE",
            TalkbookError::ShortRead { .. } => "SHORT_READ",
            TalkbookError::ProviderBusy { .. } => "PROVIDER_BUSY",
            TalkbookError::ProviderReferenced { .. } => "PROVIDER_REFERENCED",
            TalkbookError::ProviderNotFound { .. } => "PROVIDER_NOT_FOUND",
            TalkbookError::RelocationFailed { .. } => "RELOCATION_FAILED",
            TalkbookError::UnknownMediaType { .. } => "UNKNOWN_MEDIA_TYPE",
            TalkbookError::FileReadError { .. } => "FILE_READ_ERROR",
            TalkbookError::FileWriteError { .. } => "FILE_WRITE_ERROR",
            TalkbookError::DirectoryCreateError { .. } => "DIRECTORY_CREATE_ERROR",
            TalkbookError::Io(_) => "IO_ERROR",
            TalkbookError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Returns true if the same call may succeed once the caller has
    /// changed the surrounding state (closed streams, freed disk space).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TalkbookError::ProviderBusy { .. }
                | TalkbookError::ProviderReferenced { .. }
                | TalkbookError::RelocationFailed { .. }
                | TalkbookError::FileWriteError { .. }
        )
    }

    /// Returns a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            TalkbookError::InvalidRiffWave { .. } => {
                Some("Re-export the file as canonical 44-byte-header PCM WAVE.")
            }
            TalkbookError::IncompatibleFormat { .. } => {
                Some("Convert the audio to the document's PCM format before importing.")
            }
            TalkbookError::ProviderBusy { .. } => {
                Some("Close every open audio stream on the provider and try again.")
            }
            TalkbookError::ProviderReferenced { .. } => {
                Some("Release the audio objects that still use this provider first.")
            }
            TalkbookError::RelocationFailed { .. } => Some(
                "Fix the failing providers and call relocate again; moved providers are skipped.",
            ),
            _ => None,
        }
    }
}
