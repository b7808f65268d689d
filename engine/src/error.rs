//! Error types for the sync engine.
//!
//! The primary error type is `EngineError`. Setup errors returned from
//! `create_job`/`plan_job` abort a run before any scanning happens. Errors that
//! arise while processing a single file are recorded on the `FileEntry` and
//! counted in `RunStatistics`; they never escape `run_job`.

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source directory exists but cannot be read
    #[error("Source directory access denied: {}", path.display())]
    SourceAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Path is empty, not a directory, or otherwise unusable
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Target directory could not be created
    #[error("Cannot create target directory: {}", path.display())]
    DestinationCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Time window start is after its end
    #[error("Invalid time window: start {start} is after end {end}")]
    InvalidTimeWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Operation requested in the wrong job state
    #[error("Invalid job state: {reason}")]
    InvalidJobState { reason: String },

    /// Failed to enumerate a directory
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read from a file
    #[error("Failed to read file: {}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to a file
    #[error("Failed to write file: {}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File metadata (timestamps) could not be read
    #[error("Failed to read metadata: {}", path.display())]
    MetadataUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Resume state could not be written
    #[error("Failed to persist resume state: {}", path.display())]
    StatePersistFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Archive could not be produced
    #[error("Failed to create archive {}: {message}", path.display())]
    ArchiveFailed { path: PathBuf, message: String },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SourceAccessDenied { source, .. }
            | Self::DestinationCreationFailed { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::MetadataUnavailable { source, .. }
            | Self::StatePersistFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Returns true for setup errors that must abort a run before scanning.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::SourceAccessDenied { .. }
                | Self::InvalidPath { .. }
                | Self::DestinationCreationFailed { .. }
                | Self::InvalidTimeWindow { .. }
                | Self::InvalidJobState { .. }
        )
    }
}
