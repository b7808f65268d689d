//! Core data model for sync jobs.
//!
//! - SyncJob: one run over a source tree into a target tree
//! - FileEntry: a single regular file discovered in the source tree
//! - TimeWindow: the inclusive range a file's timestamp must fall into
//! - RunStatistics: counters accumulated by the copy engine

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::checksums::{ChecksumAlgorithm, ChecksumValue};
use crate::error::EngineError;
use crate::state::CopiedPaths;
use crate::suspicion::SuspicionReason;
use crate::timestamps::TimestampSource;

/// One selective copy run from a source tree into a target tree.
#[derive(Debug)]
pub struct SyncJob {
    /// Unique identifier for this job
    pub id: Uuid,

    /// Root source directory
    pub source_path: PathBuf,

    /// Root target directory
    pub destination_path: PathBuf,

    /// Files whose resolved timestamp falls inside this window are copied
    pub window: TimeWindow,

    pub options: SyncOptions,

    /// Regular files found by `plan_job`, in scan order
    pub entries: Vec<FileEntry>,

    pub state: JobState,

    pub stats: RunStatistics,

    /// Resume ledger; only populated and persisted when resume is enabled
    pub copied_paths: CopiedPaths,

    /// Extra paths kept out of the scan; see `exclude_from_scan`
    pub scan_exclusions: Vec<PathBuf>,

    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,

    /// Set from outside (e.g. a Ctrl+C handler) to stop before the next file
    pub(crate) interrupt: Arc<AtomicBool>,
}

impl SyncJob {
    /// Wall-clock time spent in `run_job`, measured up to now while Running.
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or_else(SystemTime::now);
        end.duration_since(start).ok()
    }
}

/// Behavior switches for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOptions {
    /// Load the ledger at start, skip recorded paths, persist after each copy
    pub resume: bool,

    /// Compare source and destination hashes after each copy
    pub verify_after_copy: bool,

    /// Hash used when `verify_after_copy` is set
    pub checksum_algorithm: ChecksumAlgorithm,
}

/// Inclusive `[start, end]` range of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build an explicit window; fails when `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidTimeWindow { start, end });
        }
        Ok(TimeWindow { start, end })
    }

    /// The `days` days ending at `now`.
    pub fn last_days(days: u32, now: DateTime<Utc>) -> Self {
        TimeWindow {
            start: now - Duration::days(i64::from(days)),
            end: now,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// True when `start <= timestamp <= end`.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// A single regular file within a sync job.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// `/`-separated path relative to the source root; the scan and ledger key
    pub relative_path: String,

    pub source_path: PathBuf,

    /// Mirrored path under the target root
    pub destination_path: PathBuf,

    pub state: FileState,

    /// Set once, before the copy decision
    pub resolved_timestamp: Option<DateTime<Utc>>,

    pub timestamp_source: Option<TimestampSource>,

    /// Empty unless a timestomping heuristic fired
    pub suspicion: Vec<SuspicionReason>,

    pub bytes_copied: u64,

    /// Source digest, recorded when verification passed
    pub checksum: Option<ChecksumValue>,

    /// OS error code if the entry Failed
    pub error_code: Option<i32>,

    pub error_message: Option<String>,
}

impl FileEntry {
    pub fn new(relative_path: String, source_path: PathBuf, destination_path: PathBuf) -> Self {
        FileEntry {
            relative_path,
            source_path,
            destination_path,
            state: FileState::Discovered,
            resolved_timestamp: None,
            timestamp_source: None,
            suspicion: Vec::new(),
            bytes_copied: 0,
            checksum: None,
            error_code: None,
            error_message: None,
        }
    }

    pub fn is_suspicious(&self) -> bool {
        !self.suspicion.is_empty()
    }

    pub(crate) fn fail(&mut self, err: &EngineError) {
        self.state = FileState::Failed;
        self.error_code = err.raw_os_error();
        self.error_message = Some(err.to_string());
    }
}

/// Where a file is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Found by the scan, not yet examined
    Discovered,
    /// Timestamp resolved, copy decision pending
    TimestampResolved,
    /// Not copied
    Skipped(SkipReason),
    /// Copied, not verified
    Copied,
    /// Copied and hash-verified
    Verified,
    /// Verification failed; the destination copy was deleted
    RolledBack,
    /// Copied (and verified, if enabled) and written to the resume ledger
    Recorded,
    /// Metadata, directory creation or copy failed
    Failed,
}

impl FileState {
    /// True if the file ended up in the target tree.
    pub fn is_copied(&self) -> bool {
        matches!(
            self,
            FileState::Copied | FileState::Verified | FileState::Recorded
        )
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileState::Discovered => write!(f, "Discovered"),
            FileState::TimestampResolved => write!(f, "TimestampResolved"),
            FileState::Skipped(reason) => write!(f, "Skipped ({})", reason),
            FileState::Copied => write!(f, "Copied"),
            FileState::Verified => write!(f, "Verified"),
            FileState::RolledBack => write!(f, "RolledBack"),
            FileState::Recorded => write!(f, "Recorded"),
            FileState::Failed => write!(f, "Failed"),
        }
    }
}

/// Why a file was not copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutOfWindow,
    AlreadyCopied,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OutOfWindow => write!(f, "out of window"),
            SkipReason::AlreadyCopied => write!(f, "already copied"),
        }
    }
}

/// The state of an entire sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, not yet started
    Pending,
    /// Currently executing
    Running,
    /// All files processed (some may have failed)
    Completed,
    /// Stopped early by the interrupt handle
    Interrupted,
}

/// Counters accumulated during `run_job`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStatistics {
    /// Files copied in this run (rolled-back copies excluded)
    pub copied: u64,
    pub verified: u64,
    pub suspicious: u64,
    pub skipped_out_of_window: u64,
    pub skipped_already_copied: u64,
    /// Metadata, directory creation or copy failures
    pub failed: u64,
    pub rolled_back: u64,
    /// Ledger size at load time
    pub resumed: u64,
    pub bytes_copied: u64,
}

impl RunStatistics {
    /// Files in the target across this run and the resumed ledger.
    pub fn total_copied(&self) -> u64 {
        self.resumed + self.copied
    }
}
