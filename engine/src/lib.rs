//! # chronocopy engine - selective, resumable file sync
//!
//! Copies the files of a source tree whose most trustworthy timestamp falls
//! inside a time window, flags timestamps that look tampered with, optionally
//! verifies every copy by content hash, keeps a resume ledger so interrupted
//! runs pick up where they left off, and packs the result into a zip archive.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use chrono::Utc;
//! use engine::{create_archive, create_job, plan_job, run_job, ArchiveOptions, SyncOptions, TimeWindow};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let window = TimeWindow::last_days(7, Utc::now());
//! let options = SyncOptions { resume: true, ..SyncOptions::default() };
//!
//! let mut job = create_job("/var/log", "/backup/logs", window, options)?;
//! plan_job(&mut job)?;
//! run_job(&mut job, None)?;
//! println!("Copied {} files", job.stats.copied);
//!
//! let summary = create_archive(&job.destination_path, &ArchiveOptions::for_target(&job.destination_path))?;
//! println!("Archive: {}", summary.output_path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (SyncJob, FileEntry, TimeWindow, RunStatistics)
//! - **error**: Error types and handling
//! - **timestamps**: Timestamp probing and trust ranking
//! - **suspicion**: Timestomping heuristics
//! - **state**: Resume ledger persistence
//! - **checksums**: Content hashing and copy verification
//! - **fs_ops**: Low-level filesystem operations
//! - **job**: Job orchestration (create, plan, run)
//! - **archive**: Zip archive of the target tree
//! - **progress**: Progress callback trait

pub mod archive;
pub mod checksums;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod model;
pub mod progress;
pub mod state;
pub mod suspicion;
pub mod timestamps;

pub use archive::{create_archive, default_archive_path, ArchiveOptions, ArchiveSummary};
pub use checksums::{compute_file_checksum, verify_copy, ChecksumAlgorithm, ChecksumValue};
pub use error::EngineError;
pub use job::{create_job, plan_job, run_job, run_job_with_probe};
pub use model::{
    FileEntry, FileState, JobState, RunStatistics, SkipReason, SyncJob, SyncOptions, TimeWindow,
};
pub use progress::ProgressCallback;
pub use state::{load_state, save_state, CopiedPaths, STATE_FILE_NAME};
pub use suspicion::{detect_suspicion, is_suspicious, SuspicionReason};
pub use timestamps::{FsTimestampProbe, TimestampProbe, TimestampSet, TimestampSource};
