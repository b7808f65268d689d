//! Progress reporting trait.
//!
//! Decouples the sync engine from any specific front end. All methods are
//! called synchronously from `run_job`.

use crate::model::{FileEntry, SyncJob};

/// Receives lifecycle events from a running sync job.
pub trait ProgressCallback: Send {
    /// Called when job execution starts (after the resume ledger is loaded).
    fn on_job_started(&self, job: &SyncJob);

    /// Called before an entry is examined.
    fn on_file_started(&self, job: &SyncJob, file_index: usize, file: &FileEntry);

    /// Called after an entry's content was written to the target, before
    /// verification runs.
    fn on_file_copied(&self, job: &SyncJob, file_index: usize, file: &FileEntry);

    /// Called when an entry reached a terminal state.
    fn on_file_completed(&self, job: &SyncJob, file_index: usize, file: &FileEntry);

    /// Called once the job is Completed or Interrupted.
    fn on_job_completed(&self, job: &SyncJob);
}
