//! Job orchestration module.
//!
//! This module provides the sync job lifecycle:
//! - Creating a job from source/target paths and a time window
//! - Planning a job (creating the target root, enumerating the source tree)
//! - Running a job (per-file timestamp resolution, suspicion checks, window
//!   filtering, copy, optional verification, resume ledger updates)
//!
//! Per file, states advance
//! `Discovered -> TimestampResolved -> {Skipped | Copied} -> {Verified | RolledBack} -> Recorded`.
//! Only setup problems are returned as errors; everything that goes wrong
//! with a single file is recorded on its `FileEntry` and the run moves on.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::checksums::{compare_files, Verification};
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{
    FileState, JobState, RunStatistics, SkipReason, SyncJob, SyncOptions, TimeWindow,
};
use crate::progress::ProgressCallback;
use crate::state::{self, CopiedPaths};
use crate::suspicion::detect_suspicion;
use crate::timestamps::{FsTimestampProbe, TimestampProbe};

impl SyncJob {
    /// Shared flag that stops the job before its next file when set.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Share an interrupt flag owned elsewhere, e.g. by a signal handler
    /// installed once per process.
    pub fn set_interrupt_handle(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = flag;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Keep `path` out of the next `plan_job` scan if it lies inside the
    /// source tree, e.g. an archive written next to a nested target. The path
    /// need not exist yet.
    pub fn exclude_from_scan<P: AsRef<Path>>(&mut self, path: P) {
        self.scan_exclusions.push(path.as_ref().to_path_buf());
    }
}

/// Create a new sync job.
///
/// Validates that the source exists, is a directory and can be listed. The
/// target may not exist yet; it is created by `plan_job`.
///
/// # Errors
/// Returns EngineError if the source is missing, unreadable or not a
/// directory, or the target path is empty
pub fn create_job<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    destination: Q,
    window: TimeWindow,
    options: SyncOptions,
) -> Result<SyncJob, EngineError> {
    let source = source.as_ref();
    let destination = destination.as_ref();

    match fs::metadata(source) {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(EngineError::InvalidPath {
                path: source.to_path_buf(),
                reason: "Source must be a directory".to_string(),
            });
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(EngineError::SourceAccessDenied {
                path: source.to_path_buf(),
                source: e,
            });
        }
    }

    fs::read_dir(source).map_err(|e| EngineError::SourceAccessDenied {
        path: source.to_path_buf(),
        source: e,
    })?;

    if destination.as_os_str().is_empty() {
        return Err(EngineError::InvalidPath {
            path: destination.to_path_buf(),
            reason: "Target path is empty".to_string(),
        });
    }

    Ok(SyncJob {
        id: Uuid::new_v4(),
        source_path: source.to_path_buf(),
        destination_path: destination.to_path_buf(),
        window,
        options,
        entries: Vec::new(),
        state: JobState::Pending,
        stats: RunStatistics::default(),
        copied_paths: CopiedPaths::new(),
        scan_exclusions: Vec::new(),
        start_time: None,
        end_time: None,
        interrupt: Arc::new(AtomicBool::new(false)),
    })
}

/// Plan a job: create the target root and enumerate the source tree.
///
/// # Errors
/// Returns EngineError if the target cannot be created or the source root
/// cannot be enumerated
pub fn plan_job(job: &mut SyncJob) -> Result<(), EngineError> {
    if job.state != JobState::Pending {
        return Err(EngineError::InvalidJobState {
            reason: format!("Job must be Pending to plan; current state: {:?}", job.state),
        });
    }

    fs::create_dir_all(&job.destination_path).map_err(|e| {
        EngineError::DestinationCreationFailed {
            path: job.destination_path.clone(),
            source: e,
        }
    })?;

    let exclude: Vec<PathBuf> = std::iter::once(&job.destination_path)
        .chain(&job.scan_exclusions)
        .filter_map(|path| inside_source(&job.source_path, path))
        .collect();
    for path in &exclude {
        debug!(path = %path.display(), "Inside source; excluding it from the scan");
    }

    job.entries = fs_ops::enumerate_tree(&job.source_path, &job.destination_path, &exclude)?;

    Ok(())
}

/// If `path` lives inside the source tree, return it as seen from the source
/// root so the scan can recognize it. A missing final component is resolved
/// through its parent.
fn inside_source(source: &Path, path: &Path) -> Option<PathBuf> {
    let source_canon = fs::canonicalize(source).ok()?;
    let canon = match fs::canonicalize(path) {
        Ok(canon) => canon,
        Err(_) => {
            let name = path.file_name()?;
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            fs::canonicalize(parent).ok()?.join(name)
        }
    };
    let rel = canon.strip_prefix(&source_canon).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(source.join(rel))
}

/// Run a job using timestamps from the host filesystem.
pub fn run_job(
    job: &mut SyncJob,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    run_job_with_probe(job, &FsTimestampProbe, progress_callback)
}

/// Run a job, executing the selective copy.
///
/// Transitions job state from Pending to Running to Completed, or to
/// Interrupted when the interrupt handle is set. Files are processed one at a
/// time in scan order. When resume is enabled the ledger is loaded first,
/// persisted after every recorded copy, and persisted once more at the end.
///
/// # Errors
/// Returns EngineError only if the job is not Pending. File-level errors are
/// recorded in FileEntry.
pub fn run_job_with_probe(
    job: &mut SyncJob,
    probe: &dyn TimestampProbe,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    if job.state != JobState::Pending {
        return Err(EngineError::InvalidJobState {
            reason: format!("Job must be Pending to run; current state: {:?}", job.state),
        });
    }

    let span = info_span!("sync_job", job_id = %job.id);
    let _guard = span.enter();

    job.state = JobState::Running;
    job.start_time = Some(SystemTime::now());

    if job.options.resume {
        job.copied_paths = state::load_state(&job.destination_path);
        job.stats.resumed = job.copied_paths.len() as u64;
        info!(
            already_copied = job.copied_paths.len(),
            "Resume enabled; loaded state from {}",
            state::state_file_path(&job.destination_path).display()
        );
    }

    if let Some(callback) = progress_callback {
        callback.on_job_started(job);
    }

    info!(source = %job.source_path.display(), window = %job.window, "Scanning");

    let mut interrupted = false;
    for file_index in 0..job.entries.len() {
        if job.is_interrupted() {
            interrupted = true;
            break;
        }

        if let Some(callback) = progress_callback {
            callback.on_file_started(job, file_index, &job.entries[file_index]);
        }

        process_entry(job, file_index, probe, progress_callback);

        if let Some(callback) = progress_callback {
            callback.on_file_completed(job, file_index, &job.entries[file_index]);
        }
    }

    if job.options.resume {
        persist_ledger(job);
    }

    job.state = if interrupted {
        warn!("Interrupted; stopping before the next file");
        JobState::Interrupted
    } else {
        JobState::Completed
    };
    job.end_time = Some(SystemTime::now());

    info!(
        copied = job.stats.copied,
        verified = job.stats.verified,
        suspicious = job.stats.suspicious,
        failed = job.stats.failed,
        "Run finished"
    );

    if let Some(callback) = progress_callback {
        callback.on_job_completed(job);
    }

    Ok(())
}

/// Drive a single entry through its lifecycle.
fn process_entry(
    job: &mut SyncJob,
    index: usize,
    probe: &dyn TimestampProbe,
    progress_callback: Option<&dyn ProgressCallback>,
) {
    let relative = job.entries[index].relative_path.clone();
    let src_path = job.entries[index].source_path.clone();
    let dst_path = job.entries[index].destination_path.clone();

    // Ledger hits skip before any metadata is read.
    if job.options.resume && job.copied_paths.contains(&relative) {
        job.entries[index].state = FileState::Skipped(SkipReason::AlreadyCopied);
        job.stats.skipped_already_copied += 1;
        debug!(path = %relative, "Already copied");
        return;
    }

    let timestamps = match probe.probe(&src_path) {
        Ok(timestamps) => timestamps,
        Err(e) => {
            let err = EngineError::MetadataUnavailable {
                path: src_path,
                source: e,
            };
            warn!(path = %relative, error = %err, "Failed to read timestamp");
            job.entries[index].fail(&err);
            job.stats.failed += 1;
            return;
        }
    };

    let (resolved, source) = timestamps.resolve();
    let reasons = detect_suspicion(resolved, &timestamps, Utc::now());
    if !reasons.is_empty() {
        let reasons_text = reasons
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            path = %relative,
            timestamp = %resolved,
            reasons = %reasons_text,
            "Possible timestomping"
        );
        job.stats.suspicious += 1;
    }

    {
        let entry = &mut job.entries[index];
        entry.resolved_timestamp = Some(resolved);
        entry.timestamp_source = Some(source);
        entry.suspicion = reasons;
        entry.state = FileState::TimestampResolved;
    }

    if !job.window.contains(resolved) {
        job.entries[index].state = FileState::Skipped(SkipReason::OutOfWindow);
        job.stats.skipped_out_of_window += 1;
        debug!(path = %relative, timestamp = %resolved, "Outside time window");
        return;
    }

    if let Err(e) = fs_ops::ensure_parent_dir_exists(&dst_path) {
        error!(path = %relative, error = %e, "Failed to create destination directory");
        job.entries[index].fail(&e);
        job.stats.failed += 1;
        return;
    }

    let bytes = match fs_ops::copy_file_with_metadata(&src_path, &dst_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(path = %relative, error = %e, "Failed to copy");
            job.entries[index].fail(&e);
            job.stats.failed += 1;
            return;
        }
    };

    job.entries[index].bytes_copied = bytes;
    job.entries[index].state = FileState::Copied;
    job.stats.copied += 1;
    job.stats.bytes_copied += bytes;
    info!("Copied ({}): {}", job.stats.copied, relative);

    if let Some(callback) = progress_callback {
        callback.on_file_copied(job, index, &job.entries[index]);
    }

    if job.options.verify_after_copy {
        match compare_files(&src_path, &dst_path, job.options.checksum_algorithm) {
            Ok(Verification::Match(checksum)) => {
                job.entries[index].checksum = Some(checksum);
                job.entries[index].state = FileState::Verified;
                job.stats.verified += 1;
            }
            outcome => {
                let reason = match outcome {
                    Ok(_) => "source and destination hashes differ".to_string(),
                    Err(e) => format!("could not hash: {}", e),
                };
                warn!(path = %relative, reason = %reason, "Verification failed; removing copy");
                roll_back(job, index, bytes, reason);
                return;
            }
        }
    }

    if job.options.resume {
        job.copied_paths.insert(relative);
        persist_ledger(job);
        job.entries[index].state = FileState::Recorded;
    }
}

/// Undo a copy that failed verification so it is neither counted nor recorded.
fn roll_back(job: &mut SyncJob, index: usize, bytes: u64, reason: String) {
    let entry = &mut job.entries[index];
    let mut message = format!("Verification failed: {}", reason);
    if let Err(e) = fs_ops::remove_file_if_exists(&entry.destination_path) {
        error!(path = %entry.relative_path, error = %e, "Failed to remove unverified copy");
        entry.error_code = e.raw_os_error();
        message = format!("{}; removal failed: {}", message, e);
    }
    entry.state = FileState::RolledBack;
    entry.error_message = Some(message);

    job.stats.copied -= 1;
    job.stats.bytes_copied -= bytes;
    job.stats.rolled_back += 1;
}

fn persist_ledger(job: &SyncJob) {
    if let Err(e) = state::save_state(&job.destination_path, &job.copied_paths) {
        warn!(error = %e, "Resume state not saved; continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{create_archive, ArchiveOptions};
    use crate::checksums::{compute_file_checksum, ChecksumAlgorithm};
    use crate::model::FileEntry;
    use crate::timestamps::TimestampSet;
    use chrono::{DateTime, Duration};
    use std::sync::Mutex;

    /// Reports modification time only, so tests control the resolved
    /// timestamp with `filetime` regardless of filesystem birth-time support.
    struct ModifiedOnlyProbe;

    impl TimestampProbe for ModifiedOnlyProbe {
        fn probe(&self, path: &Path) -> io::Result<TimestampSet> {
            let modified = fs::metadata(path)?.modified()?;
            Ok(TimestampSet::modified_only(DateTime::<Utc>::from(modified)))
        }
    }

    /// Returns the same timestamp set for every file.
    struct FixedProbe(TimestampSet);

    impl TimestampProbe for FixedProbe {
        fn probe(&self, _path: &Path) -> io::Result<TimestampSet> {
            Ok(self.0)
        }
    }

    /// Fails for files with the given name.
    struct FailingProbe(&'static str);

    impl TimestampProbe for FailingProbe {
        fn probe(&self, path: &Path) -> io::Result<TimestampSet> {
            if path.file_name().map_or(false, |n| n == self.0) {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            ModifiedOnlyProbe.probe(path)
        }
    }

    fn write_aged(dir: &Path, rel: &str, content: &[u8], days_ago: i64) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().expect("has parent")).expect("Failed to create dirs");
        fs::write(&path, content).expect("Failed to write file");
        let when = Utc::now() - Duration::days(days_ago);
        let mtime = filetime::FileTime::from_unix_time(when.timestamp(), 0);
        filetime::set_file_mtime(&path, mtime).expect("Failed to set mtime");
    }

    fn last_week() -> TimeWindow {
        TimeWindow::last_days(7, Utc::now())
    }

    fn run(src: &Path, dst: &Path, options: SyncOptions) -> SyncJob {
        let mut job = create_job(src, dst, last_week(), options).expect("Failed to create job");
        plan_job(&mut job).expect("Failed to plan job");
        run_job_with_probe(&mut job, &ModifiedOnlyProbe, None).expect("Failed to run job");
        job
    }

    fn entry<'a>(job: &'a SyncJob, rel: &str) -> &'a FileEntry {
        job.entries
            .iter()
            .find(|e| e.relative_path == rel)
            .expect("entry should exist")
    }

    fn archive_file_names(path: &Path) -> Vec<String> {
        let file = fs::File::open(path).expect("Failed to open archive");
        let archive = zip::ZipArchive::new(file).expect("Failed to read archive");
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| !n.ends_with('/'))
            .map(|n| n.to_string())
            .collect();
        names.sort();
        names
    }

    fn resume_options() -> SyncOptions {
        SyncOptions {
            resume: true,
            ..SyncOptions::default()
        }
    }

    #[test]
    fn test_create_job_with_valid_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        let dst = temp_dir.path().join("dst");

        let job = create_job(&src, &dst, last_week(), SyncOptions::default())
            .expect("Failed to create job");

        assert_eq!(job.state, JobState::Pending);
        assert!(job.entries.is_empty());
        assert!(!dst.exists(), "create_job must not touch the target");
    }

    #[test]
    fn test_create_job_with_missing_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = create_job(
            temp_dir.path().join("nonexistent"),
            temp_dir.path().join("dst"),
            last_week(),
            SyncOptions::default(),
        );
        assert!(matches!(result, Err(EngineError::SourceNotFound { .. })));
    }

    #[test]
    fn test_create_job_with_file_as_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("file.txt");
        fs::File::create(&src).expect("Failed to create file");

        let result = create_job(&src, &temp_dir.path().join("dst"), last_week(), SyncOptions::default());
        assert!(matches!(result, Err(EngineError::InvalidPath { .. })));
    }

    #[test]
    fn test_plan_job_creates_target() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "a.txt", b"a", 1);
        let dst = temp_dir.path().join("out").join("nested");

        let mut job = create_job(&src, &dst, last_week(), SyncOptions::default())
            .expect("Failed to create job");
        plan_job(&mut job).expect("Failed to plan job");

        assert!(dst.is_dir());
        assert_eq!(job.entries.len(), 1);
        assert_eq!(job.entries[0].state, FileState::Discovered);
    }

    #[test]
    fn test_plan_job_fails_when_target_uncreatable() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"x").expect("Failed to write");

        let mut job = create_job(&src, &blocker.join("dst"), last_week(), SyncOptions::default())
            .expect("Failed to create job");
        let err = plan_job(&mut job).expect_err("target under a file cannot be created");
        assert!(matches!(err, EngineError::DestinationCreationFailed { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_window_filter_copies_recent_files_only() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "old.txt", b"ten days", 10);
        write_aged(&src, "logs/mid.txt", b"three days", 3);
        write_aged(&src, "new.txt", b"one day", 1);
        let dst = temp_dir.path().join("dst");

        let job = run(&src, &dst, SyncOptions::default());

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.stats.copied, 2);
        assert_eq!(job.stats.skipped_out_of_window, 1);
        assert!(!dst.join("old.txt").exists());
        assert_eq!(fs::read(dst.join("logs").join("mid.txt")).expect("read"), b"three days");
        assert_eq!(fs::read(dst.join("new.txt")).expect("read"), b"one day");
        assert_eq!(
            entry(&job, "old.txt").state,
            FileState::Skipped(SkipReason::OutOfWindow)
        );
        assert!(!state::state_file_path(&dst).exists(), "no ledger without resume");
    }

    #[test]
    fn test_window_filtered_run_archives_only_copied_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "old.txt", b"ten days", 10);
        write_aged(&src, "logs/mid.txt", b"three days", 3);
        write_aged(&src, "new.txt", b"one day", 1);
        let dst = temp_dir.path().join("dst");

        let job = run(&src, &dst, resume_options());
        assert_eq!(job.stats.copied, 2);

        let options = ArchiveOptions::for_target(&dst);
        let summary = create_archive(&dst, &options).expect("Failed to archive");

        assert_eq!(summary.file_count, 3);
        assert_eq!(
            archive_file_names(&summary.output_path),
            vec![".copy_state.json", "logs/mid.txt", "new.txt"]
        );
    }

    #[test]
    fn test_copied_files_hash_like_their_sources() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "a.bin", &[7u8; 100_000], 0);
        write_aged(&src, "b/c.bin", b"small", 2);
        let dst = temp_dir.path().join("dst");

        let job = run(&src, &dst, SyncOptions::default());

        for e in job.entries.iter().filter(|e| e.state.is_copied()) {
            let a = compute_file_checksum(&e.source_path, ChecksumAlgorithm::Sha256).expect("hash");
            let b = compute_file_checksum(&e.destination_path, ChecksumAlgorithm::Sha256).expect("hash");
            assert_eq!(a, b);
        }
        assert_eq!(job.stats.copied, 2);
    }

    #[test]
    fn test_resume_is_idempotent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "a.txt", b"alpha", 1);
        write_aged(&src, "sub/b.txt", b"beta", 2);
        let dst = temp_dir.path().join("dst");

        let first = run(&src, &dst, resume_options());
        assert_eq!(first.stats.copied, 2);
        assert_eq!(entry(&first, "sub/b.txt").state, FileState::Recorded);
        let ledger_after_first = fs::read(state::state_file_path(&dst)).expect("ledger");
        let a_after_first = fs::read(dst.join("a.txt")).expect("read");

        let second = run(&src, &dst, resume_options());
        assert_eq!(second.stats.copied, 0);
        assert_eq!(second.stats.skipped_already_copied, 2);
        assert_eq!(second.stats.resumed, 2);
        assert_eq!(fs::read(state::state_file_path(&dst)).expect("ledger"), ledger_after_first);
        assert_eq!(fs::read(dst.join("a.txt")).expect("read"), a_after_first);
        assert!(second.entries.iter().all(|e| e.resolved_timestamp.is_none()));
    }

    struct InterruptAfterFirstCopy {
        flag: Arc<AtomicBool>,
    }

    impl ProgressCallback for InterruptAfterFirstCopy {
        fn on_job_started(&self, _job: &SyncJob) {}
        fn on_file_started(&self, _job: &SyncJob, _file_index: usize, _file: &FileEntry) {}
        fn on_file_copied(&self, _job: &SyncJob, _file_index: usize, _file: &FileEntry) {}
        fn on_file_completed(&self, _job: &SyncJob, _file_index: usize, file: &FileEntry) {
            if file.state.is_copied() {
                self.flag.store(true, Ordering::SeqCst);
            }
        }
        fn on_job_completed(&self, _job: &SyncJob) {}
    }

    #[test]
    fn test_resume_after_interrupt_copies_remaining_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "a.txt", b"alpha", 1);
        write_aged(&src, "b.txt", b"beta", 1);
        let dst = temp_dir.path().join("dst");

        let mut first = create_job(&src, &dst, last_week(), resume_options()).expect("create");
        plan_job(&mut first).expect("plan");
        let interrupter = InterruptAfterFirstCopy {
            flag: first.interrupt_handle(),
        };
        run_job_with_probe(&mut first, &ModifiedOnlyProbe, Some(&interrupter)).expect("run");

        assert_eq!(first.state, JobState::Interrupted);
        assert_eq!(first.stats.copied, 1);
        let done = first
            .entries
            .iter()
            .find(|e| e.state.is_copied())
            .expect("one file copied")
            .relative_path
            .clone();
        assert!(state::load_state(&dst).contains(&done));

        let second = run(&src, &dst, resume_options());
        assert_eq!(second.state, JobState::Completed);
        assert_eq!(second.stats.copied, 1);
        assert_eq!(
            entry(&second, &done).state,
            FileState::Skipped(SkipReason::AlreadyCopied)
        );
        assert_eq!(first.stats.copied + second.stats.copied, 2);
        assert_eq!(second.stats.total_copied(), 2);
        assert!(dst.join("a.txt").exists() && dst.join("b.txt").exists());
    }

    struct CorruptOnCopy;

    impl ProgressCallback for CorruptOnCopy {
        fn on_job_started(&self, _job: &SyncJob) {}
        fn on_file_started(&self, _job: &SyncJob, _file_index: usize, _file: &FileEntry) {}
        fn on_file_copied(&self, _job: &SyncJob, _file_index: usize, file: &FileEntry) {
            fs::write(&file.destination_path, b"corrupted").expect("Failed to corrupt copy");
        }
        fn on_file_completed(&self, _job: &SyncJob, _file_index: usize, _file: &FileEntry) {}
        fn on_job_completed(&self, _job: &SyncJob) {}
    }

    #[test]
    fn test_verification_failure_rolls_back() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "a.txt", b"original content", 1);
        let dst = temp_dir.path().join("dst");

        let options = SyncOptions {
            resume: true,
            verify_after_copy: true,
            checksum_algorithm: ChecksumAlgorithm::Sha256,
        };
        let mut job = create_job(&src, &dst, last_week(), options).expect("create");
        plan_job(&mut job).expect("plan");
        run_job_with_probe(&mut job, &ModifiedOnlyProbe, Some(&CorruptOnCopy)).expect("run");

        assert!(!dst.join("a.txt").exists());
        assert_eq!(job.stats.copied, 0);
        assert_eq!(job.stats.verified, 0);
        assert_eq!(job.stats.rolled_back, 1);
        assert_eq!(job.stats.bytes_copied, 0);
        assert_eq!(entry(&job, "a.txt").state, FileState::RolledBack);
        assert!(!state::load_state(&dst).contains("a.txt"));
    }

    #[test]
    fn test_verification_success_records_checksum() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "a.txt", b"test content", 1);
        let dst = temp_dir.path().join("dst");

        let options = SyncOptions {
            resume: false,
            verify_after_copy: true,
            checksum_algorithm: ChecksumAlgorithm::Blake3,
        };
        let job = run(&src, &dst, options);

        let e = entry(&job, "a.txt");
        assert_eq!(e.state, FileState::Verified);
        assert_eq!(
            e.checksum.as_ref().map(|c| c.algorithm()),
            Some(ChecksumAlgorithm::Blake3)
        );
        assert_eq!(job.stats.verified, 1);
        assert_eq!(job.stats.copied, 1);
    }

    #[test]
    fn test_suspicious_files_are_still_copied() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "stomped.txt", b"x", 1);
        let dst = temp_dir.path().join("dst");

        let t = Utc::now() - Duration::days(1);
        let probe = FixedProbe(TimestampSet {
            modified: t,
            changed: Some(t),
            born: Some(t),
        });
        let mut job = create_job(&src, &dst, last_week(), SyncOptions::default()).expect("create");
        plan_job(&mut job).expect("plan");
        run_job_with_probe(&mut job, &probe, None).expect("run");

        assert_eq!(job.stats.suspicious, 1);
        assert_eq!(job.stats.copied, 1);
        assert!(entry(&job, "stomped.txt").is_suspicious());
        assert!(dst.join("stomped.txt").exists());
    }

    #[test]
    fn test_metadata_failure_skips_only_that_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "locked.txt", b"x", 1);
        write_aged(&src, "open.txt", b"y", 1);
        let dst = temp_dir.path().join("dst");

        let mut job = create_job(&src, &dst, last_week(), SyncOptions::default()).expect("create");
        plan_job(&mut job).expect("plan");
        run_job_with_probe(&mut job, &FailingProbe("locked.txt"), None).expect("run");

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.stats.failed, 1);
        assert_eq!(job.stats.copied, 1);
        let locked = entry(&job, "locked.txt");
        assert_eq!(locked.state, FileState::Failed);
        assert!(locked.error_message.is_some());
        assert!(!dst.join("locked.txt").exists());
    }

    #[test]
    fn test_directory_creation_failure_is_per_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "sub/a.txt", b"a", 1);
        write_aged(&src, "b.txt", b"b", 1);
        let dst = temp_dir.path().join("dst");
        fs::create_dir_all(&dst).expect("Failed to create dst");
        // A file where the destination subdirectory should go.
        fs::write(dst.join("sub"), b"blocker").expect("Failed to write blocker");

        let job = run(&src, &dst, SyncOptions::default());

        assert_eq!(entry(&job, "sub/a.txt").state, FileState::Failed);
        assert!(entry(&job, "b.txt").state.is_copied());
        assert_eq!(job.stats.failed, 1);
        assert_eq!(job.stats.copied, 1);
    }

    #[test]
    fn test_target_inside_source_is_not_rescanned() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "a.txt", b"a", 1);
        let dst = src.join("backup");

        let first = run(&src, &dst, SyncOptions::default());
        assert_eq!(first.stats.copied, 1);

        let second = run(&src, &dst, SyncOptions::default());
        assert_eq!(second.entries.len(), 1);
        assert!(!dst.join("backup").exists());
    }

    #[test]
    fn test_archive_beside_nested_target_is_not_rescanned() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "a.txt", b"a", 1);
        let dst = src.join("backup");
        let options = ArchiveOptions::for_target(&dst);
        assert_eq!(options.output_path, src.join("backup.zip"));

        let mut sizes = Vec::new();
        for _ in 0..2 {
            let mut job = create_job(&src, &dst, last_week(), SyncOptions::default())
                .expect("Failed to create job");
            job.exclude_from_scan(&options.output_path);
            plan_job(&mut job).expect("Failed to plan job");
            run_job_with_probe(&mut job, &ModifiedOnlyProbe, None).expect("Failed to run job");
            assert_eq!(job.entries.len(), 1);

            let summary = create_archive(&dst, &options).expect("Failed to archive");
            sizes.push(summary.size_bytes);
        }

        assert!(!dst.join("backup.zip").exists());
        assert_eq!(archive_file_names(&options.output_path), vec!["a.txt"]);
        assert_eq!(sizes[0], sizes[1]);
    }

    #[test]
    fn test_elapsed_is_set_by_run() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "a.txt", b"a", 1);
        let dst = temp_dir.path().join("dst");

        let mut job = create_job(&src, &dst, last_week(), SyncOptions::default())
            .expect("Failed to create job");
        assert!(job.elapsed().is_none());
        plan_job(&mut job).expect("Failed to plan job");
        run_job_with_probe(&mut job, &ModifiedOnlyProbe, None).expect("Failed to run job");

        assert!(job.start_time.is_some() && job.end_time.is_some());
        assert!(job.elapsed().is_some());
    }

    #[test]
    fn test_run_job_requires_pending_state() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        let dst = temp_dir.path().join("dst");

        let mut job = run(&src, &dst, SyncOptions::default());
        let result = run_job(&mut job, None);
        assert!(matches!(result, Err(EngineError::InvalidJobState { .. })));
    }

    struct RecordingCallback {
        calls: Mutex<Vec<String>>,
    }

    impl ProgressCallback for RecordingCallback {
        fn on_job_started(&self, _job: &SyncJob) {
            self.calls.lock().unwrap().push("job_started".to_string());
        }
        fn on_file_started(&self, _job: &SyncJob, file_index: usize, _file: &FileEntry) {
            self.calls.lock().unwrap().push(format!("file_started({})", file_index));
        }
        fn on_file_copied(&self, _job: &SyncJob, file_index: usize, _file: &FileEntry) {
            self.calls.lock().unwrap().push(format!("file_copied({})", file_index));
        }
        fn on_file_completed(&self, _job: &SyncJob, file_index: usize, _file: &FileEntry) {
            self.calls.lock().unwrap().push(format!("file_completed({})", file_index));
        }
        fn on_job_completed(&self, _job: &SyncJob) {
            self.calls.lock().unwrap().push("job_completed".to_string());
        }
    }

    #[test]
    fn test_run_job_invokes_callbacks_in_order() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_aged(&src, "a.txt", b"a", 1);
        let dst = temp_dir.path().join("dst");

        let mut job = create_job(&src, &dst, last_week(), SyncOptions::default()).expect("create");
        plan_job(&mut job).expect("plan");
        let progress = RecordingCallback {
            calls: Mutex::new(Vec::new()),
        };
        run_job_with_probe(&mut job, &ModifiedOnlyProbe, Some(&progress)).expect("run");

        assert_eq!(
            progress.calls.lock().unwrap().clone(),
            vec![
                "job_started",
                "file_started(0)",
                "file_copied(0)",
                "file_completed(0)",
                "job_completed"
            ]
        );
    }
}
