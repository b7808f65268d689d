//! chronocopy - command-line front end for the selective sync engine.
//!
//! Parses arguments, sets up logging and Ctrl+C handling, runs one sync job,
//! archives the target tree and prints a summary.
//!
//! Exit codes: 0 on completion, 1 on setup or unexpected errors, 130 when
//! interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use clap::Parser;
use engine::{
    create_archive, create_job, plan_job, run_job, state::state_file_path, ArchiveOptions,
    ChecksumAlgorithm, EngineError, FileEntry, FileState, JobState, ProgressCallback, SyncJob,
    SyncOptions, TimeWindow,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_DAYS: u32 = 7;
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const EXIT_INTERRUPTED: u8 = 130;

/// chronocopy - copy recently created files and archive them
#[derive(Parser, Debug)]
#[command(name = "chronocopy")]
#[command(version)]
#[command(about = "Copy files within a time window into a target directory and create a zip archive")]
#[command(after_help = "Examples:
  chronocopy -s /var/log -t /backup/logs -d 3
  chronocopy -s /data -t /archive --start \"2025-11-01 00:00:00\" --end \"2025-11-05 23:59:59\"
  chronocopy -s /data -t /out --resume --verify")]
struct Args {
    /// Source directory
    #[arg(short = 's', long, value_name = "PATH")]
    source: PathBuf,

    /// Target directory (created if missing)
    #[arg(short = 't', long, value_name = "PATH")]
    target: PathBuf,

    /// Number of recent days to copy [default: 7]
    #[arg(
        short = 'd',
        long,
        value_name = "DAYS",
        value_parser = clap::value_parser!(u32).range(1..),
        conflicts_with_all = ["start", "end"]
    )]
    days: Option<u32>,

    /// Window start, local time 'YYYY-MM-DD HH:MM:SS'
    #[arg(long, value_name = "DATETIME", requires = "end")]
    start: Option<String>,

    /// Window end, local time 'YYYY-MM-DD HH:MM:SS'
    #[arg(long, value_name = "DATETIME", requires = "start")]
    end: Option<String>,

    /// Resume from a previous run (uses .copy_state.json in the target)
    #[arg(long)]
    resume: bool,

    /// Verify hashes after each copy (slower)
    #[arg(long)]
    verify: bool,

    /// Hash algorithm for verification: sha256 or blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "sha256", requires = "verify")]
    hash: String,

    /// Archive output path [default: <target>.zip]
    #[arg(long, value_name = "PATH", conflicts_with = "no_archive")]
    archive: Option<PathBuf>,

    /// Skip creating the archive
    #[arg(long)]
    no_archive: bool,

    /// Leave the resume state file out of the archive
    #[arg(long)]
    exclude_state_from_archive: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// How a run that passed setup ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    Interrupted,
}

/// CLI implementation of ProgressCallback printing to stderr
struct CliProgress {
    verbose: bool,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress { verbose }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_job_started(&self, job: &SyncJob) {
        eprintln!("Preparing sync...");
        eprintln!("  Source: {}", job.source_path.display());
        eprintln!("  Target: {}", job.destination_path.display());
        eprintln!(
            "  Window: {} to {}",
            job.window.start().with_timezone(&Local).format(DATETIME_FORMAT),
            job.window.end().with_timezone(&Local).format(DATETIME_FORMAT)
        );
        eprintln!("  Files found: {}", job.entries.len());
        if job.options.resume {
            eprintln!("  Resume: {} already copied", job.copied_paths.len());
        }
        if job.options.verify_after_copy {
            eprintln!("  Verification: {}", job.options.checksum_algorithm);
        }
        eprintln!();
    }

    fn on_file_started(&self, _job: &SyncJob, _file_index: usize, _file: &FileEntry) {}

    fn on_file_copied(&self, _job: &SyncJob, _file_index: usize, _file: &FileEntry) {}

    fn on_file_completed(&self, _job: &SyncJob, file_index: usize, file: &FileEntry) {
        if self.verbose {
            let flag = if file.is_suspicious() { " [suspicious]" } else { "" };
            eprintln!("[{:3}] {}: {}{}", file_index, file.state, file.relative_path, flag);
        }
    }

    fn on_job_completed(&self, job: &SyncJob) {
        let stats = &job.stats;

        eprintln!();
        match job.state {
            JobState::Interrupted => eprintln!("Sync interrupted."),
            _ => eprintln!("Sync complete!"),
        }
        eprintln!("Total files copied: {}", stats.total_copied());
        if stats.resumed > 0 {
            eprintln!("  this run: {}, from previous runs: {}", stats.copied, stats.resumed);
        }
        eprintln!(
            "Skipped: {} outside window, {} already copied",
            stats.skipped_out_of_window, stats.skipped_already_copied
        );
        if job.options.verify_after_copy {
            eprintln!(
                "Verified with {}: {} ({} rolled back)",
                job.options.checksum_algorithm, stats.verified, stats.rolled_back
            );
        }
        if stats.suspicious > 0 {
            eprintln!("Suspicious files detected: {}", stats.suspicious);
        }
        eprintln!("Bytes copied: {}", Self::format_bytes(stats.bytes_copied));
        if let Some(elapsed) = job.elapsed() {
            eprintln!("Elapsed: {}", Self::format_duration(elapsed));
        }

        let problems: Vec<_> = job
            .entries
            .iter()
            .filter(|f| matches!(f.state, FileState::Failed | FileState::RolledBack))
            .collect();
        if !problems.is_empty() {
            eprintln!();
            eprintln!("Failed files:");
            for file in problems {
                let msg = file.error_message.as_deref().unwrap_or("(unknown error)");
                eprintln!("  {}: {}", file.relative_path, msg);
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupt);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
    }

    match run_cli(&args, interrupt) {
        Ok(RunOutcome::Completed) => ExitCode::SUCCESS,
        Ok(RunOutcome::Interrupted) => {
            eprintln!();
            eprintln!("[INTERRUPTED] Operation cancelled by user.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(msg) => {
            eprintln!("[FATAL] {}", msg);
            ExitCode::FAILURE
        }
    }
}

/// Parse a local 'YYYY-MM-DD HH:MM:SS' string into a UTC instant.
fn parse_local_datetime(value: &str) -> Result<DateTime<Utc>, String> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT)
        .map_err(|_| format!("Invalid date '{}': must be in format 'YYYY-MM-DD HH:MM:SS'", value))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("Invalid date '{}': does not exist in the local time zone", value))
}

/// Build the time window from either an explicit range or a day count.
fn resolve_window(args: &Args, now: DateTime<Utc>) -> Result<TimeWindow, String> {
    match (&args.start, &args.end) {
        (Some(start), Some(end)) => {
            let start = parse_local_datetime(start)?;
            let end = parse_local_datetime(end)?;
            TimeWindow::new(start, end).map_err(|_| "Start date must be <= end date".to_string())
        }
        (None, None) => Ok(TimeWindow::last_days(args.days.unwrap_or(DEFAULT_DAYS), now)),
        _ => Err("--start and --end must be given together".to_string()),
    }
}

fn describe_setup_error(err: &EngineError) -> String {
    if err.is_fatal() {
        err.to_string()
    } else {
        format!("Unexpected error: {}", err)
    }
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, interrupt: Arc<AtomicBool>) -> Result<RunOutcome, String> {
    let window = resolve_window(args, Utc::now())?;

    let checksum_algorithm = if args.verify {
        ChecksumAlgorithm::from_name(&args.hash).ok_or_else(|| {
            format!(
                "Invalid hash algorithm '{}'. Must be 'sha256' or 'blake3'",
                args.hash
            )
        })?
    } else {
        ChecksumAlgorithm::default()
    };

    let options = SyncOptions {
        resume: args.resume,
        verify_after_copy: args.verify,
        checksum_algorithm,
    };

    let archive_path = (!args.no_archive).then(|| {
        args.archive
            .clone()
            .unwrap_or_else(|| engine::default_archive_path(&args.target))
    });

    let mut job = create_job(&args.source, &args.target, window, options)
        .map_err(|e| describe_setup_error(&e))?;
    job.set_interrupt_handle(interrupt);
    if let Some(path) = &archive_path {
        job.exclude_from_scan(path);
    }

    plan_job(&mut job).map_err(|e| describe_setup_error(&e))?;

    let progress = CliProgress::new(args.verbose);
    run_job(&mut job, Some(&progress)).map_err(|e| describe_setup_error(&e))?;

    if job.state == JobState::Interrupted {
        return Ok(RunOutcome::Interrupted);
    }

    if let Some(output_path) = archive_path {
        let archive_options = ArchiveOptions {
            output_path,
            include_state_file: !args.exclude_state_from_archive,
        };
        match create_archive(&job.destination_path, &archive_options) {
            Ok(summary) => eprintln!(
                "\nArchive created: {} ({} files, {})",
                summary.output_path.display(),
                summary.file_count,
                CliProgress::format_bytes(summary.size_bytes)
            ),
            Err(e) => eprintln!("\n[ERROR] {}", e),
        }
    }

    if args.resume {
        eprintln!(
            "Resume state saved to: {}",
            state_file_path(&job.destination_path).display()
        );
    }

    Ok(RunOutcome::Completed)
}
