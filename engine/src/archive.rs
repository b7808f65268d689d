//! Archive creation.
//!
//! Packs the finished target tree into a single deflate-compressed zip whose
//! entry names mirror paths relative to the target root.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::EngineError;
use crate::fs_ops::relative_key;
use crate::state::STATE_FILE_NAME;

/// Where to write the archive and what to put in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub output_path: PathBuf,

    /// Whether the resume ledger travels with the archive
    pub include_state_file: bool,
}

impl ArchiveOptions {
    /// `<target>.zip` next to the target directory, ledger included.
    pub fn for_target(target_root: &Path) -> Self {
        ArchiveOptions {
            output_path: default_archive_path(target_root),
            include_state_file: true,
        }
    }
}

/// Default archive location: a sibling of the target named `<target>.zip`.
pub fn default_archive_path(target_root: &Path) -> PathBuf {
    let mut name = target_root
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "target_archive".into());
    name.push(".zip");
    target_root.with_file_name(name)
}

/// What `create_archive` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub output_path: PathBuf,
    pub file_count: usize,
    pub size_bytes: u64,
}

/// Archive every entry under `target_root`.
///
/// The archive file itself is never included, even when it is written inside
/// the target. On failure any partially written archive is removed.
pub fn create_archive(
    target_root: &Path,
    options: &ArchiveOptions,
) -> Result<ArchiveSummary, EngineError> {
    let output = &options.output_path;
    let archive_err = |message: String| EngineError::ArchiveFailed {
        path: output.clone(),
        message,
    };

    let result = write_archive(target_root, options).map_err(|e| archive_err(e.to_string()));
    let file_count = match result {
        Ok(count) => count,
        Err(e) => {
            if let Err(rm) = fs::remove_file(output) {
                if rm.kind() != io::ErrorKind::NotFound {
                    warn!(path = %output.display(), error = %rm, "Failed to remove partial archive");
                }
            }
            return Err(e);
        }
    };

    let size_bytes = fs::metadata(output)
        .map_err(|e| archive_err(e.to_string()))?
        .len();

    info!(path = %output.display(), files = file_count, "Archive created");

    Ok(ArchiveSummary {
        output_path: output.clone(),
        file_count,
        size_bytes,
    })
}

fn write_archive(target_root: &Path, options: &ArchiveOptions) -> zip::result::ZipResult<usize> {
    let file = File::create(&options.output_path)?;
    let mut zip = ZipWriter::new(file);
    let file_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(6));

    // The output may not exist as a canonical path until created above.
    let skip = fs::canonicalize(&options.output_path).ok();

    let mut file_count = 0;
    let mut stack = vec![target_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut children = fs::read_dir(&dir)?.collect::<Result<Vec<_>, _>>()?;
        children.sort_by_key(|c| c.file_name());

        for child in children {
            let path = child.path();
            let rel = match path.strip_prefix(target_root) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let Some(name) = relative_key(rel) else {
                warn!(path = %path.display(), "Skipping entry with non-UTF-8 name");
                continue;
            };

            if child.file_type()?.is_dir() {
                zip.add_directory(format!("{}/", name), file_options)?;
                stack.push(path);
                continue;
            }

            if skip.is_some() && fs::canonicalize(&path).ok() == skip {
                continue;
            }
            if !options.include_state_file && name == STATE_FILE_NAME {
                continue;
            }

            zip.start_file(name, file_options)?;
            let mut src = File::open(&path)?;
            io::copy(&mut src, &mut zip)?;
            file_count += 1;
        }
    }

    zip.finish()?;
    Ok(file_count)
}
