//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Enumerating the regular files of a directory tree
//! - Building the relative-path key shared by the scan and the resume ledger
//! - Copying files with modification time and permission preservation
//! - Creating directories recursively

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::EngineError;
use crate::model::FileEntry;

/// Normalize a path relative to the source root into the scan/ledger key.
///
/// Components are joined with `/` on every platform, so ledgers stay valid
/// when a target is moved between systems. Returns None when a component is
/// not valid UTF-8: a lossy key could collide with another file's.
pub fn relative_key(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_str()?);
        }
    }
    Some(parts.join("/"))
}

/// Enumerate every regular file under `source`, recursively, in scan order.
///
/// Symlinks that resolve to files are included; symlinked directories are not
/// descended into. Paths in `exclude` (as seen from `source`) are skipped
/// entirely, whether they name a directory or a file. Files whose names are
/// not valid UTF-8 are logged and skipped.
///
/// # Errors
/// Returns EngineError only if the root directory cannot be read. Unreadable
/// subdirectories are logged and skipped.
pub fn enumerate_tree(
    source: &Path,
    destination_root: &Path,
    exclude: &[PathBuf],
) -> Result<Vec<FileEntry>, EngineError> {
    let mut entries = Vec::new();

    fn recurse(
        path: &Path,
        rel_path: &Path,
        destination_root: &Path,
        exclude: &[PathBuf],
        entries: &mut Vec<FileEntry>,
    ) -> Result<(), EngineError> {
        let dir = fs::read_dir(path).map_err(|e| EngineError::EnumerationFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        for entry in dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read directory entry");
                    continue;
                }
            };

            let entry_path = entry.path();
            if exclude.iter().any(|p| *p == entry_path) {
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %entry_path.display(), error = %e, "Failed to read file type");
                    continue;
                }
            };

            let rel_full_path = rel_path.join(entry.file_name());

            if file_type.is_dir() {
                if let Err(e) = recurse(&entry_path, &rel_full_path, destination_root, exclude, entries) {
                    warn!(error = %e, "Skipping unreadable directory");
                }
                continue;
            }

            let is_file = file_type.is_file()
                || (file_type.is_symlink() && entry_path.is_file());
            if !is_file {
                continue;
            }
            let Some(key) = relative_key(&rel_full_path) else {
                warn!(path = %entry_path.display(), "Skipping file with non-UTF-8 name");
                continue;
            };
            entries.push(FileEntry::new(
                key,
                entry_path,
                destination_root.join(&rel_full_path),
            ));
        }

        Ok(())
    }

    recurse(source, Path::new(""), destination_root, exclude, &mut entries)?;
    Ok(entries)
}

/// Copy a file from source to destination, preserving modification time,
/// access time and permissions.
///
/// The destination's parent directory must already exist. If anything fails
/// once the destination has been created, the partial file is removed.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let result = fill_destination(&mut src_file, dst_file, src, dst);
    if result.is_err() {
        if let Err(e) = remove_file_if_exists(dst) {
            warn!(path = %dst.display(), error = %e, "Failed to remove partial copy");
        }
    }
    result
}

fn fill_destination(
    src_file: &mut fs::File,
    mut dst_file: fs::File,
    src: &Path,
    dst: &Path,
) -> Result<u64, EngineError> {
    let read_err = |source| EngineError::ReadError {
        path: src.to_path_buf(),
        source,
    };
    let write_err = |source| EngineError::WriteError {
        path: dst.to_path_buf(),
        source,
    };

    let src_metadata = src_file.metadata().map_err(read_err)?;
    if !src_metadata.is_file() {
        return Err(read_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Source is not a regular file",
        )));
    }

    let bytes_copied = io::copy(src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            write_err(e)
        } else {
            read_err(e)
        }
    })?;
    dst_file.sync_all().map_err(write_err)?;
    drop(dst_file);

    // Times before permissions: a read-only destination may refuse later updates.
    let mtime = filetime::FileTime::from_last_modification_time(&src_metadata);
    let atime = filetime::FileTime::from_last_access_time(&src_metadata);
    filetime::set_file_times(dst, atime, mtime).map_err(write_err)?;
    fs::set_permissions(dst, src_metadata.permissions()).map_err(write_err)?;

    Ok(bytes_copied)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if the parent exists as a non-directory or cannot be
/// created
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

/// Delete a file, treating "already gone" as success.
pub fn remove_file_if_exists(path: &Path) -> Result<(), EngineError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::WriteError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
