//! Timestamp resolution.
//!
//! Every file gets exactly one timestamp for window filtering. The most
//! trustworthy field the host filesystem exposes wins:
//! 1. birth (creation) time
//! 2. metadata-change time (ctime), where the platform has a distinct one
//! 3. last-modification time
//!
//! Each field is queried for availability on its own, since some filesystems
//! report birth time on any platform and others report none.

use std::fmt;
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};

/// Which metadata field a resolved timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    Birth,
    Change,
    Modified,
}

impl fmt::Display for TimestampSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampSource::Birth => write!(f, "birth"),
            TimestampSource::Change => write!(f, "change"),
            TimestampSource::Modified => write!(f, "modified"),
        }
    }
}

/// All timestamps the filesystem reported for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampSet {
    pub modified: DateTime<Utc>,
    pub changed: Option<DateTime<Utc>>,
    pub born: Option<DateTime<Utc>>,
}

impl TimestampSet {
    /// Build a set holding only a modification time.
    pub fn modified_only(modified: DateTime<Utc>) -> Self {
        TimestampSet {
            modified,
            changed: None,
            born: None,
        }
    }

    /// Read the timestamp fields out of already-fetched metadata.
    pub fn from_metadata(metadata: &Metadata) -> io::Result<Self> {
        let modified = DateTime::<Utc>::from(metadata.modified()?);
        let born = metadata.created().ok().map(DateTime::<Utc>::from);

        Ok(TimestampSet {
            modified,
            changed: change_time(metadata),
            born,
        })
    }

    /// Pick the most reliable available timestamp.
    pub fn resolve(&self) -> (DateTime<Utc>, TimestampSource) {
        if let Some(born) = self.born {
            return (born, TimestampSource::Birth);
        }
        if let Some(changed) = self.changed {
            return (changed, TimestampSource::Change);
        }
        (self.modified, TimestampSource::Modified)
    }

    /// Every available field, in modified/changed/born order.
    pub fn available(&self) -> Vec<DateTime<Utc>> {
        let mut times = vec![self.modified];
        times.extend(self.changed);
        times.extend(self.born);
        times
    }
}

#[cfg(unix)]
fn change_time(metadata: &Metadata) -> Option<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;

    let nanos = u32::try_from(metadata.ctime_nsec()).ok()?;
    DateTime::<Utc>::from_timestamp(metadata.ctime(), nanos)
}

// Windows reports creation time through `created()`; there is no separate
// metadata-change field to fall back to.
#[cfg(not(unix))]
fn change_time(_metadata: &Metadata) -> Option<DateTime<Utc>> {
    None
}

/// Source of timestamp sets for the copy engine.
pub trait TimestampProbe {
    /// Read the timestamp set for `path`, following symlinks.
    fn probe(&self, path: &Path) -> io::Result<TimestampSet>;
}

/// Reads timestamps from the host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTimestampProbe;

impl TimestampProbe for FsTimestampProbe {
    fn probe(&self, path: &Path) -> io::Result<TimestampSet> {
        let metadata = fs::metadata(path)?;
        TimestampSet::from_metadata(&metadata)
    }
}
