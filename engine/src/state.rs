//! Resume ledger persistence.
//!
//! The ledger is a JSON object `{"copied": [...]}` stored in a fixed file
//! inside the target root. Paths are written sorted. Writes go to a temporary
//! file in the same directory which is then renamed over the old ledger, so a
//! failed save leaves the previous valid file in place.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineError;

/// Name of the ledger file inside the target root.
pub const STATE_FILE_NAME: &str = ".copy_state.json";

/// Set of relative paths already copied (and verified, when enabled).
pub type CopiedPaths = BTreeSet<String>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CopyStateFile {
    #[serde(default)]
    copied: Vec<String>,
}

/// Path of the ledger file for `target_root`.
pub fn state_file_path(target_root: &Path) -> PathBuf {
    target_root.join(STATE_FILE_NAME)
}

/// Load the ledger from `target_root`.
///
/// A missing file yields an empty set. Unreadable or malformed content also
/// yields an empty set and logs a warning; it never blocks the run.
pub fn load_state(target_root: &Path) -> CopiedPaths {
    let path = state_file_path(target_root);

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return CopiedPaths::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read state file, starting fresh");
            return CopiedPaths::new();
        }
    };

    match serde_json::from_str::<CopyStateFile>(&content) {
        Ok(state) => state.copied.into_iter().collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed state file, starting fresh");
            CopiedPaths::new()
        }
    }
}

/// Write the ledger to `target_root`, replacing any previous file atomically.
pub fn save_state(target_root: &Path, copied: &CopiedPaths) -> Result<(), EngineError> {
    let path = state_file_path(target_root);
    let persist_err = |source: io::Error| EngineError::StatePersistFailed {
        path: path.clone(),
        source,
    };

    let state = CopyStateFile {
        copied: copied.iter().cloned().collect(),
    };
    let json = serde_json::to_string_pretty(&state)
        .map_err(|e| persist_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(target_root).map_err(persist_err)?;
    tmp.write_all(json.as_bytes()).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(&path).map_err(|e| persist_err(e.error))?;

    Ok(())
}
