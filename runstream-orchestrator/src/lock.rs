//! Per-sequencer process lock.
//!
//! ```text
//! <state_dir>/locks/<sequencer_id>.lock   ("default" when no id is set)
//! ```
//!
//! Held for the lifetime of [`RunLock`]; the OS releases it when the file
//! handle closes, including on abnormal exit.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use runstream_core::notify_state::file_stem;

use crate::error::{io_err, OrchestratorError};

#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the exclusive lock without blocking.
    pub fn acquire(state_dir: &Path, sequencer_id: &str) -> Result<Self, OrchestratorError> {
        let path = lock_path_at(state_dir, sequencer_id);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "acquired run lock");
                Ok(Self { _file: file, path })
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                Err(OrchestratorError::LockHeld { path })
            }
            Err(err) => Err(io_err(&path, err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn lock_path_at(state_dir: &Path, sequencer_id: &str) -> PathBuf {
    state_dir
        .join("locks")
        .join(format!("{}.lock", file_stem(sequencer_id)))
}
