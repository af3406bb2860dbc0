//! Error types for runstream-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from synchronizer invocations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The executable could not be started at all.
    #[error("failed to start synchronizer {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The executable ran and exited unsuccessfully.
    #[error("synchronizer {program} exited with {status}")]
    Failed { program: PathBuf, status: String },

    /// Every attempt failed.
    #[error("number of retries exceeded {attempts}; last failure: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<SyncError>,
    },
}
