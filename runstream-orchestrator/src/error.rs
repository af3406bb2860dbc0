use std::path::PathBuf;

use thiserror::Error;

/// A condition that ends the run. The alert (if any) has already been
/// attempted by the time this value exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FatalError {
    pub message: String,
    /// Run id, or the best available stand-in when the run is not yet known.
    pub run_label: String,
}

/// Error surface for the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("another upload is already running for this sequencer (lock held: {path})")]
    LockHeld { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> OrchestratorError {
    OrchestratorError::Io {
        path: path.into(),
        source,
    }
}
