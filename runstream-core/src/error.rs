//! Error types for runstream-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from core run-directory operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `RunInfo.xml` is absent from the run directory.
    #[error("file RunInfo.xml not found in {run_dir}")]
    RunInfoMissing { run_dir: PathBuf },

    /// `RunInfo.xml` exists but the run id or read cycles cannot be extracted.
    #[error("could not extract run metadata from {path}: {message}")]
    RunInfoParse { path: PathBuf, message: String },

    /// A run-duration string that does not match `<int>[smhdwMy]`.
    #[error("invalid run duration '{input}': {reason}")]
    Duration { input: String, reason: String },

    /// Lane partitioning other than none, 2 or 8.
    #[error("unsupported lane count {0}; expected 2 or 8")]
    InvalidLaneCount(u8),

    /// YAML serialization error (notification state save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load of the notification state.
    #[error("failed to parse notification state at {path}: {source}")]
    StateParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.runstream/`.
    #[error("cannot determine home directory; set $HOME or pass --state-dir")]
    HomeNotFound,
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
