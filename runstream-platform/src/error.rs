//! Error types for runstream-platform.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from remote platform or notifier calls.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The API answered with an error document (`{"error": {"type", "message"}}`).
    #[error("{kind} (HTTP {status}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },

    /// Connection, TLS or timeout failure before a response was received.
    #[error("transport error calling {route}: {message}")]
    Transport { route: String, message: String },

    /// A successful response that lacks an expected field.
    #[error("unexpected response from {route}: {message}")]
    UnexpectedResponse { route: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PlatformError {
    /// API error type name (`InvalidAuthentication`, `PermissionDenied`, …).
    pub fn api_kind(&self) -> Option<&str> {
        match self {
            PlatformError::Api { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PlatformError {
    PlatformError::Io {
        path: path.into(),
        source,
    }
}
