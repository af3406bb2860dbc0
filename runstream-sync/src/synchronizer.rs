//! The synchronizer capability and its subprocess implementation.
//!
//! Output contract: the last non-empty line of stdout is a whitespace-separated
//! list of remote artifact ids, one per archive produced, in upload order.

use std::process::{Command, Stdio};

use runstream_core::{FileId, Lane};

use crate::error::SyncError;
use crate::settings::{redacted, SyncSettings};

pub trait Synchronizer {
    /// Tar and upload everything new for `lane`. `finish` marks the terminal
    /// pass: no file-age filter, nothing will be written after it.
    fn sync(&self, lane: &Lane, finish: bool) -> Result<Vec<FileId>, SyncError>;

    /// Confirm the synchronizer can be run at all.
    fn check_available(&self) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Runs the synchronizer executable as a child process and blocks until it exits.
pub struct ExternalSynchronizer {
    settings: SyncSettings,
}

impl ExternalSynchronizer {
    pub fn new(settings: SyncSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }
}

impl Synchronizer for ExternalSynchronizer {
    fn sync(&self, lane: &Lane, finish: bool) -> Result<Vec<FileId>, SyncError> {
        let program = &self.settings.executable;
        let args = self.settings.args_for(lane, finish);
        tracing::info!(
            lane = %lane.label,
            finish,
            command = %format!("{} {}", program.display(), redacted(&args)),
            "running synchronizer"
        );

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|source| SyncError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SyncError::Failed {
                program: program.clone(),
                status: output.status.to_string(),
            });
        }

        let ids = parse_artifact_ids(&String::from_utf8_lossy(&output.stdout));
        tracing::info!(lane = %lane.label, finish, artifacts = ids.len(), "synchronizer finished");
        Ok(ids)
    }

    fn check_available(&self) -> Result<(), SyncError> {
        let program = &self.settings.executable;
        let status = Command::new(program)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| SyncError::Spawn {
                program: program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(SyncError::Failed {
                program: program.clone(),
                status: status.to_string(),
            })
        }
    }
}

/// Artifact ids from the last non-empty line of `stdout`.
pub fn parse_artifact_ids(stdout: &str) -> Vec<FileId> {
    stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.split_whitespace().map(FileId::from).collect())
        .unwrap_or_default()
}
