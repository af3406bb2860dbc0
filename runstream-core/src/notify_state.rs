//! Persisted record of which run directories already had their start
//! notification sent, so a restarted uploader does not announce a run twice.
//!
//! # Storage layout
//!
//! ```text
//! <state_dir>/                      (default ~/.runstream)
//!   notified/
//!     <sequencer_id>.yaml           (mode 0600; "default" when no id is set)
//! ```
//!
//! Loaded once at start, written once after the start notification.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};

/// One run directory's notification status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyEntry {
    pub notified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified_at: Option<DateTime<Utc>>,
}

/// Map of run directory → notification status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyState {
    #[serde(default)]
    pub runs: BTreeMap<String, NotifyEntry>,
}

impl NotifyState {
    pub fn is_notified(&self, run_dir: &Path) -> bool {
        self.runs
            .get(&key(run_dir))
            .map(|e| e.notified)
            .unwrap_or(false)
    }

    pub fn mark_notified(&mut self, run_dir: &Path, at: DateTime<Utc>) {
        self.runs.insert(
            key(run_dir),
            NotifyEntry {
                notified: true,
                notified_at: Some(at),
            },
        );
    }
}

fn key(run_dir: &Path) -> String {
    run_dir.to_string_lossy().into_owned()
}

/// `~/.runstream`, used when no explicit state directory is configured.
pub fn default_state_dir() -> Result<PathBuf, CoreError> {
    dirs::home_dir()
        .map(|home| home.join(".runstream"))
        .ok_or(CoreError::HomeNotFound)
}

/// `<state_dir>/notified/<sequencer_id>.yaml`: pure, no I/O.
pub fn state_path_at(state_dir: &Path, sequencer_id: &str) -> PathBuf {
    state_dir
        .join("notified")
        .join(format!("{}.yaml", file_stem(sequencer_id)))
}

/// File-name-safe stem for a sequencer id (`default` when empty).
pub fn file_stem(sequencer_id: &str) -> String {
    let trimmed = sequencer_id.trim().trim_matches(|c| c == '"' || c == '\'');
    if trimmed.is_empty() {
        return "default".to_string();
    }
    trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Load the state for `sequencer_id`; an absent file is an empty state.
pub fn load_at(state_dir: &Path, sequencer_id: &str) -> Result<NotifyState, CoreError> {
    let path = state_path_at(state_dir, sequencer_id);
    if !path.exists() {
        return Ok(NotifyState::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| CoreError::StateParse { path, source })
}

/// Atomically save the state: `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(state_dir: &Path, sequencer_id: &str, state: &NotifyState) -> Result<(), CoreError> {
    let path = state_path_at(state_dir, sequencer_id);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid state path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let yaml = serde_yaml::to_string(state)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}
