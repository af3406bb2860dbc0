//! Validated configuration for one upload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};

use runstream_core::duration::wait_budget;
use runstream_core::{CompletionStyle, DownstreamTarget, LaneLayout};
use runstream_sync::SyncSettings;

/// Everything the orchestrator needs, already parsed. Values that also shape
/// the synchronizer's arguments (project, run directory, sizes, thumbnail and
/// samplesheet-delay flags) live in [`SyncSettings`] only.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub sync: SyncSettings,
    pub log_dir: PathBuf,
    pub lanes: LaneLayout,
    pub sync_interval: Duration,
    pub run_duration: Duration,
    pub intervals_to_wait: u32,
    /// Attempts per synchronization and per platform lookup.
    pub retries: u32,
    pub script: Option<PathBuf>,
    pub downstream: DownstreamTarget,
    pub downstream_input: Map<String, Value>,
    pub completion: CompletionStyle,
    pub sequencer_id: String,
    pub state_dir: PathBuf,
}

impl UploadConfig {
    pub fn project(&self) -> &str {
        &self.sync.project
    }

    pub fn run_dir(&self) -> &Path {
        &self.sync.run_dir
    }

    /// How long the watcher waits for a termination marker before giving up.
    pub fn wait_budget(&self) -> Duration {
        wait_budget(self.run_duration, self.intervals_to_wait)
    }

    /// Label used for notifications before the run id is known.
    pub fn fallback_label(&self) -> String {
        if !self.sequencer_id.trim().is_empty() {
            return self.sequencer_id.clone();
        }
        self.run_dir()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.run_dir().display().to_string())
    }
}

/// Parse the downstream input option: a JSON object whose values are strings
/// or objects. An absent or blank option is an empty map.
pub fn parse_downstream_input(raw: Option<&str>) -> Result<Map<String, Value>, String> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(Map::new());
    };
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| format!("Failed to read downstream input as JSON string. {raw}. {e}"))?;
    let Value::Object(map) = value else {
        return Err(format!("Expected a dict for downstream input. Got {value}."));
    };
    if let Some((key, bad)) = map
        .iter()
        .find(|(_, v)| !matches!(v, Value::String(_) | Value::Object(_)))
    {
        return Err(format!(
            "Expected (string) key and (string or dict) value pairs for downstream input. \
             Got {key}: {bad}"
        ));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    fn absent_input_is_empty(#[case] raw: Option<&str>) {
        assert!(parse_downstream_input(raw).unwrap().is_empty());
    }

    #[test]
    fn strings_and_objects_are_accepted() {
        let map = parse_downstream_input(Some(
            r#"{"0.reference": {"$dnanexus_link": "file-1"}, "mode": "fast"}"#,
        ))
        .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["mode"], "fast");
    }

    #[rstest]
    #[case("not json")]
    #[case("[1, 2]")]
    #[case(r#"{"threads": 4}"#)]
    #[case(r#"{"flags": ["a"]}"#)]
    fn invalid_input_is_rejected(#[case] raw: &str) {
        assert!(parse_downstream_input(Some(raw)).is_err());
    }
}
