//! Domain types for a streamed sequencing run.
//!
//! A run is split into one or more [`Lane`]s; each lane is an independent
//! upload unit with its own remote folder, local log file and sentinel record.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Record type attached to every sentinel record created by runstream.
pub const SENTINEL_TYPE: &str = "UploadSentinel";

/// Key/value properties carried by sentinel records and uploaded files.
pub type Properties = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Run identifier read from the `Id` attribute of `RunInfo.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Remote identifier of a sentinel record (`record-…`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Remote identifier of an uploaded file (`file-…`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Lanes
// ---------------------------------------------------------------------------

/// Label of a lane: the whole run, or a 1-based flow-cell lane number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneLabel {
    All,
    Numbered(u8),
}

impl fmt::Display for LaneLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneLabel::All => write!(f, "all"),
            LaneLabel::Numbered(n) => write!(f, "{n}"),
        }
    }
}

/// How the run is partitioned into lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaneLayout {
    /// One lane labelled `all` covering the whole run directory.
    #[default]
    Whole,
    /// `n` numbered lanes, `n` ∈ {2, 8}.
    Split(u8),
}

impl LaneLayout {
    /// Build a layout from the optional lane-count option.
    pub fn from_count(count: Option<u8>) -> Result<Self, CoreError> {
        match count {
            None => Ok(Self::Whole),
            Some(n @ (2 | 8)) => Ok(Self::Split(n)),
            Some(other) => Err(CoreError::InvalidLaneCount(other)),
        }
    }

    pub fn labels(&self) -> Vec<LaneLabel> {
        match self {
            LaneLayout::Whole => vec![LaneLabel::All],
            LaneLayout::Split(n) => (1..=*n).map(LaneLabel::Numbered).collect(),
        }
    }
}

/// Remote artifacts recorded for a lane as uploads succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LaneArtifacts {
    pub tar_file_ids: Vec<FileId>,
    pub log_file_id: Option<FileId>,
    pub runinfo_file_id: Option<FileId>,
    pub samplesheet_file_id: Option<FileId>,
}

/// One logical upload unit of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lane {
    pub label: LaneLabel,
    /// `run.<run_id>.lane.<label>`: prefix for tar archives and the log file.
    pub prefix: String,
    /// `<prefix>.upload_sentinel`
    pub record_name: String,
    /// Remote folder receiving this lane's archives and metadata files.
    pub remote_folder: String,
    /// Local log file written by the external synchronizer.
    pub log_path: PathBuf,
    pub sentinel: Option<RecordId>,
    /// Properties of the sentinel record, copied onto every uploaded file.
    pub properties: Properties,
    /// The lane's sentinel is closed; nothing more to do.
    pub uploaded: bool,
    /// The sentinel was closed by this process (as opposed to found closed).
    pub closed_this_run: bool,
    /// Samplesheet selected by reconciliation, relative to the run directory.
    pub samplesheet: Option<String>,
    /// Reconciliation found conflicting samplesheets.
    pub halt_downstream: bool,
    pub artifacts: LaneArtifacts,
}

impl Lane {
    pub fn new(run_id: &RunId, label: LaneLabel, log_dir: &Path) -> Self {
        let prefix = format!("run.{run_id}.lane.{label}");
        Self {
            label,
            record_name: format!("{prefix}.upload_sentinel"),
            remote_folder: target_folder(&run_folder(run_id, "runs"), label),
            log_path: log_dir.join(format!("{prefix}.log")),
            prefix,
            sentinel: None,
            properties: Properties::new(),
            uploaded: false,
            closed_this_run: false,
            samplesheet: None,
            halt_downstream: false,
            artifacts: LaneArtifacts::default(),
        }
    }

    /// All lanes of a run, in label order.
    pub fn plan(run_id: &RunId, layout: LaneLayout, log_dir: &Path) -> Vec<Lane> {
        layout
            .labels()
            .into_iter()
            .map(|label| Lane::new(run_id, label, log_dir))
            .collect()
    }

    /// Properties a freshly created sentinel record carries.
    pub fn initial_properties(&self, run_id: &RunId) -> Properties {
        let mut props = Properties::new();
        props.insert("run_id".to_string(), run_id.0.clone());
        props.insert("lanes".to_string(), self.label.to_string());
        props
    }
}

/// `/<run_id>/<kind>`: `kind` is one of `runs`, `reads`, `analyses`.
pub fn run_folder(run_id: &RunId, kind: &str) -> String {
    format!("/{run_id}/{kind}")
}

/// Per-lane subfolder of `base`; the `all` lane uses `base` itself.
pub fn target_folder(base: &str, lane: LaneLabel) -> String {
    match lane {
        LaneLabel::All => base.to_string(),
        LaneLabel::Numbered(_) => format!("{}/{lane}", base.trim_end_matches('/')),
    }
}

// ---------------------------------------------------------------------------
// Run completion
// ---------------------------------------------------------------------------

/// Which terminal marker files announce that the instrument finished writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionStyle {
    /// `RTAComplete.txt` or `RTAComplete.xml`.
    #[default]
    Classic,
    /// `CopyComplete.txt` (NovaSeq-style instruments).
    CopyComplete,
}

impl CompletionStyle {
    pub fn from_novaseq(novaseq: bool) -> Self {
        if novaseq {
            Self::CopyComplete
        } else {
            Self::Classic
        }
    }

    pub fn markers(&self) -> &'static [&'static str] {
        match self {
            CompletionStyle::Classic => &["RTAComplete.txt", "RTAComplete.xml"],
            CompletionStyle::CopyComplete => &["CopyComplete.txt"],
        }
    }

    /// True once any marker of this style exists as a file in `run_dir`.
    pub fn is_complete(&self, run_dir: &Path) -> bool {
        self.markers().iter().any(|m| run_dir.join(m).is_file())
    }
}

// ---------------------------------------------------------------------------
// Sentinel state and downstream targets
// ---------------------------------------------------------------------------

/// Remote state of a sentinel record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentinelState {
    Open,
    Closed,
}

impl fmt::Display for SentinelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentinelState::Open => write!(f, "open"),
            SentinelState::Closed => write!(f, "closed"),
        }
    }
}

/// Executable chained after a lane closes. Applet and workflow are exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DownstreamTarget {
    #[default]
    None,
    Applet(String),
    Workflow(String),
}

impl DownstreamTarget {
    pub fn from_options(applet: Option<String>, workflow: Option<String>) -> Option<Self> {
        match (applet, workflow) {
            (None, None) => Some(Self::None),
            (Some(id), None) => Some(Self::Applet(id)),
            (None, Some(id)) => Some(Self::Workflow(id)),
            (Some(_), Some(_)) => None,
        }
    }

    pub fn executable_id(&self) -> Option<&str> {
        match self {
            DownstreamTarget::None => None,
            DownstreamTarget::Applet(id) | DownstreamTarget::Workflow(id) => Some(id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DownstreamTarget::None => "none",
            DownstreamTarget::Applet(_) => "applet",
            DownstreamTarget::Workflow(_) => "workflow",
        }
    }

    /// Input key that always receives the sentinel record link.
    pub fn reserved_input_key(&self) -> Option<&'static str> {
        match self {
            DownstreamTarget::None => None,
            DownstreamTarget::Applet(_) => Some("upload_sentinel_record"),
            DownstreamTarget::Workflow(_) => Some("0.upload_sentinel_record"),
        }
    }

    /// Base output folder for jobs of this target.
    pub fn output_folder(&self, run_id: &RunId) -> Option<String> {
        match self {
            DownstreamTarget::None => None,
            DownstreamTarget::Applet(_) => Some(run_folder(run_id, "reads")),
            DownstreamTarget::Workflow(_) => Some(run_folder(run_id, "analyses")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
