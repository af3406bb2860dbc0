//! Storage platform capability.
//!
//! Everything the orchestrator persists remotely goes through
//! [`StoragePlatform`]: sentinel records (the durable "lane done" signal),
//! single-file uploads, property tagging, folders, and chained jobs.
//! Calls are synchronous and blocking.

use std::path::Path;

use serde_json::{json, Map, Value};

use runstream_core::{DownstreamTarget, FileId, Properties, RecordId, SentinelState};

use crate::error::PlatformError;

/// A sentinel record as seen by a lookup or a create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelHandle {
    pub id: RecordId,
    pub state: SentinelState,
    pub properties: Properties,
}

/// A chained job submission.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub target: DownstreamTarget,
    pub project: String,
    pub folder: String,
    pub name: String,
    pub input: Map<String, Value>,
}

pub trait StoragePlatform {
    /// Resolve a project; fails for bad credentials or inaccessible projects.
    fn describe_project(&self, project: &str) -> Result<(), PlatformError>;

    /// Resolve an applet or workflow and return its display title.
    fn executable_title(&self, executable_id: &str) -> Result<String, PlatformError>;

    /// Unique lookup of a sentinel record by name in `project:folder`.
    /// Zero matches is `Ok(None)`.
    fn find_sentinel(
        &self,
        project: &str,
        folder: &str,
        name: &str,
    ) -> Result<Option<SentinelHandle>, PlatformError>;

    /// Create an open sentinel record, creating parent folders as needed.
    fn create_sentinel(
        &self,
        project: &str,
        folder: &str,
        name: &str,
        properties: &Properties,
    ) -> Result<SentinelHandle, PlatformError>;

    /// Look up an existing file object by name in `project:folder`.
    fn find_file(
        &self,
        project: &str,
        folder: &str,
        name: &str,
    ) -> Result<Option<FileId>, PlatformError>;

    /// Upload one local file (named after its file name) and tag it.
    fn upload_file(
        &self,
        project: &str,
        folder: &str,
        local: &Path,
        properties: &Properties,
    ) -> Result<FileId, PlatformError>;

    fn set_file_properties(
        &self,
        project: &str,
        file: &FileId,
        properties: &Properties,
    ) -> Result<(), PlatformError>;

    fn set_sentinel_details(&self, record: &RecordId, details: &Value)
        -> Result<(), PlatformError>;

    /// Close (finalize) a sentinel record. Irreversible.
    fn close_sentinel(&self, record: &RecordId) -> Result<(), PlatformError>;

    /// Create `folder` and its parents; an existing folder is not an error.
    fn create_folder(&self, project: &str, folder: &str) -> Result<(), PlatformError>;

    /// Launch an applet or workflow and return the job/analysis id.
    fn run_chained_job(&self, request: &JobRequest) -> Result<String, PlatformError>;
}

/// Platform link to a sentinel record, as passed in job inputs.
pub fn sentinel_link(record: &RecordId) -> Value {
    json!({ "$dnanexus_link": record.0 })
}
