//! Sentinel Lifecycle Manager.
//!
//! A lane's sentinel record is the remote source of truth for "this lane is
//! fully uploaded". At startup the record is looked up and either skipped
//! (closed), adopted (open) or created. At finalization the lane's metadata
//! is attached to it and it is closed, which cannot be undone.

use std::path::Path;

use serde::Serialize;

use runstream_core::run_info::RUN_INFO_FILE;
use runstream_core::{samplesheet, Clock, FileId, Lane, RecordId, RunId, SentinelState};
use runstream_platform::StoragePlatform;
use runstream_sync::{RetryPolicy, SyncInvoker};

use crate::config::UploadConfig;
use crate::error::FatalError;
use crate::fatal::Reporter;
use crate::watcher::sync_lane;

/// Details payload set on a sentinel record just before it is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentinelDetails {
    pub run_id: String,
    pub lanes: String,
    pub upload_thumbnails: String,
    pub dnanexus_path: String,
    pub tar_file_ids: Vec<FileId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file_id: Option<FileId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runinfo_file_id: Option<FileId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samplesheet_file_id: Option<FileId>,
}

impl SentinelDetails {
    pub fn for_lane(run_id: &RunId, lane: &Lane, project: &str, upload_thumbnails: bool) -> Self {
        Self {
            run_id: run_id.to_string(),
            lanes: lane.label.to_string(),
            upload_thumbnails: upload_thumbnails.to_string(),
            dnanexus_path: format!("{project}:{}", lane.remote_folder),
            tar_file_ids: lane.artifacts.tar_file_ids.clone(),
            log_file_id: lane.artifacts.log_file_id.clone(),
            runinfo_file_id: lane.artifacts.runinfo_file_id.clone(),
            samplesheet_file_id: lane.artifacts.samplesheet_file_id.clone(),
        }
    }
}

pub struct SentinelManager<'a> {
    config: &'a UploadConfig,
    run_id: &'a RunId,
    platform: &'a dyn StoragePlatform,
    clock: &'a dyn Clock,
    reporter: &'a Reporter<'a>,
}

impl<'a> SentinelManager<'a> {
    pub fn new(
        config: &'a UploadConfig,
        run_id: &'a RunId,
        platform: &'a dyn StoragePlatform,
        clock: &'a dyn Clock,
        reporter: &'a Reporter<'a>,
    ) -> Self {
        Self {
            config,
            run_id,
            platform,
            clock,
            reporter,
        }
    }

    // -----------------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------------

    /// Resolve the lane's sentinel, reconcile samplesheets and upload the run
    /// metadata files. A lane whose sentinel is already closed is marked
    /// uploaded; it is only reconciled, so dispatch can still honour a
    /// samplesheet conflict.
    pub fn prepare(&self, lane: &mut Lane) -> Result<(), FatalError> {
        let project = self.config.project();
        let found = self.with_retry(
            &format!("find sentinel {}", lane.record_name),
            |platform| platform.find_sentinel(project, &lane.remote_folder, &lane.record_name),
            |err| {
                format!(
                    "Encountered an error looking for {} at {}:{}. {err}",
                    lane.record_name, project, lane.remote_folder
                )
            },
        )?;

        let handle = match found {
            Some(handle) if handle.state == SentinelState::Closed => {
                tracing::info!(run_id = %self.run_id, lane = %lane.label, "lane has already been uploaded");
                lane.sentinel = Some(handle.id);
                lane.properties = handle.properties;
                lane.uploaded = true;
                return self.reconcile_samplesheet(lane);
            }
            Some(handle) => {
                tracing::info!(run_id = %self.run_id, lane = %lane.label, record = %handle.id, "adopting open sentinel");
                handle
            }
            None => {
                let properties = lane.initial_properties(self.run_id);
                let handle = self
                    .platform
                    .create_sentinel(project, &lane.remote_folder, &lane.record_name, &properties)
                    .map_err(|err| {
                        self.fatal(format!(
                            "Failed to create sentinel record {} at {}:{}. {err}",
                            lane.record_name, project, lane.remote_folder
                        ))
                    })?;
                tracing::info!(run_id = %self.run_id, lane = %lane.label, record = %handle.id, "created sentinel");
                handle
            }
        };
        lane.sentinel = Some(handle.id);
        lane.properties = handle.properties;

        self.reconcile_samplesheet(lane)?;

        let run_info = self.config.run_dir().join(RUN_INFO_FILE);
        lane.artifacts.runinfo_file_id = self.upload_if_absent(lane, &run_info);

        if !self.config.sync.samplesheet_delay {
            if let Some(name) = lane.samplesheet.clone() {
                let path = self.config.run_dir().join(name);
                lane.artifacts.samplesheet_file_id = self.upload_if_absent(lane, &path);
            }
        }
        Ok(())
    }

    fn reconcile_samplesheet(&self, lane: &mut Lane) -> Result<(), FatalError> {
        let result = samplesheet::reconcile(self.config.run_dir())
            .map_err(|err| self.fatal(format!("Failed to look for samplesheets: {err}")))?;
        tracing::info!(lane = %lane.label, candidates = ?result.candidates, "samplesheet reconciliation");
        if let Some(diff) = &result.conflict_diff {
            tracing::warn!(lane = %lane.label, "samplesheet contents differ:\n{diff}");
        }
        if let Some(alert) = &result.alert {
            self.reporter.alert(&self.run_id.0, alert);
        }
        lane.samplesheet = result.selected;
        lane.halt_downstream = result.halt_downstream;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Finalization
    // -----------------------------------------------------------------------

    /// Terminal sync, metadata uploads, details, close.
    pub fn finalize(&self, lane: &mut Lane, invoker: &SyncInvoker<'_>) -> Result<(), FatalError> {
        let Some(record) = lane.sentinel.clone() else {
            return Err(self.fatal(format!("Lane {} has no sentinel record", lane.label)));
        };
        let project = self.config.project();

        let ids = sync_lane(invoker, self.reporter, self.run_id, lane, true)?;
        lane.artifacts.tar_file_ids.extend(ids);

        lane.artifacts.log_file_id = self.upload(lane, &lane.log_path);

        for file in &lane.artifacts.tar_file_ids {
            if let Err(err) = self.platform.set_file_properties(project, file, &lane.properties) {
                tracing::warn!(lane = %lane.label, file = %file, error = %err, "failed to tag archive");
            }
        }

        if self.config.sync.samplesheet_delay {
            if let Some(name) = lane.samplesheet.clone() {
                let path = self.config.run_dir().join(name);
                lane.artifacts.samplesheet_file_id = self.upload_if_absent(lane, &path);
            }
        }

        let details = SentinelDetails::for_lane(
            self.run_id,
            lane,
            project,
            self.config.sync.upload_thumbnails,
        );
        let details = serde_json::to_value(&details)
            .map_err(|err| self.fatal(format!("Failed to encode sentinel details: {err}")))?;
        self.with_retry(
            &format!("set details on {record}"),
            |platform| platform.set_sentinel_details(&record, &details),
            |err| format!("Failed to set details on sentinel {record}. {err}"),
        )?;
        self.close(&record)?;

        lane.uploaded = true;
        lane.closed_this_run = true;
        tracing::info!(
            run_id = %self.run_id,
            lane = %lane.label,
            archives = lane.artifacts.tar_file_ids.len(),
            "lane closed"
        );
        Ok(())
    }

    fn close(&self, record: &RecordId) -> Result<(), FatalError> {
        self.with_retry(
            &format!("close {record}"),
            |platform| platform.close_sentinel(record),
            |err| format!("Failed to close sentinel {record}. {err}"),
        )
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Reuse a remote file of the same name in the lane folder, else upload.
    /// Failures are logged and yield `None`.
    fn upload_if_absent(&self, lane: &Lane, local: &Path) -> Option<FileId> {
        let name = local.file_name()?.to_string_lossy().into_owned();
        match self
            .platform
            .find_file(self.config.project(), &lane.remote_folder, &name)
        {
            Ok(Some(existing)) => {
                tracing::debug!(lane = %lane.label, file = %name, id = %existing, "already uploaded");
                Some(existing)
            }
            Ok(None) => self.upload(lane, local),
            Err(err) => {
                tracing::warn!(lane = %lane.label, file = %name, error = %err, "lookup failed, not uploading");
                None
            }
        }
    }

    fn upload(&self, lane: &Lane, local: &Path) -> Option<FileId> {
        if !local.is_file() {
            tracing::warn!(lane = %lane.label, path = %local.display(), "file not found, skipping upload");
            return None;
        }
        match self.platform.upload_file(
            self.config.project(),
            &lane.remote_folder,
            local,
            &lane.properties,
        ) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(lane = %lane.label, path = %local.display(), error = %err, "upload failed");
                None
            }
        }
    }

    fn with_retry<T, F, M>(&self, what: &str, mut op: F, message: M) -> Result<T, FatalError>
    where
        F: FnMut(&dyn StoragePlatform) -> Result<T, runstream_platform::PlatformError>,
        M: FnOnce(&runstream_platform::PlatformError) -> String,
    {
        RetryPolicy::fixed(self.config.retries)
            .run(self.clock, what, |_| op(self.platform))
            .map_err(|exhausted| self.fatal(message(&exhausted.last)))
    }

    fn fatal(&self, message: String) -> FatalError {
        self.reporter.fatal(&self.run_id.0, message, true)
    }
}
