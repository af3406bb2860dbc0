//! Downstream Dispatcher: one chained job per lane whose sentinel is closed.

use serde::Serialize;
use serde_json::{Map, Value};

use runstream_core::types::target_folder;
use runstream_core::{DownstreamTarget, Lane, LaneLabel, RunId};
use runstream_platform::{sentinel_link, JobRequest, StoragePlatform};

use crate::error::FatalError;
use crate::fatal::Reporter;

/// A submitted downstream job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchedJob {
    #[serde(serialize_with = "label_str")]
    pub lane: LaneLabel,
    pub job_id: String,
    pub folder: String,
}

fn label_str<S: serde::Serializer>(label: &LaneLabel, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(label)
}

pub struct Dispatcher<'a> {
    pub project: &'a str,
    pub run_id: &'a RunId,
    pub target: &'a DownstreamTarget,
    /// Display title of the executable, resolved during preflight.
    pub title: &'a str,
    pub input: &'a Map<String, Value>,
    pub platform: &'a dyn StoragePlatform,
    pub reporter: &'a Reporter<'a>,
}

impl<'a> Dispatcher<'a> {
    /// Launch jobs for every lane whose sentinel is now closed, including
    /// lanes found closed at startup. Lanes with conflicting samplesheets are
    /// skipped. Folder creation or submission
    /// failure is fatal.
    pub fn dispatch(&self, lanes: &[Lane]) -> Result<Vec<DispatchedJob>, FatalError> {
        let (Some(executable), Some(key), Some(base)) = (
            self.target.executable_id(),
            self.target.reserved_input_key(),
            self.target.output_folder(self.run_id),
        ) else {
            return Ok(Vec::new());
        };
        tracing::info!(
            kind = self.target.kind(),
            executable,
            "initiating downstream analysis"
        );

        let mut jobs = Vec::new();
        for lane in lanes.iter().filter(|l| l.uploaded) {
            let Some(record) = &lane.sentinel else {
                continue;
            };
            if lane.halt_downstream {
                tracing::warn!(lane = %lane.label, "samplesheet conflict, not starting downstream job");
                continue;
            }

            let folder = target_folder(&base, lane.label);
            tracing::info!(lane = %lane.label, folder = %folder, "creating output folder");
            self.platform
                .create_folder(self.project, &folder)
                .map_err(|err| self.fatal(format!("Failed to create new folder {folder}. {err}")))?;

            let request = JobRequest {
                target: self.target.clone(),
                project: self.project.to_string(),
                folder: folder.clone(),
                name: format!("{}-{}", self.title, self.run_id),
                input: job_input(self.input, key, record),
            };
            let job_id = self.platform.run_chained_job(&request).map_err(|err| {
                self.fatal(format!(
                    "Failed to launch {} {executable} for lane {}. {err}",
                    self.target.kind(),
                    lane.label
                ))
            })?;
            tracing::info!(lane = %lane.label, job = %job_id, executable, "initiated downstream job");
            jobs.push(DispatchedJob {
                lane: lane.label,
                job_id,
                folder,
            });
        }
        Ok(jobs)
    }

    fn fatal(&self, message: String) -> FatalError {
        self.reporter.fatal(&self.run_id.0, message, true)
    }
}

/// Caller input with `key` set to the sentinel link, replacing any value the
/// caller supplied under the same key.
pub fn job_input(
    base: &Map<String, Value>,
    key: &str,
    record: &runstream_core::RecordId,
) -> Map<String, Value> {
    let mut input = base.clone();
    input.insert(key.to_string(), sentinel_link(record));
    input
}
