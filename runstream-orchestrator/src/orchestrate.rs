//! Top-level upload flow for one run directory.
//!
//! ```text
//! preflight → RunInfo → start notice → prepare lanes → watch → finalize
//!           → cycle check → success notice → dispatch → post-success script
//! ```

use std::process::{Command, Stdio};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use runstream_core::cycles::{check_cycles, CycleReport};
use runstream_core::{notify_state, Clock, CoreError, Lane, RunId, RunInfo};
use runstream_platform::{Notifier, StoragePlatform};
use runstream_sync::{RetryPolicy, SyncInvoker, Synchronizer};

use crate::config::UploadConfig;
use crate::dispatch::{DispatchedJob, Dispatcher};
use crate::error::FatalError;
use crate::fatal::Reporter;
use crate::preflight;
use crate::sentinel::SentinelManager;
use crate::usage::{dir_size, format_gb, format_upload_time, format_usage, DiskUsage};
use crate::watcher::{WatchPhase, WatchReport, Watcher};

/// Final state of every lane plus what happened after upload.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub lanes: Vec<Lane>,
    pub watch: Option<WatchReport>,
    pub cycles: Option<CycleReport>,
    pub jobs: Vec<DispatchedJob>,
    /// Why downstream jobs were not launched, when they were configured.
    pub downstream_skipped: Option<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// Every lane's sentinel was already closed at startup.
    AlreadyUploaded(RunReport),
    Streamed(RunReport),
}

impl Outcome {
    pub fn report(&self) -> &RunReport {
        match self {
            Outcome::AlreadyUploaded(report) | Outcome::Streamed(report) => report,
        }
    }
}

/// Summary row per lane, for tables and JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneSummary {
    pub lane: String,
    pub state: &'static str,
    pub archives: usize,
    pub sentinel: Option<String>,
}

impl RunReport {
    pub fn lane_summaries(&self) -> Vec<LaneSummary> {
        self.lanes
            .iter()
            .map(|lane| LaneSummary {
                lane: lane.label.to_string(),
                state: match (lane.uploaded, lane.closed_this_run) {
                    (true, true) => "closed",
                    (true, false) => "already uploaded",
                    (false, _) => "open",
                },
                archives: lane.artifacts.tar_file_ids.len(),
                sentinel: lane.sentinel.as_ref().map(|r| r.to_string()),
            })
            .collect()
    }
}

pub struct Orchestrator<'a> {
    pub config: &'a UploadConfig,
    pub platform: &'a dyn StoragePlatform,
    pub synchronizer: &'a dyn Synchronizer,
    pub notifier: &'a dyn Notifier,
    pub clock: &'a dyn Clock,
}

impl<'a> Orchestrator<'a> {
    pub fn run(&self) -> Result<Outcome, FatalError> {
        let started = self.clock.now();
        let reporter = Reporter::new(self.notifier);
        let config = self.config;
        let run_dir = config.run_dir();

        let preflight = preflight::validate(config, self.platform, self.synchronizer, &reporter)?;
        let run_info = self.load_run_info(&reporter)?;
        let run_id = run_info.run_id.clone();
        tracing::info!(run_id = %run_id, run_dir = %run_dir.display(), "starting upload");

        self.announce_start(&reporter, &run_id);

        let manager = SentinelManager::new(config, &run_id, self.platform, self.clock, &reporter);
        let mut lanes = Lane::plan(&run_id, config.lanes, &config.log_dir);
        for lane in &mut lanes {
            manager.prepare(lane)?;
        }

        if lanes.iter().all(|l| l.uploaded) {
            tracing::warn!(run_id = %run_id, "EXITING: All lanes already uploaded");
            return Ok(Outcome::AlreadyUploaded(RunReport {
                run_id,
                lanes,
                watch: None,
                cycles: None,
                jobs: Vec::new(),
                downstream_skipped: None,
                elapsed: self.clock.now().saturating_duration_since(started),
            }));
        }

        let invoker = SyncInvoker::new(
            self.synchronizer,
            self.clock,
            RetryPolicy::fixed(config.retries),
        );
        let watcher = Watcher {
            run_dir,
            run_id: &run_id,
            completion: config.completion,
            sync_interval: config.sync_interval,
            budget: config.wait_budget(),
            clock: self.clock,
            reporter: &reporter,
        };
        let watch = watcher.watch(&mut lanes, &invoker)?;

        for lane in lanes.iter_mut().filter(|l| !l.uploaded) {
            manager.finalize(lane, &invoker)?;
        }
        tracing::info!(run_id = %run_id, phase = %WatchPhase::Done, "run successfully streamed");

        let cycles = self.check_cycles(&reporter, &run_id, &run_info);
        let cycles_ok = cycles.as_ref().map(CycleReport::is_complete).unwrap_or(false);

        let elapsed = self.clock.now().saturating_duration_since(started);
        reporter.log(
            &run_id.0,
            &format!(
                ":white_check_mark: runstream: run successfully uploaded *{run_id}*\n\
                 \t\t\tTotal upload time: {}\n\
                 \t\t\tTotal size of run: {}GB\n\
                 \t\t\tDisk usage after upload: {}",
                format_upload_time(elapsed),
                format_gb(dir_size(run_dir)),
                format_usage(DiskUsage::of(run_dir)),
            ),
        );

        let mut jobs = Vec::new();
        let mut downstream_skipped = None;
        if let Some(title) = preflight.executable_title.as_deref() {
            if cycles_ok {
                let dispatcher = Dispatcher {
                    project: config.project(),
                    run_id: &run_id,
                    target: &config.downstream,
                    title,
                    input: &config.downstream_input,
                    platform: self.platform,
                    reporter: &reporter,
                };
                jobs = dispatcher.dispatch(&lanes)?;
                if lanes.iter().any(|l| l.uploaded && l.halt_downstream) {
                    downstream_skipped = Some("conflicting samplesheets".to_string());
                }
            } else {
                downstream_skipped = Some("incomplete sequencing cycles".to_string());
            }
        }

        self.run_script(&reporter, &run_id);

        Ok(Outcome::Streamed(RunReport {
            run_id,
            lanes,
            watch: Some(watch),
            cycles,
            jobs,
            downstream_skipped,
            elapsed: self.clock.now().saturating_duration_since(started),
        }))
    }

    fn load_run_info(&self, reporter: &Reporter<'_>) -> Result<RunInfo, FatalError> {
        RunInfo::load(self.config.run_dir()).map_err(|err| {
            let label = match &err {
                CoreError::RunInfoMissing { .. } => self.config.fallback_label(),
                _ => self
                    .config
                    .run_dir()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            reporter.fatal(&label, err.to_string(), true)
        })
    }

    /// Start notice, at most once per run directory per sequencer.
    fn announce_start(&self, reporter: &Reporter<'_>, run_id: &RunId) {
        let config = self.config;
        let mut state = match notify_state::load_at(&config.state_dir, &config.sequencer_id) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "could not read notification state, starting fresh");
                Default::default()
            }
        };
        if state.is_notified(config.run_dir()) {
            tracing::info!(run_id = %run_id, "start notification already sent");
            return;
        }

        state.mark_notified(config.run_dir(), Utc::now());
        if let Err(err) = notify_state::save_at(&config.state_dir, &config.sequencer_id, &state) {
            tracing::warn!(error = %err, "could not record start notification");
        }
        reporter.log(
            &run_id.0,
            &format!(
                ":arrow_up: runstream: starting upload of run *{run_id}*\n\
                 \t\tDisk usage before upload: {}",
                format_usage(DiskUsage::of(config.run_dir()))
            ),
        );
    }

    /// Non-fatal. A mismatch or an unreadable cycle tree is alerted and
    /// blocks dispatch.
    fn check_cycles(
        &self,
        reporter: &Reporter<'_>,
        run_id: &RunId,
        run_info: &RunInfo,
    ) -> Option<CycleReport> {
        match check_cycles(self.config.run_dir(), run_info.expected_cycles()) {
            Ok(report) if report.is_complete() => {
                tracing::info!(run_id = %run_id, expected = report.expected, "all cycles present");
                Some(report)
            }
            Ok(report) => {
                reporter.alert(
                    &run_id.0,
                    &format!(
                        "Incomplete cycles for uploaded run: *{run_id}*.\n\
                         Stopping and not running any downstream analysis.\n{}",
                        report.describe_mismatch()
                    ),
                );
                Some(report)
            }
            Err(err) => {
                reporter.alert(
                    &run_id.0,
                    &format!("Could not check sequencing cycles for *{run_id}*: {err}"),
                );
                None
            }
        }
    }

    /// Best-effort: failures are alerted, never fatal.
    fn run_script(&self, reporter: &Reporter<'_>, run_id: &RunId) {
        let Some(script) = &self.config.script else {
            return;
        };
        tracing::info!(script = %script.display(), "running post-success script");
        let status = Command::new(script)
            .arg(self.config.run_dir())
            .stdin(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => reporter.alert(
                &run_id.0,
                &format!("Executable ({}) failed with {status}", script.display()),
            ),
            Err(err) => reporter.alert(
                &run_id.0,
                &format!("Executable ({}) could not be started: {err}", script.display()),
            ),
        }
    }
}
