//! Run Completion Watcher.
//!
//! Polls every lane that is not yet uploaded until the instrument writes a
//! termination marker, pacing iterations to the sync interval. Exceeding the
//! wait budget is fatal.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use runstream_core::{Clock, CompletionStyle, FileId, Lane, RunId};
use runstream_sync::SyncInvoker;

use crate::error::FatalError;
use crate::fatal::Reporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Waiting,
    Syncing,
    Finalizing,
    Done,
    TimedOut,
}

impl fmt::Display for WatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatchPhase::Waiting => "waiting",
            WatchPhase::Syncing => "syncing",
            WatchPhase::Finalizing => "finalizing",
            WatchPhase::Done => "done",
            WatchPhase::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// What the polling loop did before the termination marker appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchReport {
    pub iterations: u32,
    pub elapsed: Duration,
}

pub struct Watcher<'a> {
    pub run_dir: &'a Path,
    pub run_id: &'a RunId,
    pub completion: CompletionStyle,
    pub sync_interval: Duration,
    pub budget: Duration,
    pub clock: &'a dyn Clock,
    pub reporter: &'a Reporter<'a>,
}

impl<'a> Watcher<'a> {
    /// Run non-finish syncs over `lanes` until a termination marker exists.
    /// Tar ids produced along the way are appended to each lane's artifacts.
    pub fn watch(&self, lanes: &mut [Lane], invoker: &SyncInvoker<'_>) -> Result<WatchReport, FatalError> {
        let started = self.clock.now();
        let mut phase = WatchPhase::Waiting;
        let mut iterations = 0u32;
        tracing::info!(
            run_id = %self.run_id,
            budget_secs = self.budget.as_secs(),
            "maximum allowable time for run to complete"
        );

        loop {
            if self.completion.is_complete(self.run_dir) {
                break;
            }

            let iteration_start = self.clock.now();
            let elapsed = iteration_start.saturating_duration_since(started);
            if elapsed > self.budget {
                transition(&mut phase, WatchPhase::TimedOut);
                return Err(self.reporter.fatal(
                    &self.run_id.0,
                    format!(
                        "EXITING: Upload failed. Run did not complete after {} seconds (max wait = {}s)",
                        elapsed.as_secs(),
                        self.budget.as_secs()
                    ),
                    true,
                ));
            }

            transition(&mut phase, WatchPhase::Syncing);
            for lane in lanes.iter_mut().filter(|l| !l.uploaded) {
                let ids = sync_lane(invoker, self.reporter, self.run_id, lane, false)?;
                lane.artifacts.tar_file_ids.extend(ids);
            }
            iterations += 1;

            let spent = self.clock.now().saturating_duration_since(iteration_start);
            if let Some(remaining) = self.sync_interval.checked_sub(spent) {
                if !remaining.is_zero() {
                    tracing::info!(secs = remaining.as_secs(), "sleeping until next sync");
                    transition(&mut phase, WatchPhase::Waiting);
                    self.clock.sleep(remaining);
                }
            }
        }

        transition(&mut phase, WatchPhase::Finalizing);
        Ok(WatchReport {
            iterations,
            elapsed: self.clock.now().saturating_duration_since(started),
        })
    }
}

fn transition(phase: &mut WatchPhase, next: WatchPhase) {
    if *phase != next {
        tracing::debug!(from = %phase, to = %next, "watcher phase");
        *phase = next;
    }
}

/// One retried sync of `lane`; exhaustion is fatal for the run.
pub(crate) fn sync_lane(
    invoker: &SyncInvoker<'_>,
    reporter: &Reporter<'_>,
    run_id: &RunId,
    lane: &Lane,
    finish: bool,
) -> Result<Vec<FileId>, FatalError> {
    invoker.invoke(lane, finish).map_err(|err| {
        reporter.fatal(
            &run_id.0,
            format!("Failed to sync lane {} of run {run_id}: {err}", lane.label),
            true,
        )
    })
}
