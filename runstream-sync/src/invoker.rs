//! Sync Invoker: one logical synchronization of a lane, retried.

use runstream_core::{Clock, FileId, Lane};

use crate::error::SyncError;
use crate::retry::RetryPolicy;
use crate::synchronizer::Synchronizer;

pub struct SyncInvoker<'a> {
    synchronizer: &'a dyn Synchronizer,
    clock: &'a dyn Clock,
    policy: RetryPolicy,
}

impl<'a> SyncInvoker<'a> {
    pub fn new(synchronizer: &'a dyn Synchronizer, clock: &'a dyn Clock, policy: RetryPolicy) -> Self {
        Self {
            synchronizer,
            clock,
            policy,
        }
    }

    /// Synchronize `lane`, retrying failed attempts with a fixed backoff.
    ///
    /// Returns [`SyncError::Exhausted`] once every attempt has failed; callers
    /// treat that as fatal for the run.
    pub fn invoke(&self, lane: &Lane, finish: bool) -> Result<Vec<FileId>, SyncError> {
        let what = format!("sync lane {}", lane.label);
        self.policy
            .run(self.clock, &what, |attempt| {
                tracing::debug!(lane = %lane.label, attempt, attempts = self.policy.attempts, finish, "sync attempt");
                self.synchronizer.sync(lane, finish)
            })
            .map_err(|exhausted| SyncError::Exhausted {
                attempts: exhausted.attempts,
                last: Box::new(exhausted.last),
            })
    }
}
