//! Notification gateway and the single "raise and exit" primitive.
//!
//! Every send is best-effort: a failed send is logged at `warn` and
//! otherwise ignored, so a broken notifier can never mask the error being
//! reported.

use runstream_platform::{Channel, Notifier};

use crate::error::FatalError;

pub struct Reporter<'a> {
    notifier: &'a dyn Notifier,
}

impl<'a> Reporter<'a> {
    pub fn new(notifier: &'a dyn Notifier) -> Self {
        Self { notifier }
    }

    /// Milestone message on the log channel.
    pub fn log(&self, run: &str, message: &str) {
        tracing::info!(run_id = run, "{message}");
        self.send(Channel::Log, run, message);
    }

    /// Non-fatal problem on the alert channel.
    pub fn alert(&self, run: &str, message: &str) {
        tracing::warn!(run_id = run, "{message}");
        self.send(Channel::Alert, run, message);
    }

    /// Log `message` as an error, alert when `send` is set, and return the
    /// value the caller propagates to end the run.
    pub fn fatal(&self, run: &str, message: impl Into<String>, send: bool) -> FatalError {
        let message = message.into();
        tracing::error!(run_id = run, "{message}");
        if send {
            self.send(Channel::Alert, run, &message);
        }
        FatalError {
            message,
            run_label: run.to_string(),
        }
    }

    fn send(&self, channel: Channel, run: &str, message: &str) {
        if let Err(err) = self.notifier.send(channel, run, message) {
            tracing::warn!(?channel, error = %err, "failed to send notification");
        }
    }
}
