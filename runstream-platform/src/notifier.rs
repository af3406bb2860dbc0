//! Notification capability and its Slack implementation.
//!
//! Two channels: `Log` for milestones (start, success) and `Alert` for
//! anything that needs a human. Callers treat every send as best-effort.

use std::time::Duration;

use serde_json::Value;

use crate::error::PlatformError;

const SLACK_POST_MESSAGE: &str = "https://slack.com/api/chat.postMessage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Log,
    Alert,
}

pub trait Notifier {
    /// Deliver `message` about `run` (a run id, or the sequencer id before
    /// the run is known) to `channel`.
    fn send(&self, channel: Channel, run: &str, message: &str) -> Result<(), PlatformError>;
}

/// Slack credentials and channel names, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct SlackSettings {
    pub token: Option<String>,
    pub log_channel: Option<String>,
    pub alert_channel: Option<String>,
}

impl SlackSettings {
    /// `SLACK_TOKEN`, `SLACK_LOG_CHANNEL`, `SLACK_ALERT_CHANNEL`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            token: var("SLACK_TOKEN"),
            log_channel: var("SLACK_LOG_CHANNEL"),
            alert_channel: var("SLACK_ALERT_CHANNEL"),
        }
    }
}

pub struct SlackNotifier {
    agent: ureq::Agent,
    settings: SlackSettings,
    sequencer_id: String,
    endpoint: String,
}

impl SlackNotifier {
    pub fn new(settings: SlackSettings, sequencer_id: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            agent,
            settings,
            sequencer_id: sequencer_id.into(),
            endpoint: SLACK_POST_MESSAGE.to_string(),
        }
    }

    fn channel_name(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Log => self.settings.log_channel.as_deref(),
            Channel::Alert => self.settings.alert_channel.as_deref(),
        }
    }
}

impl Notifier for SlackNotifier {
    fn send(&self, channel: Channel, run: &str, message: &str) -> Result<(), PlatformError> {
        let text = format_message(channel, run, &self.sequencer_id, message);
        let (Some(token), Some(channel_name)) =
            (self.settings.token.as_deref(), self.channel_name(channel))
        else {
            tracing::warn!(?channel, "Slack not configured; message not sent:\n{text}");
            return Ok(());
        };

        tracing::info!(channel = channel_name, "sending Slack message");
        let target = format!("#{}", channel_name.trim_start_matches('#'));
        let response = self.agent.post(&self.endpoint).send_form(&[
            ("token", token),
            ("channel", target.as_str()),
            ("text", text.as_str()),
        ]);
        let body: Value = match response {
            Ok(resp) => resp.into_json().map_err(|e| PlatformError::Transport {
                route: "chat.postMessage".to_string(),
                message: e.to_string(),
            })?,
            Err(ureq::Error::Status(status, resp)) => {
                return Err(PlatformError::Api {
                    status,
                    kind: "SlackHTTPError".to_string(),
                    message: resp.into_string().unwrap_or_default(),
                });
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(PlatformError::Transport {
                    route: "chat.postMessage".to_string(),
                    message: t.to_string(),
                });
            }
        };
        check_slack_response(&body)
    }
}

/// Alerts get a warning header naming the run (and sequencer, when set);
/// log-channel messages are sent as-is.
pub fn format_message(channel: Channel, run: &str, sequencer_id: &str, message: &str) -> String {
    match channel {
        Channel::Log => message.to_string(),
        Channel::Alert => {
            let sequencer = if sequencer_id.trim().is_empty() {
                String::new()
            } else {
                format!("Sequencer: *{sequencer_id}*\n")
            };
            format!(":warning: *Error in runstream*\n\nRun: *{run}*\n{sequencer}\nError: {message}")
        }
    }
}

fn check_slack_response(body: &Value) -> Result<(), PlatformError> {
    if body["ok"].as_bool() == Some(true) {
        return Ok(());
    }
    Err(PlatformError::Api {
        status: 200,
        kind: "SlackError".to_string(),
        message: body["error"].as_str().unwrap_or("unknown").to_string(),
    })
}
