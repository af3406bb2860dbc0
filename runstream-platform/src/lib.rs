//! # runstream-platform
//!
//! Capabilities the orchestrator talks to over the network, each behind a
//! trait so the state machine can run against in-memory fakes:
//!
//! - [`StoragePlatform`]: sentinel records, file uploads, folders, jobs;
//!   implemented for the DNAnexus API by [`DxPlatform`]
//! - [`Notifier`]: status and alert messages; implemented for Slack by
//!   [`SlackNotifier`]

pub mod dx;
pub mod error;
pub mod notifier;
pub mod storage;

pub use dx::DxPlatform;
pub use error::PlatformError;
pub use notifier::{Channel, Notifier, SlackNotifier, SlackSettings};
pub use storage::{sentinel_link, JobRequest, SentinelHandle, StoragePlatform};
