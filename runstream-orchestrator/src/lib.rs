//! # runstream-orchestrator
//!
//! The run synchronization state machine. One [`Orchestrator::run`] call
//! streams one run directory:
//!
//! - [`preflight`]: eager configuration checks
//! - [`sentinel`]: per-lane sentinel lookup, creation and closing
//! - [`watcher`]: polling loop until the run's termination marker appears
//! - [`dispatch`]: chained downstream jobs
//! - [`fatal`]: notification gateway and the fatal-error primitive
//! - [`lock`]: per-sequencer process lock

pub mod config;
pub mod dispatch;
mod error;
pub mod fatal;
pub mod lock;
mod logging;
pub mod orchestrate;
pub mod preflight;
pub mod sentinel;
pub mod usage;
pub mod watcher;

pub use config::{parse_downstream_input, UploadConfig};
pub use dispatch::DispatchedJob;
pub use error::{FatalError, OrchestratorError};
pub use fatal::Reporter;
pub use lock::RunLock;
pub use logging::init_tracing;
pub use orchestrate::{LaneSummary, Orchestrator, Outcome, RunReport};
