//! runstream core library: run and lane domain types, run metadata, and the
//! local-disk checks the orchestrator runs before and after upload.
//!
//! - [`types`]: newtypes, lanes, completion styles, downstream targets
//! - [`error`]: [`CoreError`]
//! - [`run_info`]: `RunInfo.xml` parsing
//! - [`duration`]: run-duration strings (`24h`, `3d`, …)
//! - [`samplesheet`]: samplesheet discovery and reconciliation
//! - [`cycles`]: post-upload cycle-consistency check
//! - [`notify_state`]: persisted "start notification sent" record
//! - [`clock`]: monotonic time source used for pacing and backoff

pub mod clock;
pub mod cycles;
pub mod duration;
pub mod error;
pub mod notify_state;
pub mod run_info;
pub mod samplesheet;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use run_info::RunInfo;
pub use types::{
    CompletionStyle, DownstreamTarget, FileId, Lane, LaneLabel, LaneLayout, Properties, RecordId,
    RunId, SentinelState,
};
