//! # runstream-sync
//!
//! The external synchronizer (the executable that tars everything new in a
//! run directory and uploads the archives) and the retry discipline around it.
//!
//! - [`Synchronizer`]: one `sync(lane, finish)` call, faked in tests
//! - [`ExternalSynchronizer`]: spawns the executable with [`SyncSettings`]
//! - [`SyncInvoker`]: bounded retries with a fixed backoff

pub mod error;
pub mod invoker;
pub mod retry;
pub mod settings;
pub mod synchronizer;

pub use error::SyncError;
pub use invoker::SyncInvoker;
pub use retry::{RetryExhausted, RetryPolicy, DEFAULT_BACKOFF};
pub use settings::{SyncSettings, Uploader};
pub use synchronizer::{parse_artifact_ids, ExternalSynchronizer, Synchronizer};
