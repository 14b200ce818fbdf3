pub mod config;
pub mod downloader;
pub mod integrity;
pub mod ipc;
pub mod logging;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod probe;
pub mod process;
pub mod progress;
pub mod transport;

/// Convenient re-exports of the types most callers need.
pub mod prelude {
    pub use crate::config::{ConcurrencyModel, DownloadOptions, WorkerCommand};
    pub use crate::integrity::Verification;
    pub use crate::models::{ChunkOutcome, ChunkResult, ChunkSpec, DownloadTarget, ProgressSnapshot};
    pub use crate::orchestrator::{DownloadReport, Orchestrator, OrchestratorError, Phase};
    pub use crate::progress::{ProgressAggregator, RemoteProgress, SharedProgress};
    pub use crate::transport::{ReqwestTransport, Transport};
}
