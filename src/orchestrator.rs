// src/orchestrator.rs

use crate::config::{ConcurrencyModel, DownloadOptions};
use crate::downloader::download_all;
use crate::integrity::{verify_sha256, verify_size, IntegrityError, Verification};
use crate::ipc::WorkerRequest;
use crate::merge::{ChunkMerger, MergeError};
use crate::models::{ChunkResult, ChunkSpec, DownloadTarget, ProgressSnapshot};
use crate::planner::{ChunkPlanner, PlanError};
use crate::probe::{ProbeError, SizeProber};
use crate::process::ProcessFanOut;
use crate::progress::{ProgressAggregator, RemoteProgress, SharedProgress};
use crate::transport::Transport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),
    #[error("verification failed: {0}")]
    Verify(#[from] IntegrityError),
}

/// Where a run currently is. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Probing,
    Planning,
    Downloading,
    Merging,
    Verifying,
    Done,
    Failed,
}

/// Final account of a run that got as far as verification.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub target: DownloadTarget,
    pub output: PathBuf,
    pub results: Vec<ChunkResult>,
    pub bytes_merged: u64,
    pub verification: Verification,
    /// `None` when no digest was configured.
    pub checksum_ok: Option<bool>,
}

impl DownloadReport {
    pub fn failed_chunks(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.id)
            .collect()
    }

    /// True when every chunk succeeded. Size or checksum mismatches are
    /// warnings and do not affect this.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(ChunkResult::is_success)
    }

    pub fn actual_size(&self) -> u64 {
        match self.verification {
            Verification::Match => self.target.total_size,
            Verification::Mismatch { actual } => actual,
        }
    }
}

pub type ProgressCallback = Box<dyn FnMut(ProgressSnapshot) + Send>;

/// Drives one download: probe, plan, fan out, merge, verify.
pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    options: DownloadOptions,
    on_progress: Option<ProgressCallback>,
    phase: Phase,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn Transport>, options: DownloadOptions) -> Self {
        Self {
            transport,
            options,
            on_progress: None,
            phase: Phase::Idle,
        }
    }

    /// Called on every poll tick and once more after all workers finished.
    pub fn on_progress(mut self, callback: impl FnMut(ProgressSnapshot) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn run(&mut self, url: &str, output: &Path) -> Result<DownloadReport, OrchestratorError> {
        match self.execute(url, output).await {
            Ok(report) => {
                self.enter(Phase::Done);
                Ok(report)
            }
            Err(e) => {
                error!(phase = ?self.phase, error = %e, "download failed");
                self.enter(Phase::Failed);
                Err(e)
            }
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase change");
        self.phase = phase;
    }

    fn notify(&mut self, snapshot: ProgressSnapshot) {
        if let Some(cb) = self.on_progress.as_mut() {
            cb(snapshot);
        }
    }

    async fn execute(&mut self, url: &str, output: &Path) -> Result<DownloadReport, OrchestratorError> {
        self.enter(Phase::Probing);
        let target = SizeProber::new(self.transport.as_ref()).probe(url).await?;
        if !target.supports_ranges {
            warn!(url, "server might not support range requests");
        }

        self.enter(Phase::Planning);
        let chunks = ChunkPlanner::new(&self.options.temp_dir)
            .partition(target.total_size, self.options.threads)?;
        info!(
            chunks = chunks.len(),
            chunk_size = target.total_size / chunks.len() as u64,
            "download planned"
        );

        self.enter(Phase::Downloading);
        let results = self.download(&target, &chunks).await;
        let failed: Vec<usize> = results.iter().filter(|r| !r.is_success()).map(|r| r.id).collect();
        if !failed.is_empty() {
            warn!(?failed, "some chunks failed");
        }

        self.enter(Phase::Merging);
        if let Some(missing) = ChunkMerger::first_missing(&chunks).await {
            return Err(MergeError::MissingChunk {
                id: missing.id,
                path: missing.temp_path.clone(),
            }
            .into());
        }
        let bytes_merged = ChunkMerger::merge(&chunks, output).await?;

        self.enter(Phase::Verifying);
        let verification = verify_size(output, target.total_size).await?;
        match verification {
            Verification::Match => info!(size = target.total_size, "size verified"),
            Verification::Mismatch { actual } => {
                warn!(expected = target.total_size, actual, "size mismatch")
            }
        }

        let checksum_ok = match self.options.expected_sha256.as_deref() {
            Some(expected) => {
                let ok = verify_sha256(output, expected).await?;
                if !ok {
                    warn!(expected, "sha256 mismatch");
                }
                Some(ok)
            }
            None => None,
        };

        Ok(DownloadReport {
            target,
            output: output.to_path_buf(),
            results,
            bytes_merged,
            verification,
            checksum_ok,
        })
    }

    /// Launches the workers under the configured model and polls progress
    /// until all of them have finished. Never cancels a worker.
    async fn download(&mut self, target: &DownloadTarget, chunks: &[ChunkSpec]) -> Vec<ChunkResult> {
        let (progress, handle) = self.launch(target, chunks);

        let interval = self.options.poll_interval.max(Duration::from_millis(1));
        while !handle.is_finished() {
            tokio::time::sleep(interval).await;
            let snapshot = progress.snapshot();
            trace!(current = snapshot.current, total = snapshot.total, "progress");
            self.notify(snapshot);
        }

        let results = match handle.await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "fan-out task did not complete");
                chunks
                    .iter()
                    .map(|c| ChunkResult::failure(c.id, format!("fan-out aborted: {e}")))
                    .collect()
            }
        };
        progress.mark_done();
        self.notify(progress.snapshot());
        results
    }

    fn launch(
        &self,
        target: &DownloadTarget,
        chunks: &[ChunkSpec],
    ) -> (Arc<dyn ProgressAggregator>, JoinHandle<Vec<ChunkResult>>) {
        match &self.options.model {
            ConcurrencyModel::Threads => {
                let progress: Arc<dyn ProgressAggregator> =
                    Arc::new(SharedProgress::new(target.total_size));
                let shared = progress.clone();
                let transport = self.transport.clone();
                let url = target.url.clone();
                let chunks = chunks.to_vec();
                let handle = tokio::spawn(async move {
                    download_all(transport, &url, &chunks, shared).await
                });
                (progress, handle)
            }
            ConcurrencyModel::Process(command) => {
                let remote = RemoteProgress::new(target.total_size);
                let mirror = remote.clone();
                let fan_out = ProcessFanOut::new(command.clone());
                let request = WorkerRequest {
                    url: target.url.clone(),
                    total_size: target.total_size,
                    chunks: chunks.to_vec(),
                    poll_interval_ms: self.options.poll_interval.as_millis().max(1) as u64,
                };
                let handle = tokio::spawn(async move {
                    match fan_out.run(&request, &mirror).await {
                        Ok(results) => results,
                        Err(e) => {
                            warn!(error = %e, "worker process failed");
                            request
                                .chunks
                                .iter()
                                .map(|c| ChunkResult::failure(c.id, e.to_string()))
                                .collect()
                        }
                    }
                });
                (Arc::new(remote), handle)
            }
        }
    }
}
