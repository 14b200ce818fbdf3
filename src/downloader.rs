use crate::models::{ChunkResult, ChunkSpec};
use crate::progress::ProgressAggregator;
use crate::transport::{Transport, TransportError};
use futures_util::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, warn};

/// Custom errors for a single chunk download.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server answered {status} for {range}")]
    Status { status: u16, range: String },
}

/// Everything the write path of one worker needs, owned for its lifetime.
pub struct WorkerContext {
    sink: BufWriter<File>,
    progress: Arc<dyn ProgressAggregator>,
    written: u64,
}

impl WorkerContext {
    pub fn new(sink: File, progress: Arc<dyn ProgressAggregator>) -> Self {
        Self {
            sink: BufWriter::new(sink),
            progress,
            written: 0,
        }
    }

    /// Writes one received buffer and reports its length.
    pub async fn write(&mut self, buf: &[u8]) -> Result<(), DownloadError> {
        self.sink.write_all(buf).await?;
        self.written += buf.len() as u64;
        self.progress.increment(buf.len() as u64);
        Ok(())
    }

    /// Flushes the temp file and returns the number of bytes written.
    pub async fn finish(mut self) -> Result<u64, DownloadError> {
        self.sink.flush().await?;
        Ok(self.written)
    }
}

/// Downloads one byte range of a resource into its temp file.
///
/// A single attempt per chunk; failures are reported, never retried.
#[derive(Clone)]
pub struct DownloadWorker {
    transport: Arc<dyn Transport>,
    url: String,
}

impl DownloadWorker {
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }

    pub async fn run(&self, spec: &ChunkSpec, progress: Arc<dyn ProgressAggregator>) -> ChunkResult {
        info!(chunk = spec.id, start = spec.start_byte, end = spec.end_byte, "chunk started");
        match self.download(spec, progress).await {
            Ok(written) => {
                info!(chunk = spec.id, bytes = written, "chunk finished");
                ChunkResult::success(spec.id)
            }
            Err(e) => {
                warn!(chunk = spec.id, error = %e, "chunk failed");
                ChunkResult::failure(spec.id, e.to_string())
            }
        }
    }

    async fn download(
        &self,
        spec: &ChunkSpec,
        progress: Arc<dyn ProgressAggregator>,
    ) -> Result<u64, DownloadError> {
        // The temp file is created before the request so that a transport
        // failure still leaves it on disk.
        let file = File::create(&spec.temp_path).await?;
        let mut ctx = WorkerContext::new(file, progress);

        // Whatever arrived before a failure is flushed to the temp file too.
        let fetched = self.fetch_into(spec, &mut ctx).await;
        let written = ctx.finish().await?;
        fetched.map(|_| written)
    }

    async fn fetch_into(&self, spec: &ChunkSpec, ctx: &mut WorkerContext) -> Result<(), DownloadError> {
        let resp = self
            .transport
            .get_range(&self.url, spec.start_byte, spec.end_byte)
            .await?;
        if !resp.meta.is_success() {
            return Err(DownloadError::Status {
                status: resp.meta.status,
                range: spec.range_header(),
            });
        }

        let mut stream = resp.body;
        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            ctx.write(&bytes).await?;
        }
        Ok(())
    }
}

/// Runs one worker task per chunk and waits for all of them.
///
/// A failing chunk does not stop its siblings. Results come back in chunk
/// order regardless of completion order.
pub async fn download_all(
    transport: Arc<dyn Transport>,
    url: &str,
    chunks: &[ChunkSpec],
    progress: Arc<dyn ProgressAggregator>,
) -> Vec<ChunkResult> {
    let worker = DownloadWorker::new(transport, url);
    let mut tasks = Vec::with_capacity(chunks.len());
    for spec in chunks {
        let worker = worker.clone();
        let spec = spec.clone();
        let progress = progress.clone();
        tasks.push((
            spec.id,
            tokio::spawn(async move { worker.run(&spec, progress).await }),
        ));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for (id, task) in tasks {
        match task.await {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!(chunk = id, error = %e, "worker task did not complete");
                results.push(ChunkResult::failure(id, format!("worker task aborted: {e}")));
            }
        }
    }
    results
}
