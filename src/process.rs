//! Process fan-out.
//!
//! The monitoring side spawns one worker process, sends it a
//! [`WorkerRequest`] and mirrors the progress it reports into a
//! [`RemoteProgress`]. The worker side ([`serve_worker`]) runs the normal
//! in-process fan-out and streams [`WorkerEvent`]s back.

use crate::config::WorkerCommand;
use crate::downloader::download_all;
use crate::ipc::{WorkerEvent, WorkerRequest, MAX_LINE_BYTES};
use crate::models::ChunkResult;
use crate::progress::{ProgressAggregator, RemoteProgress, SharedProgress};
use crate::transport::Transport;
use futures_util::{SinkExt, StreamExt};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("worker process has no {0} handle")]
    MissingPipe(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid protocol message: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("framing error: {0}")]
    Framing(#[from] LinesCodecError),
    #[error("no download request received")]
    MissingRequest,
    #[error("worker output ended without a report")]
    MissingReport,
    #[error("worker process exited with {0} without a report")]
    WorkerExited(std::process::ExitStatus),
}

/// Monitor side of the process fan-out.
#[derive(Debug, Clone)]
pub struct ProcessFanOut {
    command: WorkerCommand,
}

impl ProcessFanOut {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }

    /// Runs `request` in a child process and waits for it to exit.
    pub async fn run(
        &self,
        request: &WorkerRequest,
        progress: &RemoteProgress,
    ) -> Result<Vec<ChunkResult>, ProcessError> {
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProcessError::Spawn)?;
        info!(pid = ?child.id(), program = %self.command.program.display(), "worker process spawned");

        let mut stdin = child.stdin.take().ok_or(ProcessError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(ProcessError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ProcessError::MissingPipe("stderr"))?;

        // Worker logs arrive on stderr.
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "rangefetch::worker", "{}", line);
            }
        });

        let line = request.to_json_line()?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        drop(stdin);

        let report = monitor_events(stdout, progress).await;
        let status = child.wait().await?;
        let _ = stderr_task.await;
        debug!(%status, "worker process exited");

        match report {
            Ok(results) => {
                if !status.success() {
                    warn!(%status, "worker process exited unsuccessfully after reporting");
                }
                Ok(results)
            }
            Err(ProcessError::MissingReport) => Err(ProcessError::WorkerExited(status)),
            Err(e) => Err(e),
        }
    }
}

/// Reads worker events until the `finished` report, mirroring progress.
///
/// Lines that are not valid events are logged and skipped.
pub async fn monitor_events<R>(
    reader: R,
    progress: &RemoteProgress,
) -> Result<Vec<ChunkResult>, ProcessError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    while let Some(line) = lines.next().await {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match WorkerEvent::from_json_line(line) {
            Ok(WorkerEvent::Progress { downloaded }) => progress.observe(downloaded),
            Ok(WorkerEvent::Finished { results }) => return Ok(results),
            Err(e) => {
                let preview: String = line.chars().take(200).collect();
                warn!(error = %e, line = %preview, "invalid line from worker");
            }
        }
    }
    Err(ProcessError::MissingReport)
}

/// Worker side: reads one request from `input`, downloads every chunk in
/// this process and reports on `output`.
pub async fn serve_worker<R, W>(
    transport: Arc<dyn Transport>,
    input: R,
    output: W,
) -> Result<Vec<ChunkResult>, ProcessError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut requests = FramedRead::new(input, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let line = requests.next().await.ok_or(ProcessError::MissingRequest)??;
    let request = WorkerRequest::from_json_line(line.trim())?;
    info!(url = %request.url, chunks = request.chunks.len(), "worker request received");

    let mut events = FramedWrite::new(output, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let progress = SharedProgress::new(request.total_size);

    let mut fan_out = {
        let shared: Arc<dyn ProgressAggregator> = Arc::new(progress.clone());
        let url = request.url.clone();
        let chunks = request.chunks.clone();
        tokio::spawn(async move { download_all(transport, &url, &chunks, shared).await })
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(request.poll_interval_ms.max(1)));
    let results = loop {
        tokio::select! {
            joined = &mut fan_out => {
                break match joined {
                    Ok(results) => results,
                    Err(e) => {
                        warn!(error = %e, "fan-out task did not complete");
                        request
                            .chunks
                            .iter()
                            .map(|c| ChunkResult::failure(c.id, format!("fan-out aborted: {e}")))
                            .collect()
                    }
                };
            }
            _ = ticker.tick() => {
                let downloaded = progress.snapshot().current;
                events.send(WorkerEvent::Progress { downloaded }.to_json_line()?).await?;
            }
        }
    };
    progress.mark_done();

    let downloaded = progress.snapshot().current;
    events.send(WorkerEvent::Progress { downloaded }.to_json_line()?).await?;
    events
        .send(WorkerEvent::Finished { results: results.clone() }.to_json_line()?)
        .await?;
    info!(downloaded, "worker finished");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ChunkPlanner;
    use crate::transport::testing::{payload, MemoryTransport};
    use tokio::io::duplex;

    fn request_for(dir: &std::path::Path, size: u64, chunks: usize) -> WorkerRequest {
        WorkerRequest {
            url: "mem://file".to_string(),
            total_size: size,
            chunks: ChunkPlanner::new(dir).partition(size, chunks).unwrap(),
            poll_interval_ms: 5,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_and_monitor_over_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let data = payload(1000);
        let transport = Arc::new(MemoryTransport::new(data.clone()).failing_at(500));
        let request = request_for(dir.path(), 1000, 4);

        let (mut request_tx, worker_in) = duplex(64 * 1024);
        let (worker_out, monitor_in) = duplex(64 * 1024);
        request_tx
            .write_all(format!("{}\n", request.to_json_line().unwrap()).as_bytes())
            .await
            .unwrap();

        let worker = tokio::spawn(serve_worker(transport, worker_in, worker_out));
        let progress = RemoteProgress::new(1000);
        let results = monitor_events(monitor_in, &progress).await.unwrap();

        let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).map(|r| r.id).collect();
        assert_eq!(failed, vec![2]);
        let reported = worker.await.unwrap().unwrap();
        assert_eq!(reported, results);

        let snap = progress.snapshot();
        assert!(snap.current > 750 && snap.current < 1000);
        assert!(!snap.done);
        assert_eq!(std::fs::read(&request.chunks[3].temp_path).unwrap(), &data[750..]);
    }

    #[tokio::test]
    async fn test_worker_without_request() {
        let (request_tx, worker_in) = duplex(1024);
        drop(request_tx);
        let transport = Arc::new(MemoryTransport::new(payload(10)));

        let err = serve_worker(transport, worker_in, tokio::io::sink()).await.unwrap_err();
        assert!(matches!(err, ProcessError::MissingRequest));
    }

    #[tokio::test]
    async fn test_monitor_skips_noise_and_requires_report() {
        let progress = RemoteProgress::new(100);
        let input: &[u8] = b"not json\n{\"event\":\"progress\",\"downloaded\":40}\n\n";
        let err = monitor_events(input, &progress).await.unwrap_err();

        assert!(matches!(err, ProcessError::MissingReport));
        assert_eq!(progress.snapshot().current, 40);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_fan_out_reads_child_report() {
        let dir = tempfile::tempdir().unwrap();
        let command = WorkerCommand::new("sh").arg("-c").arg(
            r#"cat >/dev/null; echo '{"event":"progress","downloaded":10}'; echo '{"event":"finished","results":[{"id":0,"outcome":{"status":"success"}}]}'"#,
        );
        let progress = RemoteProgress::new(10);

        let results = ProcessFanOut::new(command)
            .run(&request_for(dir.path(), 10, 1), &progress)
            .await
            .unwrap();

        assert_eq!(results, vec![ChunkResult::success(0)]);
        assert_eq!(progress.snapshot().current, 10);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_fan_out_child_dies_without_report() {
        let dir = tempfile::tempdir().unwrap();
        let command = WorkerCommand::new("sh").arg("-c").arg("cat >/dev/null; exit 3");

        let err = ProcessFanOut::new(command)
            .run(&request_for(dir.path(), 10, 1), &RemoteProgress::new(10))
            .await
            .unwrap_err();

        match err {
            ProcessError::WorkerExited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
