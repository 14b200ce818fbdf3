//! Aggregated download progress shared between workers and the monitor.
//!
//! Two backings implement [`ProgressAggregator`]:
//!
//! - [`SharedProgress`]: a lock-guarded counter shared by the worker tasks of
//!   one process.
//! - [`RemoteProgress`]: the monitor-side mirror of a counter that lives in a
//!   separate worker process. It is fed from the progress events that process
//!   writes to its end of the pipe (see [`crate::process`]).
//!
//! In both cases `done` is only ever set by whoever confirmed that every worker
//! has finished, never by the increment path.

use crate::models::ProgressSnapshot;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Counter of received bytes plus a completion flag.
pub trait ProgressAggregator: Send + Sync {
    /// Adds `delta` received bytes.
    fn increment(&self, delta: u64);

    /// Current committed state.
    fn snapshot(&self) -> ProgressSnapshot;

    /// Marks the download finished. Idempotent.
    fn mark_done(&self);
}

#[derive(Debug, Default)]
struct ProgressState {
    total_downloaded: u64,
    file_size: u64,
    done: bool,
}

impl ProgressState {
    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            current: self.total_downloaded,
            total: self.file_size,
            done: self.done,
        }
    }

    fn mark_done(&mut self) -> bool {
        let first = !self.done;
        self.done = true;
        first
    }
}

/// In-process backing, cloned into every worker task.
#[derive(Debug, Clone)]
pub struct SharedProgress {
    state: Arc<Mutex<ProgressState>>,
}

impl SharedProgress {
    pub fn new(file_size: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProgressState {
                file_size,
                ..ProgressState::default()
            })),
        }
    }
}

impl ProgressAggregator for SharedProgress {
    fn increment(&self, delta: u64) {
        let mut state = self.state.lock();
        state.total_downloaded = state.total_downloaded.saturating_add(delta);
    }

    fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().snapshot()
    }

    fn mark_done(&self) {
        if self.state.lock().mark_done() {
            debug!("progress marked done");
        }
    }
}

/// Monitor-side backing for a counter owned by another process.
///
/// The worker process reports its cumulative byte count. [`observe`] applies
/// each report only if it is ahead of the mirrored value, so the mirror never
/// moves backwards.
///
/// [`observe`]: RemoteProgress::observe
#[derive(Debug, Clone)]
pub struct RemoteProgress {
    inner: SharedProgress,
}

impl RemoteProgress {
    pub fn new(file_size: u64) -> Self {
        Self {
            inner: SharedProgress::new(file_size),
        }
    }

    /// Applies a cumulative total reported by the worker process.
    pub fn observe(&self, reported: u64) {
        let mut state = self.inner.state.lock();
        if reported > state.total_downloaded {
            state.total_downloaded = reported;
        }
    }
}

impl ProgressAggregator for RemoteProgress {
    fn increment(&self, delta: u64) {
        self.inner.increment(delta);
    }

    fn snapshot(&self) -> ProgressSnapshot {
        self.inner.snapshot()
    }

    fn mark_done(&self) {
        self.inner.mark_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn hammer(progress: Arc<dyn ProgressAggregator>) -> u64 {
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let progress = progress.clone();
                thread::spawn(move || {
                    let mut sent = 0;
                    for i in 0..1_000u64 {
                        let delta = (t + i) % 17 + 1;
                        progress.increment(delta);
                        sent += delta;
                    }
                    sent
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    }

    #[test]
    fn test_shared_progress_loses_no_updates() {
        let progress = Arc::new(SharedProgress::new(0));
        let sent = hammer(progress.clone());
        assert_eq!(progress.snapshot().current, sent);
    }

    #[test]
    fn test_remote_progress_loses_no_updates() {
        let progress = Arc::new(RemoteProgress::new(0));
        let sent = hammer(progress.clone());
        assert_eq!(progress.snapshot().current, sent);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_progress_across_tasks() {
        let progress = SharedProgress::new(64 * 100);
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let progress = progress.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        progress.increment(1);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let snap = progress.snapshot();
        assert_eq!(snap.current, 6400);
        assert_eq!(snap.total, 6400);
        assert!(!snap.done);
    }

    #[test]
    fn test_remote_observe_is_monotonic() {
        let progress = RemoteProgress::new(1000);
        progress.observe(300);
        progress.observe(200);
        assert_eq!(progress.snapshot().current, 300);
        progress.observe(1000);
        assert_eq!(progress.snapshot().current, 1000);
    }

    #[test]
    fn test_remote_increment_and_observe_share_one_counter() {
        let progress = RemoteProgress::new(100);
        progress.increment(40);
        progress.observe(30);
        assert_eq!(progress.snapshot().current, 40);
        progress.observe(90);
        progress.mark_done();
        let snap = progress.snapshot();
        assert_eq!((snap.current, snap.total, snap.done), (90, 100, true));
    }

    #[test]
    fn test_done_is_set_once_and_only_explicitly() {
        let progress = SharedProgress::new(10);
        progress.increment(10);
        assert!(!progress.snapshot().done);

        progress.mark_done();
        progress.mark_done();
        let snap = progress.snapshot();
        assert!(snap.done);
        assert_eq!(snap.current, 10);
    }
}
