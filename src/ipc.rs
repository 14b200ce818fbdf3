//! Protocol between the monitoring process and a worker process.
//!
//! Messages are newline-delimited JSON: one [`WorkerRequest`] on the worker's
//! stdin, then a sequence of [`WorkerEvent`]s on its stdout ending with
//! exactly one `finished` event. Worker logs go to stderr.

use crate::models::{ChunkResult, ChunkSpec};
use serde::{Deserialize, Serialize};

/// Longest line either side accepts.
pub const MAX_LINE_BYTES: usize = 1 << 20;

// ====== REQUEST (monitor -> worker) ======

/// What the worker process should download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub url: String,
    pub total_size: u64,
    pub chunks: Vec<ChunkSpec>,
    /// How often the worker reports progress.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl WorkerRequest {
    /// Serialize to a single JSON line (for stdin).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

// ====== EVENTS (worker -> monitor) ======

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// Cumulative bytes received by all chunks so far.
    Progress { downloaded: u64 },
    /// All chunk workers have been joined.
    Finished { results: Vec<ChunkResult> },
}

impl WorkerEvent {
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from a JSON line (from stdout).
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_request_serialization() {
        let req = WorkerRequest {
            url: "http://example.com/file.zip".to_string(),
            total_size: 10,
            chunks: vec![ChunkSpec {
                id: 0,
                start_byte: 0,
                end_byte: 9,
                temp_path: PathBuf::from("part_0.tmp"),
            }],
            poll_interval_ms: 250,
        };
        let json = req.to_json_line().unwrap();
        assert!(!json.contains('\n'));
        assert_eq!(WorkerRequest::from_json_line(&json).unwrap(), req);
    }

    #[test]
    fn test_request_default_poll_interval() {
        let json = r#"{"url":"http://x","total_size":1,"chunks":[]}"#;
        let req = WorkerRequest::from_json_line(json).unwrap();
        assert_eq!(req.poll_interval_ms, 500);
    }

    #[test]
    fn test_event_deserialization() {
        let progress = WorkerEvent::from_json_line(r#"{"event":"progress","downloaded":42}"#).unwrap();
        assert_eq!(progress, WorkerEvent::Progress { downloaded: 42 });

        let json = r#"{"event":"finished","results":[{"id":0,"outcome":{"status":"success"}},{"id":1,"outcome":{"status":"failure","reason":"reset"}}]}"#;
        let finished = WorkerEvent::from_json_line(json).unwrap();
        assert_eq!(
            finished,
            WorkerEvent::Finished {
                results: vec![ChunkResult::success(0), ChunkResult::failure(1, "reset")]
            }
        );
    }
}
