// src/models.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The resource being downloaded, as reported by the server.
///
/// Created once by the size prober and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTarget {
    pub url: String,
    pub total_size: u64,
    /// Advisory only: a server answering 200 to a range request is counted
    /// as range-capable even though it may ignore the header.
    pub supports_ranges: bool,
}

/// One contiguous byte range of the target and the temp file it lands in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpec {
    pub id: usize,
    pub start_byte: u64,
    /// Inclusive.
    pub end_byte: u64,
    pub temp_path: PathBuf,
}

impl ChunkSpec {
    /// Number of bytes this chunk covers.
    pub fn len(&self) -> u64 {
        self.end_byte - self.start_byte + 1
    }

    /// Value for the HTTP `Range` header.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start_byte, self.end_byte)
    }
}

/// How a single chunk download ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ChunkOutcome {
    Success,
    Failure(String),
}

/// Produced exactly once per worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub id: usize,
    pub outcome: ChunkOutcome,
}

impl ChunkResult {
    pub fn success(id: usize) -> Self {
        Self { id, outcome: ChunkOutcome::Success }
    }

    pub fn failure(id: usize, reason: impl Into<String>) -> Self {
        Self { id, outcome: ChunkOutcome::Failure(reason.into()) }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Success)
    }
}

/// A consistent read of the shared progress counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub current: u64,
    pub total: u64,
    pub done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_len_and_range_header() {
        let spec = ChunkSpec {
            id: 1,
            start_byte: 250,
            end_byte: 499,
            temp_path: PathBuf::from("part_1.tmp"),
        };
        assert_eq!(spec.len(), 250);
        assert_eq!(spec.range_header(), "bytes=250-499");
    }

    #[test]
    fn test_chunk_result_serialization() {
        let failed = ChunkResult::failure(2, "connection reset");
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"status\":\"failure\""));
        assert!(json.contains("connection reset"));
        assert!(!failed.is_success());
        assert!(ChunkResult::success(0).is_success());
    }
}
