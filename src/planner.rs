// src/planner.rs

use crate::models::ChunkSpec;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Upper bound on the number of concurrent chunks.
pub const MAX_CHUNKS: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid partition: cannot split {total_size} bytes into {chunks} chunks (allowed 1-{max})", max = MAX_CHUNKS)]
    InvalidPartition { total_size: u64, chunks: usize },
}

/// Splits a resource into contiguous byte ranges, one temp file per range.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    temp_dir: PathBuf,
}

impl ChunkPlanner {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self { temp_dir: temp_dir.into() }
    }

    /// Deterministic temp file name for chunk `id`.
    pub fn temp_path(&self, id: usize) -> PathBuf {
        self.temp_dir.join(format!("part_{}.tmp", id))
    }

    /// Every chunk gets `total_size / chunks` bytes; the last one also takes
    /// the remainder. A resource smaller than the chunk count is split into
    /// one-byte chunks instead.
    pub fn partition(&self, total_size: u64, chunks: usize) -> Result<Vec<ChunkSpec>, PlanError> {
        if chunks < 1 || chunks > MAX_CHUNKS || total_size == 0 {
            return Err(PlanError::InvalidPartition { total_size, chunks });
        }

        let count = if (chunks as u64) > total_size {
            warn!(total_size, chunks, "resource smaller than chunk count, using {} chunks", total_size);
            total_size as usize
        } else {
            chunks
        };

        let chunk_size = total_size / count as u64;
        let specs = (0..count)
            .map(|i| {
                let start = i as u64 * chunk_size;
                let end = if i == count - 1 {
                    total_size - 1
                } else {
                    start + chunk_size - 1
                };
                ChunkSpec {
                    id: i,
                    start_byte: start,
                    end_byte: end,
                    temp_path: self.temp_path(i),
                }
            })
            .collect();
        Ok(specs)
    }
}
