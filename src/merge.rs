// src/merge.rs

use crate::models::ChunkSpec;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("chunk {id} is missing ({})", .path.display())]
    MissingChunk { id: usize, path: PathBuf },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Concatenates chunk temp files into the final output.
pub struct ChunkMerger;

impl ChunkMerger {
    /// Returns the first chunk (by id) whose temp file is not a regular file.
    pub async fn first_missing(chunks: &[ChunkSpec]) -> Option<&ChunkSpec> {
        let mut ordered: Vec<&ChunkSpec> = chunks.iter().collect();
        ordered.sort_by_key(|c| c.id);
        for chunk in ordered {
            let present = tokio::fs::metadata(&chunk.temp_path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !present {
                return Some(chunk);
            }
        }
        None
    }

    /// Streams each chunk into `output` in ascending id order, deleting each
    /// temp file once copied. Stops at the first chunk that cannot be opened;
    /// whatever was already written and any remaining temp files stay on disk.
    pub async fn merge(chunks: &[ChunkSpec], output: &Path) -> Result<u64, MergeError> {
        let mut ordered: Vec<&ChunkSpec> = chunks.iter().collect();
        ordered.sort_by_key(|c| c.id);

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = BufWriter::new(File::create(output).await?);
        let mut total = 0u64;

        for chunk in ordered {
            let mut part = match File::open(&chunk.temp_path).await {
                Ok(file) => file,
                Err(e) => {
                    out.flush().await?;
                    debug!(chunk = chunk.id, error = %e, "cannot open chunk");
                    return Err(MergeError::MissingChunk {
                        id: chunk.id,
                        path: chunk.temp_path.clone(),
                    });
                }
            };
            let copied = tokio::io::copy(&mut part, &mut out).await?;
            drop(part);
            tokio::fs::remove_file(&chunk.temp_path).await?;
            debug!(chunk = chunk.id, bytes = copied, "chunk merged");
            total += copied;
        }

        out.flush().await?;
        info!(output = %output.display(), bytes = total, "merge complete");
        Ok(total)
    }
}
