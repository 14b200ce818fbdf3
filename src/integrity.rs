use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of comparing the merged file against the expected size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch { actual: u64 },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Match)
    }
}

/// Compares the length of `path` with `expected`. Reads metadata only.
pub async fn verify_size(path: &Path, expected: u64) -> Result<Verification, IntegrityError> {
    let actual = tokio::fs::metadata(path).await?.len();
    if actual == expected {
        Ok(Verification::Match)
    } else {
        Ok(Verification::Mismatch { actual })
    }
}

/// Compute SHA256 hash of a file asynchronously.
pub async fn sha256_sum(path: &Path) -> Result<String, IntegrityError> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 1024 * 8];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 { break; }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hashes `path` and compares against a hex digest, ignoring case.
pub async fn verify_sha256(path: &Path, expected: &str) -> Result<bool, IntegrityError> {
    let sum = sha256_sum(path).await?;
    Ok(sum.eq_ignore_ascii_case(expected.trim()))
}
