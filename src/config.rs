// src/config.rs

use crate::planner::MAX_CHUNKS;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = concat!("rangefetch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("thread count must be between 1 and {max}, got {0}", max = MAX_CHUNKS)]
    ThreadCount(usize),
    #[error("poll interval must be greater than zero")]
    PollInterval,
}

/// Command that starts a worker process speaking the [`crate::ipc`] protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The running executable in `--worker` mode.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?).arg("--worker"))
    }
}

/// Where the chunk workers run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConcurrencyModel {
    /// Worker tasks inside this process.
    #[default]
    Threads,
    /// Worker tasks inside one child process; this process only monitors.
    Process(WorkerCommand),
}

/// Options for a download run.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Number of chunks downloaded concurrently.
    pub threads: usize,
    /// Directory holding the `part_<id>.tmp` files.
    pub temp_dir: PathBuf,
    pub poll_interval: Duration,
    pub model: ConcurrencyModel,
    /// Hex SHA-256 the merged file is checked against, if known.
    pub expected_sha256: Option<String>,
    pub user_agent: String,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            temp_dir: PathBuf::from("."),
            poll_interval: Duration::from_millis(500),
            model: ConcurrencyModel::Threads,
            expected_sha256: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl DownloadOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CHUNKS).contains(&self.threads) {
            return Err(ConfigError::ThreadCount(self.threads));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::PollInterval);
        }
        Ok(())
    }
}
