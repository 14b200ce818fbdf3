//! Tracing setup shared by the CLI and worker mode.
//!
//! Everything goes to stderr: stdout carries user output, or the protocol
//! when running as a worker process.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("subscriber init failed: {0}")]
    Init(String),
}

/// Directive used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "rangefetch=debug"
    } else {
        "rangefetch=info"
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init(verbose: bool) -> Result<(), LogError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| LogError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "rangefetch=info");
        assert_eq!(default_directive(true), "rangefetch=debug");
    }
}
