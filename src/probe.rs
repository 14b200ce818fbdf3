// src/probe.rs

use crate::models::DownloadTarget;
use crate::transport::{Transport, TransportError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not determine the size of {url}")]
    UnknownSize { url: String },
    #[error("probe request failed: {0}")]
    Transport(#[from] TransportError),
}

/// Determines the total size of a resource and whether ranges are honored.
pub struct SizeProber<'a> {
    transport: &'a dyn Transport,
}

impl<'a> SizeProber<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Asks for the first byte only. A 200 or 206 answer marks the server as
    /// range-capable. If the reported length is 1 or less (the answer to our
    /// own one-byte range, or nothing at all), a HEAD request supplies the
    /// real size.
    pub async fn probe(&self, url: &str) -> Result<DownloadTarget, ProbeError> {
        let resp = self.transport.get_range(url, 0, 0).await?;
        let status = resp.meta.status;
        let supports_ranges = status == 200 || status == 206;
        let mut size = resp.meta.content_length.unwrap_or(0);
        drop(resp.body);
        debug!(url, status, size, "range probe answered");

        if size <= 1 {
            match self.transport.head(url).await {
                Ok(meta) => {
                    if let Some(len) = meta.content_length.filter(|len| *len > 0) {
                        size = len;
                    }
                    debug!(url, status = meta.status, size, "head fallback answered");
                }
                Err(e) => debug!(url, error = %e, "head fallback failed"),
            }
        }

        if size == 0 {
            return Err(ProbeError::UnknownSize { url: url.to_string() });
        }

        info!(url, size, supports_ranges, "probed target");
        Ok(DownloadTarget {
            url: url.to_string(),
            total_size: size,
            supports_ranges,
        })
    }
}
