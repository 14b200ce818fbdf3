//! HTTP transport abstraction.
//!
//! The engine never talks to reqwest directly; it goes through [`Transport`]
//! so tests can swap in an in-memory server.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::Client;
use thiserror::Error;

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("transport error: {0}")]
    Other(String),
}

/// Stream of body buffers as they arrive from the server.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Status line and length of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u16,
    pub content_length: Option<u64>,
}

impl ResponseMeta {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Response to a byte-range GET.
pub struct RangeResponse {
    pub meta: ResponseMeta,
    pub body: ByteStream,
}

/// Injected capability performing byte-range GET and HEAD requests.
///
/// Non-2xx responses are returned as data, not errors; callers decide what a
/// status means for them.
pub trait Transport: Send + Sync {
    /// GET `url` with `Range: bytes=<start>-<end>`.
    fn get_range(
        &self,
        url: &str,
        start: u64,
        end: u64,
    ) -> BoxFuture<'_, Result<RangeResponse, TransportError>>;

    /// Metadata-only request.
    fn head(&self, url: &str) -> BoxFuture<'_, Result<ResponseMeta, TransportError>>;
}

/// Production transport backed by a shared reqwest client.
///
/// Redirects are followed by reqwest's default policy. No request timeout is
/// applied: a stalled server blocks the chunk until the connection drops.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

fn content_length(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

impl Transport for ReqwestTransport {
    fn get_range(
        &self,
        url: &str,
        start: u64,
        end: u64,
    ) -> BoxFuture<'_, Result<RangeResponse, TransportError>> {
        let request = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={}-{}", start, end));
        Box::pin(async move {
            let resp = request.send().await?;
            let meta = ResponseMeta {
                status: resp.status().as_u16(),
                content_length: content_length(resp.headers()),
            };
            let body = resp
                .bytes_stream()
                .map(|chunk| chunk.map_err(TransportError::from))
                .boxed();
            Ok(RangeResponse { meta, body })
        })
    }

    fn head(&self, url: &str) -> BoxFuture<'_, Result<ResponseMeta, TransportError>> {
        let request = self.client.head(url);
        Box::pin(async move {
            let resp = request.send().await?;
            Ok(ResponseMeta {
                status: resp.status().as_u16(),
                content_length: content_length(resp.headers()),
            })
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{payload, MemoryTransport};
    use super::*;

    #[test]
    fn test_response_meta_success_range() {
        let ok = ResponseMeta { status: 206, content_length: Some(1) };
        let missing = ResponseMeta { status: 404, content_length: None };
        assert!(ok.is_success());
        assert!(!missing.is_success());
    }

    #[tokio::test]
    async fn test_memory_transport_serves_requested_slice() {
        let data = payload(300);
        let transport = MemoryTransport::new(data.clone());

        let resp = transport.get_range("mem://file", 100, 199).await.unwrap();
        assert_eq!(resp.meta.status, 206);
        assert_eq!(resp.meta.content_length, Some(100));

        let body: Vec<u8> = resp
            .body
            .map(|b| b.unwrap().to_vec())
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(body, &data[100..200]);
        assert_eq!(transport.requested_ranges(), vec![(100, 199)]);
    }
}
