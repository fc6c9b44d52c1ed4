//! 传输层：所有网络 I/O 的唯一入口。
//!
//! # Transport Module
//!
//! The [`Transport`] trait is the only place network I/O happens. The dispatcher
//! calls [`Transport::fetch`] once per record attempt; the stream consumer calls
//! [`Transport::open_stream`] once per `listgen` call. [`HttpTransport`] is the
//! reqwest-backed implementation; tests plug in scripted transports.

mod http;

pub use http::HttpTransport;

use crate::types::{RequestRecord, ResponseHeaders, TransportErrorKind};
use crate::BoxStream;
use async_trait::async_trait;
use bytes::Bytes;

/// A fully received response for one record attempt.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: ResponseHeaders::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A single long-lived POST whose body is consumed incrementally.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Form fields sent urlencoded in the request body, in order.
    pub form: Vec<(String, String)>,
}

/// Response head plus a lazily pulled body.
pub struct StreamingResponse {
    pub status: u16,
    /// Reason phrase for the status line (e.g. "OK"); empty when unknown.
    pub reason: String,
    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: BoxStream<'static, Bytes>,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Network seam used by the dispatcher and the stream consumer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one record attempt and read the whole body.
    async fn fetch(&self, record: &RequestRecord) -> Result<RawResponse, TransportError>;

    /// Open a streaming request; the body is pulled by the caller.
    async fn open_stream(&self, request: &StreamRequest)
        -> Result<StreamingResponse, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::Http(e) if e.is_timeout() => TransportErrorKind::Timeout,
            TransportError::Http(e) if e.is_connect() || e.is_request() || e.is_body() => {
                TransportErrorKind::ConnectionLost
            }
            TransportError::Http(_) => TransportErrorKind::Other,
            TransportError::ConnectionLost(_) => TransportErrorKind::ConnectionLost,
            TransportError::Timeout => TransportErrorKind::Timeout,
            TransportError::Other(_) => TransportErrorKind::Other,
        }
    }
}
