//! Streaming (listgen) consumer.

use super::headers::{parse_header_block, render_header_block};
use crate::telemetry::{DispatchEvent, DispatchObserver};
use crate::transport::{StreamRequest, Transport};
use crate::types::{ResponseHeaders, TransportErrorKind};
use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};

/// Inputs of a listgen call: each field may carry several values.
pub type ListgenInputs = Vec<(String, Vec<String>)>;

/// Lazy, forward-only sequence of decoded NDJSON records.
pub type RecordStream = BoxStream<'static, Value>;

/// What a listgen call produced.
pub enum ListgenBody {
    /// HTTP 200: records are read from the scratch file on demand.
    Records(RecordStream),
    /// Any other status: the full error body, decoded when it is JSON.
    Error { raw: Bytes, body: Option<Value> },
    /// Transport failure; no body was received.
    Empty,
}

impl std::fmt::Debug for ListgenBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListgenBody::Records(_) => f.write_str("Records(..)"),
            ListgenBody::Error { body, raw } => f
                .debug_struct("Error")
                .field("body", body)
                .field("raw_len", &raw.len())
                .finish(),
            ListgenBody::Empty => f.write_str("Empty"),
        }
    }
}

#[derive(Debug)]
pub struct ListgenResponse {
    pub inputs: ListgenInputs,
    /// 0 when no response head was received.
    pub http_status: u16,
    pub transport_error: TransportErrorKind,
    pub error_message: Option<String>,
    pub headers: ResponseHeaders,
    pub success: bool,
    pub body: ListgenBody,
}

impl ListgenResponse {
    fn failed(inputs: ListgenInputs, http_status: u16, kind: TransportErrorKind, message: String) -> Self {
        Self {
            inputs,
            http_status,
            transport_error: kind,
            error_message: Some(message),
            headers: ResponseHeaders::new(),
            success: false,
            body: ListgenBody::Empty,
        }
    }

    /// The record stream, when the call succeeded.
    pub fn into_records(self) -> Option<RecordStream> {
        match self.body {
            ListgenBody::Records(records) => Some(records),
            _ => None,
        }
    }

    /// Decoded error body of a non-200 response.
    pub fn error_body(&self) -> Option<&Value> {
        match &self.body {
            ListgenBody::Error { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

/// Owns the scratch file for one listgen call.
///
/// The file is deleted when the cursor is dropped, which happens exactly once
/// on every path: record exhaustion, read or decode failure, non-200 response,
/// transport failure, or the caller dropping the record stream early.
struct StreamCursor {
    file: BufReader<tokio::fs::File>,
    _scratch: tempfile::NamedTempFile,
    header_size: usize,
    http_status: u16,
    records: usize,
    exhausted: bool,
    observer: Arc<dyn DispatchObserver>,
}

impl StreamCursor {
    fn open(dir: Option<&Path>, observer: Arc<dyn DispatchObserver>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("reach_listgen_");
        let scratch = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let file = tokio::fs::File::from_std(scratch.reopen()?);
        Ok(Self {
            file: BufReader::new(file),
            _scratch: scratch,
            header_size: 0,
            http_status: 0,
            records: 0,
            exhausted: false,
            observer,
        })
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.get_mut().write_all(bytes).await?;
        Ok(())
    }

    async fn rewind(&mut self) -> Result<()> {
        self.file.get_mut().flush().await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    async fn read_headers(&mut self) -> Result<ResponseHeaders> {
        let mut raw = vec![0u8; self.header_size];
        self.file.read_exact(&mut raw).await?;
        Ok(parse_header_block(&String::from_utf8_lossy(&raw)))
    }

    async fn read_rest(&mut self) -> Result<Bytes> {
        let mut rest = Vec::new();
        self.file.read_to_end(&mut rest).await?;
        Ok(Bytes::from(rest))
    }

    /// Next non-blank line decoded as JSON; `Ok(None)` at end of file.
    async fn next_record(&mut self) -> Result<Option<Value>> {
        loop {
            let mut line = String::new();
            if self.file.read_line(&mut line).await? == 0 {
                self.exhausted = true;
                return Ok(None);
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value = serde_json::from_str(line)?;
            self.records += 1;
            return Ok(Some(value));
        }
    }

    fn into_record_stream(self) -> RecordStream {
        Box::pin(futures::stream::unfold(Some(self), |slot| async move {
            let mut cursor = slot?;
            match cursor.next_record().await {
                Ok(Some(value)) => Some((Ok(value), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        }))
    }
}

impl Drop for StreamCursor {
    fn drop(&mut self) {
        self.observer.on_event(&DispatchEvent::StreamClosed {
            records: self.records,
            exhausted: self.exhausted,
        });
    }
}

/// Issues one long-lived request and exposes its NDJSON body lazily.
///
/// The response is spooled to a scratch file as it arrives, so memory use does
/// not grow with the size of the result set.
pub struct StreamConsumer {
    transport: Arc<dyn Transport>,
    scratch_dir: Option<PathBuf>,
    observer: Arc<dyn DispatchObserver>,
}

impl StreamConsumer {
    pub fn new(
        transport: Arc<dyn Transport>,
        scratch_dir: Option<PathBuf>,
        observer: Arc<dyn DispatchObserver>,
    ) -> Self {
        Self {
            transport,
            scratch_dir,
            observer,
        }
    }

    /// Run the request to completion and branch on its status.
    ///
    /// Only local scratch-file failures are returned as `Err`; every remote or
    /// transport failure is reported inside the [`ListgenResponse`].
    pub async fn consume(&self, request: StreamRequest, inputs: ListgenInputs) -> Result<ListgenResponse> {
        let mut cursor = StreamCursor::open(self.scratch_dir.as_deref(), Arc::clone(&self.observer))?;
        self.observer.on_event(&DispatchEvent::StreamOpened {
            url: request.url.clone(),
        });

        let response = match self.transport.open_stream(&request).await {
            Ok(response) => response,
            Err(e) => {
                return Ok(ListgenResponse::failed(inputs, 0, e.kind(), e.to_string()));
            }
        };

        cursor.http_status = response.status;
        let head = render_header_block(response.status, &response.reason, &response.headers);
        cursor.header_size = head.len();
        cursor.write(head.as_bytes()).await?;

        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => cursor.write(&bytes).await?,
                Err(e) => {
                    let kind = match &e {
                        Error::Transport(te) => te.kind(),
                        _ => TransportErrorKind::Other,
                    };
                    return Ok(ListgenResponse::failed(
                        inputs,
                        cursor.http_status,
                        kind,
                        e.to_string(),
                    ));
                }
            }
        }
        drop(body);

        cursor.rewind().await?;
        let headers = cursor.read_headers().await?;
        self.observer.on_event(&DispatchEvent::StreamResponse {
            status: cursor.http_status,
            header_size: cursor.header_size,
        });

        let http_status = cursor.http_status;
        if http_status != 200 {
            let raw = cursor.read_rest().await?;
            drop(cursor);
            let body = serde_json::from_slice(&raw).ok();
            return Ok(ListgenResponse {
                inputs,
                http_status,
                transport_error: TransportErrorKind::None,
                error_message: None,
                headers,
                success: false,
                body: ListgenBody::Error { raw, body },
            });
        }

        Ok(ListgenResponse {
            inputs,
            http_status,
            transport_error: TransportErrorKind::None,
            error_message: None,
            headers,
            success: true,
            body: ListgenBody::Records(cursor.into_record_stream()),
        })
    }
}
