//! 流式结果模块：单个长连接请求的 NDJSON 结果按需读取。
//!
//! # Streaming Result Module
//!
//! A listgen call issues one long-lived POST. The response head and body are
//! spooled to a scratch file while they arrive; afterwards the head is parsed
//! back out of the file and the call branches on the status:
//!
//! - **200**: [`ListgenBody::Records`] yields one decoded JSON value per line,
//!   lazily, and deletes the scratch file once the stream ends or is dropped.
//! - **anything else**: [`ListgenBody::Error`] carries the error body.
//! - **transport failure**: [`ListgenBody::Empty`], with the failure kind set.

mod consumer;
mod headers;

pub use consumer::{ListgenBody, ListgenInputs, ListgenResponse, RecordStream, StreamConsumer};
pub use headers::parse_header_block;
