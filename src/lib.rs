//! # reach-client
//!
//! Versium REACH API 的异步客户端：按配额分批并发请求、自动重试，以及流式结果读取。
//!
//! Async client runtime for the Versium REACH data API.
//!
//! ## Overview
//!
//! Two call shapes are supported:
//!
//! - **Append**: many independent GET requests, one per input row. Rows are
//!   split into batches of `quota_per_second`, each batch runs concurrently
//!   under a deadline, failed requests are retried, and batches are spaced so
//!   the request rate never exceeds the quota.
//! - **Listgen**: one long-lived POST whose body is newline-delimited JSON.
//!   The body is spooled to a scratch file and read back one record at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use reach_client::{InputRow, ReachClient};
//!
//! #[tokio::main]
//! async fn main() -> reach_client::Result<()> {
//!     let client = ReachClient::new("your-api-key")?;
//!
//!     let rows = vec![InputRow::new().with("email", "someone@example.com")];
//!     let mut batches = client.append("contact", rows, &["phone"])?;
//!     while let Some(batch) = batches.next().await {
//!         for outcome in batch.iter() {
//!             println!("{} -> {}", outcome.id, outcome.http_status);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client facade, builder and request construction |
//! | [`batch`] | Concurrent batch dispatch and batch sequencing |
//! | [`resilience`] | Retry policy and inter-batch rate limiting |
//! | [`stream`] | Streaming NDJSON consumer |
//! | [`transport`] | Transport seam and the reqwest implementation |
//! | [`types`] | Request records and response outcomes |
//! | [`telemetry`] | Dispatch events and observers |
//! | [`config`] | Configuration with env and YAML overrides |

pub mod batch;
pub mod client;
pub mod config;
pub mod resilience;
pub mod stream;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use batch::{BatchResult, BatchStream};
pub use client::{ReachClient, ReachClientBuilder};
pub use config::ClientConfig;
pub use stream::{ListgenBody, ListgenInputs, ListgenResponse, RecordStream};
pub use telemetry::{DispatchEvent, DispatchObserver};
pub use types::{InputRow, OutcomeClass, RecordId, ResponseOutcome, TransportErrorKind};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
