//! 批处理模块：并发调度与按配额顺序推进的批次序列。
//!
//! # Batch Dispatch Module
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ConcurrentDispatcher`] | Runs one batch of requests in parallel under a deadline |
//! | [`BatchSequencer`] | Splits input into quota-sized batches and drives them in order |
//! | [`BatchResult`] | Merged outcomes of one batch |
//! | [`BatchStream`] | Lazy sequence of batch results |
//!
//! Batches are strictly sequential: batch *k + 1* never starts before batch *k*
//! (retries included) has resolved, and never sooner than the configured
//! minimum interval after batch *k*'s last dispatch.

pub mod dispatcher;
pub mod sequencer;

pub use dispatcher::{
    ConcurrentDispatcher, DispatchReport, DispatcherConfig, OutcomeMap, RecordBatch,
};
pub use sequencer::{BatchResult, BatchSequencer, BatchStream};
