//! 类型模块：请求记录与响应结果的核心数据类型。
//!
//! # Types Module
//!
//! Core value types that flow through the dispatch engine.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RequestRecord`] | One prepared lookup (id, url, headers, echoed inputs) |
//! | [`InputRow`] | Ordered field → value mapping for one input record |
//! | [`ResponseOutcome`] | Final result of one record's attempt sequence |
//! | [`TransportErrorKind`] | Transport-level failure classification |
//! | [`OutcomeClass`] | Retry-relevant classification of an outcome |

pub mod outcome;
pub mod record;

pub use outcome::{OutcomeClass, ResponseHeaders, ResponseOutcome, TransportErrorKind};
pub use record::{InputRow, RecordId, RequestRecord};
