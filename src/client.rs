//! Client facade for the REACH API.
//!
//! The public surface is small: build a [`ReachClient`], then call `append`
//! or `listgen`. Request construction lives in [`request`]; dispatch, retry
//! and streaming live in their own modules.

pub mod builder;
pub mod core;
pub mod request;

pub use builder::ReachClientBuilder;
pub use core::ReachClient;
pub use request::{RequestFactory, API_KEY_HEADER};
