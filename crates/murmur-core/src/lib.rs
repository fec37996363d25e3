//! # murmur-core
//!
//! Foundation types for the murmur chat server.
//!
//! - **I/O contract**: [`io::Stream`] and [`io::Listener`] whose operations never
//!   block and report "not ready" as a value rather than an error
//! - **Readiness vocabulary**: [`Handle`], [`Interest`], [`Readiness`], [`Timeout`]
//! - **System glue**: non-blocking flag control and listener creation on top of `rustix`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber
//! - **Errors**: [`CoreError`] via `thiserror`

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod io;
pub mod logging;
pub mod readiness;
pub mod sys;

pub use errors::{CoreError, Result};
pub use io::{AcceptOutcome, Listener, ReadOutcome, Stream, WriteOutcome};
pub use readiness::{Handle, Interest, Readiness, Timeout};
