//! IPC bridge between the parent harness and the worker process.
//!
//! This module provides the wire protocol and codec for the control pipe.
//!
//! # Architecture
//!
//! - **protocol**: Sentinels, invocations and dispatch targets
//! - **codec**: u16 length-prefixed framing for AsyncRead/AsyncWrite

pub mod codec;
pub mod protocol;
