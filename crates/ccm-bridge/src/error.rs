//! Error taxonomy for the dispatch loop.
//!
//! Nothing here is recovered locally: every variant propagates out of
//! [`run_worker`](crate::worker::run_worker) and ends the process. The parent
//! sees a missing completion sentinel followed by process exit.

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

use crate::bridge::protocol::Kind;

/// Failure reading a frame off the control pipe.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The parent closed its end before a frame header arrived.
    #[error("control pipe closed (parent exited?)")]
    Closed,

    #[error("control pipe closed mid-frame with {buffered} bytes buffered")]
    Truncated { buffered: usize },

    #[error("payload of {len} bytes does not fit a u16 length prefix")]
    Oversized { len: usize },

    #[error("control pipe I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Frame payload is not a usable argument sequence.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not a YAML sequence of scalars: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invocation has no arguments")]
    Empty,

    #[error("argument {index} is a {found}, expected a string")]
    NonString { index: usize, found: &'static str },

    #[error("node '{node}' given without a command")]
    MissingNodeCommand { node: String },
}

/// A handler rejected its parsed options.
#[derive(Debug, Error)]
#[error("{command}: {message}")]
pub struct ValidationError {
    pub command: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// A handler failed while performing its side effects.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to start '{program}': {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{command} exited with {status}")]
    Failed { command: String, status: ExitStatus },

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Any failure that ends the dispatch loop.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unknown {kind} command '{name}'")]
    UnknownCommand { kind: Kind, name: String },

    #[error("invalid options for {command}: {source}")]
    Options {
        command: String,
        source: clap::Error,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("failed to write sentinel to parent: {0}")]
    Sentinel(#[source] io::Error),
}
