//! ccm-bridge: framed-pipe worker that runs cluster manager commands on
//! behalf of a parent test harness.

pub mod bridge;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod registry;
pub mod worker;

pub use bridge::protocol::{DispatchTarget, Invocation, Kind, Sentinel};
pub use client::{BridgeClient, ClientConfig, ClientError};
pub use config::BridgeConfig;
pub use error::{BridgeError, DecodeError, ExecutionError, ProtocolError, ValidationError};
pub use registry::{CommandHandler, HandlerFactory, Registry, handler_key};
pub use worker::{dispatch, run_worker};
