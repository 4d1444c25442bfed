//! Client - the parent side of the bridge.
//!
//! Flow:
//! 1. Spawn the worker with piped stdin/stderr
//! 2. Wait for the ready sentinel
//! 3. For each command: send one frame, wait for the completion sentinel
//! 4. On anything other than the expected sentinel: the worker is dying,
//!    collect its last words and exit status
//!
//! Only one command is ever in flight.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio_util::bytes::Bytes;
use tokio_util::codec::FramedWrite;

use crate::bridge::codec::FrameCodec;
use crate::bridge::protocol::{Invocation, Sentinel};
use crate::error::{DecodeError, ProtocolError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("worker did not become ready within {0:?}")]
    ReadyTimeout(Duration),

    #[error("invalid invocation: {0}")]
    Encode(#[from] DecodeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("worker exited with {status}: {diagnostics}")]
    WorkerExited {
        status: ExitStatus,
        diagnostics: String,
    },

    #[error("worker I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
    pub ready_timeout: Duration,
}

impl ClientConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            ready_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }
}

pub struct BridgeClient {
    child: Child,
    frames: FramedWrite<ChildStdin, FrameCodec>,
    sentinels: ChildStderr,
}

impl BridgeClient {
    /// Start a worker and wait until it reports ready.
    pub async fn spawn(config: ClientConfig) -> Result<Self, ClientError> {
        tracing::info!(program = %config.program.display(), "Spawning bridge worker");

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .envs(config.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ClientError::Spawn)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ClientError::Spawn(io::Error::other("worker stdin not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ClientError::Spawn(io::Error::other("worker stderr not captured"))
        })?;

        let mut client = Self {
            child,
            frames: FramedWrite::new(stdin, FrameCodec::new()),
            sentinels: stderr,
        };

        tokio::time::timeout(config.ready_timeout, client.expect(Sentinel::Ready))
            .await
            .map_err(|_| ClientError::ReadyTimeout(config.ready_timeout))??;

        tracing::debug!(pid = ?client.id(), "Bridge worker ready");
        Ok(client)
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Run one command and wait for it to complete.
    pub async fn exec<I, S>(&mut self, args: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = Invocation::new(args.into_iter().map(Into::into).collect())?;
        let payload = invocation.encode().map_err(DecodeError::from)?;
        tracing::debug!(args = ?invocation.raw_args(), "Sending command");

        match self.frames.send(Bytes::from(payload)).await {
            Ok(()) => {}
            // The worker already died; its exit is reported below.
            Err(ProtocolError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!("Worker closed its stdin");
            }
            Err(e) => return Err(e.into()),
        }

        self.expect(Sentinel::Done).await
    }

    /// Send SIGTERM and wait for the worker to exit.
    pub async fn terminate(mut self) -> Result<ExitStatus, ClientError> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id().and_then(|id| i32::try_from(id).ok()) {
                kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)?;
            }
        }
        #[cfg(not(unix))]
        self.child.start_kill()?;

        Ok(self.child.wait().await?)
    }

    async fn expect(&mut self, expected: Sentinel) -> Result<(), ClientError> {
        let mut leftover = Vec::new();
        match self.sentinels.read_u8().await {
            Ok(byte) if byte == expected.as_byte() => return Ok(()),
            Ok(byte) => leftover.push(byte),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
            Err(e) => return Err(e.into()),
        }

        // Anything else means the worker is going down.
        self.sentinels.read_to_end(&mut leftover).await?;
        let status = self.child.wait().await?;
        let diagnostics = String::from_utf8_lossy(&leftover).trim().to_string();
        tracing::warn!(%status, %diagnostics, "Bridge worker exited");
        Err(ClientError::WorkerExited {
            status,
            diagnostics,
        })
    }
}
