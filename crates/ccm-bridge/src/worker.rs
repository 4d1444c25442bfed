//! Worker dispatch loop - the child side of the bridge.
//!
//! One cycle per frame, strictly sequential:
//!
//! ```text
//! AwaitFrame -> Decode -> ResolveTarget -> ResolveHandler
//!            -> ParseOptions -> Validate -> Execute -> Ack -> AwaitFrame
//! ```
//!
//! The only suspension points are the frame read and the handler's `run`.
//! There is no per-cycle isolation: the first failure in any stage ends the
//! loop, and with it the process. The parent notices the missing ack.

use std::convert::Infallible;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::Instrument;

use crate::bridge::codec::FrameReader;
use crate::bridge::protocol::{DispatchTarget, Invocation, Sentinel};
use crate::error::BridgeError;
use crate::registry::Registry;

/// Writes sentinel bytes to the parent, one flush per byte.
pub struct SentinelWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> SentinelWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, sentinel: Sentinel) -> io::Result<()> {
        self.inner.write_all(&[sentinel.as_byte()]).await?;
        self.inner.flush().await
    }
}

/// Run the worker loop.
///
/// Announces readiness, then serves frames from `input` until something
/// fails. It never returns `Ok`; a closed input is a
/// [`ProtocolError::Closed`](crate::error::ProtocolError::Closed).
pub async fn run_worker<R, W>(
    input: R,
    output: W,
    registry: &Registry,
) -> Result<Infallible, BridgeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FrameReader::new(input);
    let mut sentinels = SentinelWriter::new(output);

    sentinels
        .send(Sentinel::Ready)
        .await
        .map_err(BridgeError::Sentinel)?;
    tracing::info!(commands = registry.len(), "Worker ready");

    let mut cycle: u64 = 0;
    loop {
        let payload = frames.read_frame().await?;
        cycle += 1;

        let span = tracing::info_span!("cycle", cycle);
        let target = dispatch(&payload, registry).instrument(span).await?;

        sentinels
            .send(Sentinel::Done)
            .await
            .map_err(BridgeError::Sentinel)?;
        tracing::info!(
            cycle,
            kind = %target.kind,
            command = %target.command_name,
            "Command completed"
        );
    }
}

/// Run one frame's payload through decode, resolution and execution.
pub async fn dispatch(payload: &[u8], registry: &Registry) -> Result<DispatchTarget, BridgeError> {
    let invocation = Invocation::decode(payload)?;
    tracing::trace!(args = ?invocation.raw_args(), "Decoded invocation");

    let target =
        DispatchTarget::from_invocation(invocation, |name| registry.is_cluster_command(name))?;
    tracing::debug!(
        kind = %target.kind,
        command = %target.command_name,
        args = ?target.command_args,
        "Dispatching"
    );

    let factory = registry
        .resolve(target.kind, &target.command_name)
        .ok_or_else(|| BridgeError::UnknownCommand {
            kind: target.kind,
            name: target.command_name.clone(),
        })?;
    let mut handler = factory();

    let options = handler
        .parser()
        .try_get_matches_from(&target.command_args)
        .map_err(|source| BridgeError::Options {
            command: target.command_name.clone(),
            source,
        })?;

    handler.validate(&options)?;
    handler.run().await?;
    Ok(target)
}
