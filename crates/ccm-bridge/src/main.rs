use anyhow::Context;
use tracing::{error, info};

use ccm_bridge::commands::builtin_registry;
use ccm_bridge::lifecycle::{self, HeldSignals, Shutdown, ShutdownSignals};
use ccm_bridge::{BridgeConfig, Registry, logging, run_worker};

fn main() -> anyhow::Result<()> {
    // Pending until serve() has handlers in place, so an early SIGTERM still
    // exits 0.
    let held = lifecycle::hold_shutdown_signals().context("failed to block signals")?;

    // Before anything in this process opens a descriptor of its own.
    let closed = lifecycle::close_inherited_fds();

    let config = BridgeConfig::from_env();
    logging::init_tracing(&config.log).context("failed to open log file")?;
    info!(closed, "ccm-bridge {}", env!("CARGO_PKG_VERSION"));

    let registry = builtin_registry(&config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    let outcome = runtime.block_on(serve(&registry, held));
    // A pending stdin read sits on the blocking pool and would hold up a
    // normal runtime drop forever.
    runtime.shutdown_background();

    let shutdown = outcome.inspect_err(|e| error!(error = %e, "Worker failed"))?;
    info!(%shutdown, "Received signal, exiting");
    Ok(())
}

async fn serve(registry: &Registry, held: HeldSignals) -> anyhow::Result<Shutdown> {
    let mut signals = ShutdownSignals::install().context("failed to install signal handlers")?;
    held.release().context("failed to unblock signals")?;

    tokio::select! {
        shutdown = signals.recv() => Ok(shutdown),
        result = run_worker(tokio::io::stdin(), tokio::io::stderr(), registry) => {
            match result {
                Ok(never) => match never {},
                Err(e) => Err(e.into()),
            }
        }
    }
}
