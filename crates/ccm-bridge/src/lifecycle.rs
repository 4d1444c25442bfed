//! Process lifecycle for the worker.
//!
//! The parent spawns the worker with whatever descriptors it happened to have
//! open. Those are closed first thing at startup so the worker (and every
//! command it runs) holds nothing but stdin, stdout and stderr.
//!
//! Shutdown is signal driven: SIGINT, SIGTERM and SIGHUP end the process with
//! status 0 whatever the dispatch loop is doing. A command that is still
//! running is abandoned. The handlers need a runtime, so until they exist the
//! signals are held pending with [`hold_shutdown_signals`] and delivered once
//! [`HeldSignals::release`] runs.
//!
//! Rust's standard streams never translate line endings, so sentinel bytes
//! reach the parent unchanged on every platform without switching stderr to
//! binary mode.
//!
//! ## Safety contracts
//!
//! `close_inherited_fds` must run before the async runtime is built and before
//! the log file is opened. At that point no descriptor above 2 is owned by any
//! Rust object in this process, so closing them cannot invalidate an
//! `OwnedFd` or `File`.

use std::fmt;
use std::io;

#[cfg(unix)]
use std::os::fd::RawFd;

#[cfg(unix)]
use nix::sys::resource::{Resource, getrlimit};
#[cfg(unix)]
use nix::sys::signal::{SigSet, Signal as SignalNumber};
#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// First descriptor that is not a standard stream.
#[cfg(unix)]
const FIRST_INHERITED_FD: RawFd = 3;

/// Upper bound used when the descriptor limit is unlimited.
#[cfg(unix)]
const FALLBACK_MAX_FD: libc::rlim_t = 65536;

/// Close every descriptor above stderr. Failures on individual descriptors
/// (already closed, never open) are ignored.
///
/// Returns how many descriptors were actually closed.
#[cfg(unix)]
pub fn close_inherited_fds() -> usize {
    let candidates = match open_fds() {
        Some(fds) => fds,
        None => (FIRST_INHERITED_FD..max_fd()).collect(),
    };

    candidates
        .into_iter()
        .filter(|&fd| fd >= FIRST_INHERITED_FD)
        .filter(|&fd| close_fd(fd))
        .count()
}

#[cfg(not(unix))]
pub fn close_inherited_fds() -> usize {
    0
}

/// Descriptors currently open, if the platform can list them.
///
/// The directory handle itself shows up in the listing; it is closed again by
/// the time the caller walks the list, so closing it fails quietly.
#[cfg(target_os = "linux")]
fn open_fds() -> Option<Vec<RawFd>> {
    let entries = std::fs::read_dir("/proc/self/fd").ok()?;
    let fds = entries
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
        .collect();
    Some(fds)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn open_fds() -> Option<Vec<RawFd>> {
    None
}

/// One past the highest descriptor the process may hold.
#[cfg(unix)]
fn max_fd() -> RawFd {
    let limit = match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((_, hard)) if hard != libc::RLIM_INFINITY => hard,
        _ => FALLBACK_MAX_FD,
    };
    RawFd::try_from(limit).unwrap_or(RawFd::MAX)
}

#[cfg(unix)]
fn close_fd(fd: RawFd) -> bool {
    // Safety: see the module-level contract. No Rust object owns `fd`.
    unsafe { libc::close(fd) == 0 }
}

/// Shutdown signals blocked on the calling thread.
///
/// Threads and child processes inherit the mask, so release before spawning
/// either.
#[must_use = "held signals stay blocked until released"]
pub struct HeldSignals {
    #[cfg(unix)]
    set: SigSet,
}

/// Block SIGINT, SIGTERM and SIGHUP so that one arriving during startup stays
/// pending instead of killing the process.
#[cfg(unix)]
pub fn hold_shutdown_signals() -> io::Result<HeldSignals> {
    let mut set = SigSet::empty();
    set.add(SignalNumber::SIGINT);
    set.add(SignalNumber::SIGTERM);
    set.add(SignalNumber::SIGHUP);
    set.thread_block()?;
    Ok(HeldSignals { set })
}

#[cfg(not(unix))]
pub fn hold_shutdown_signals() -> io::Result<HeldSignals> {
    Ok(HeldSignals {})
}

impl HeldSignals {
    /// Unblock the signals. Anything that arrived while held is delivered now,
    /// to whatever handlers are installed at this point.
    #[cfg(unix)]
    pub fn release(self) -> io::Result<()> {
        self.set.thread_unblock()?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn release(self) -> io::Result<()> {
        Ok(())
    }
}

/// Why the worker is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Interrupt,
    Terminate,
    Hangup,
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
            Self::Hangup => f.write_str("SIGHUP"),
        }
    }
}

/// Installed termination handlers.
///
/// Installing replaces the default disposition, so once this exists the
/// signals no longer kill the process by themselves: the owner must race
/// [`ShutdownSignals::recv`] against its work and exit.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    hangup: Signal,
}

impl ShutdownSignals {
    /// Install the handlers. Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the first termination signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> Shutdown {
        tokio::select! {
            _ = self.interrupt.recv() => Shutdown::Interrupt,
            _ = self.terminate.recv() => Shutdown::Terminate,
            _ = self.hangup.recv() => Shutdown::Hangup,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> Shutdown {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
        Shutdown::Interrupt
    }
}
