//! Graceful shutdown signalling.
//!
//! SIGINT and SIGTERM set a process-wide flag. The accept loop polls the
//! flag and also waits on it alongside `accept()`. Sessions in progress
//! never observe it and run to completion.

use crate::error::StartupError;
use std::io;
use std::mem::MaybeUninit;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Cloneable handle to the shutdown flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the flag. Returns `true` only for the call that set it.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the flag is set.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set.
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// SIGINT and SIGTERM held pending on the calling thread.
///
/// Startup blocks both before touching the socket and releases them once
/// `install` has registered handlers, so a signal in between is delivered
/// to the handler instead of killing the process. Dropping the guard
/// restores the previous mask.
pub struct BlockedSignals {
    previous: libc::sigset_t,
}

impl BlockedSignals {
    pub fn block() -> io::Result<Self> {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        let mut previous = MaybeUninit::<libc::sigset_t>::uninit();

        // SAFETY: sigemptyset initialises `set` before it is read; the
        // previous mask is written by pthread_sigmask before assume_init.
        unsafe {
            libc::sigemptyset(set.as_mut_ptr());
            libc::sigaddset(set.as_mut_ptr(), libc::SIGINT);
            libc::sigaddset(set.as_mut_ptr(), libc::SIGTERM);
            let rc = libc::pthread_sigmask(libc::SIG_BLOCK, set.as_ptr(), previous.as_mut_ptr());
            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
            Ok(Self {
                previous: previous.assume_init(),
            })
        }
    }
}

impl Drop for BlockedSignals {
    fn drop(&mut self) {
        // SAFETY: `previous` was filled by pthread_sigmask in `block`.
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, std::ptr::null_mut());
        }
    }
}

/// Register SIGINT and SIGTERM handlers that trigger `shutdown`.
///
/// Must be called from within a tokio runtime. Registration failure is a
/// startup failure.
pub fn install(shutdown: Shutdown) -> Result<JoinHandle<()>, StartupError> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(StartupError::Signals)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(StartupError::Signals)?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                received = sigint.recv() => match received {
                    Some(()) => "SIGINT",
                    None => break,
                },
                received = sigterm.recv() => match received {
                    Some(()) => "SIGTERM",
                    None => break,
                },
            };

            if shutdown.trigger() {
                info!(signal = name, "Caught signal, exiting");
            } else {
                debug!(signal = name, "Shutdown already requested");
            }
        }
    }))
}
