//! Server-side socket.
//!
//! Setup is split in two so background mode can detach between `bind`
//! and `listen`:
//!
//! ```text
//! bind(addr) -> BoundSocket -> [detach] -> listen(backlog) -> Listener
//! ```

use crate::error::{ErrorClass, StartupError};
use crate::shutdown::Shutdown;
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error};

/// A socket bound to its address but not yet listening.
#[derive(Debug)]
pub struct BoundSocket {
    socket: Socket,
}

/// Create a TCP socket with SO_REUSEADDR and bind it to `addr`.
pub fn bind(addr: SocketAddr) -> Result<BoundSocket, StartupError> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(StartupError::Socket)?;
    socket
        .set_reuse_address(true)
        .map_err(StartupError::SocketOption)?;
    socket
        .bind(&addr.into())
        .map_err(|e| StartupError::Bind(addr, e))?;

    Ok(BoundSocket { socket })
}

impl BoundSocket {
    /// Start listening and hand back a non-blocking std listener.
    pub fn listen(self, backlog: i32) -> Result<std::net::TcpListener, StartupError> {
        self.socket.listen(backlog).map_err(StartupError::Listen)?;
        self.socket
            .set_nonblocking(true)
            .map_err(StartupError::SocketOption)?;
        Ok(self.socket.into())
    }
}

/// Accepting side of the server, aware of the shutdown flag.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    shutdown: Shutdown,
}

impl Listener {
    /// Register a listening std socket with the current runtime.
    pub fn from_std(listener: std::net::TcpListener, shutdown: Shutdown) -> io::Result<Self> {
        Ok(Self {
            inner: TcpListener::from_std(listener)?,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Wait for the next client.
    ///
    /// Returns `None` once shutdown has been requested. Accept errors while
    /// the flag is clear are logged and retried without backoff.
    pub async fn accept_next(&self) -> Option<(TcpStream, SocketAddr)> {
        accept_until_shutdown(&self.shutdown, || self.inner.accept()).await
    }
}

async fn accept_until_shutdown<T, A, F>(shutdown: &Shutdown, mut accept: A) -> Option<T>
where
    A: FnMut() -> F,
    F: Future<Output = io::Result<T>>,
{
    loop {
        if shutdown.is_set() {
            return None;
        }

        let accepted = tokio::select! {
            biased;
            _ = shutdown.wait() => return None,
            accepted = accept() => accepted,
        };

        match accepted {
            Ok(connection) => return Some(connection),
            Err(e) if shutdown.is_set() => {
                debug!(error = %e, "Accept interrupted by shutdown");
                return None;
            }
            Err(e) => {
                error!(error = %e, class = %ErrorClass::TransientRetry, "Accept failed");
            }
        }
    }
}
