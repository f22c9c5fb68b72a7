//! TCP server for the append-and-replay protocol.
//!
//! Accepts one connection at a time, runs its session to completion
//! against the shared store, and only then accepts the next. On shutdown
//! the listener is closed and the store is deleted.

use crate::config::Config;
use crate::error::SessionError;
use crate::listener::Listener;
use crate::session::Session;
use crate::store::Store;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Server instance
pub struct Server {
    listener: Listener,
    store: Store,
    recv_chunk: usize,
    echo_chunk: usize,
}

impl Server {
    /// Create a new server instance
    pub fn new(listener: Listener, config: &Config) -> Self {
        Server {
            listener,
            store: Store::new(&config.data_file),
            recv_chunk: config.recv_chunk,
            echo_chunk: config.echo_chunk,
        }
    }

    /// Accept and serve connections until shutdown is requested.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(address = %addr, store = %self.store.path().display(), "Server listening");
        }

        while let Some((stream, peer)) = self.listener.accept_next().await {
            self.serve_connection(stream, peer).await;
        }

        let Server { listener, store, .. } = self;
        drop(listener);
        debug!("Listener closed");

        match store.remove().await {
            Ok(true) => debug!(store = %store.path().display(), "Store removed"),
            Ok(false) => {}
            Err(e) => warn!(store = %store.path().display(), error = %e, "Failed to remove store"),
        }
    }

    /// Handle a single accepted client until it disconnects.
    async fn serve_connection(&self, stream: TcpStream, peer: SocketAddr) {
        info!(peer = %peer.ip(), "Accepted connection");

        let handle = match self.store.open(self.echo_chunk).await {
            Ok(handle) => handle,
            Err(e) => {
                log_session_error(peer, &e);
                return;
            }
        };

        let mut session = Session::new(stream, peer, handle, self.recv_chunk);
        if let Err(e) = session.run().await {
            log_session_error(peer, &e);
        }
        let stats = session.stats();
        drop(session);

        info!(
            peer = %peer.ip(),
            frames = stats.frames,
            received = stats.bytes_received,
            echoed = stats.bytes_echoed,
            "Closed connection"
        );
    }
}

fn log_session_error(peer: SocketAddr, e: &SessionError) {
    error!(peer = %peer, error = %e, class = %e.class(), "Connection aborted");
}
