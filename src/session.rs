//! Connection session state machine.
//!
//! ```text
//!            chunk w/o newline                 frame complete
//!           +-----------------+          +-----------------------+
//!           v                 |          |                       v
//!      RECEIVING -------------+----------+                   ECHOING
//!           |   ^                                                |
//!           |   +------------- store repositioned to end --------+
//!           |
//!           +-- EOF / error --> CLOSED
//! ```
//!
//! Every received byte lands in the store as soon as it arrives. Each
//! completed frame streams the entire store back to the peer.

use crate::error::SessionError;
use crate::framing;
use crate::store::StoreHandle;
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, trace};

/// Current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for bytes from the peer.
    Receiving,
    /// Streaming the store back after a completed frame.
    Echoing,
    /// Peer closed or an I/O error ended the session.
    Closed,
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub bytes_received: u64,
    pub bytes_echoed: u64,
}

/// A single client connection bound to an open store handle.
pub struct Session<S> {
    stream: S,
    peer: SocketAddr,
    store: StoreHandle,
    buffer: BytesMut,
    recv_chunk: usize,
    state: SessionState,
    stats: SessionStats,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, store: StoreHandle, recv_chunk: usize) -> Self {
        let recv_chunk = recv_chunk.max(1);
        Self {
            stream,
            peer,
            store,
            buffer: BytesMut::with_capacity(recv_chunk),
            recv_chunk,
            state: SessionState::Receiving,
            stats: SessionStats::default(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Drive the session until the peer disconnects or an I/O error occurs.
    ///
    /// The session is `Closed` when this returns, whichever way it ends.
    pub async fn run(&mut self) -> Result<SessionStats, SessionError> {
        let result = self.receive_loop().await;
        self.transition(SessionState::Closed);
        result.map(|()| self.stats)
    }

    async fn receive_loop(&mut self) -> Result<(), SessionError> {
        loop {
            let n = self.receive().await?;
            if n == 0 {
                trace!(peer = %self.peer, "Connection closed by client");
                return Ok(());
            }
            self.process_buffer().await?;
        }
    }

    /// Read at most one chunk into the buffer.
    async fn receive(&mut self) -> Result<usize, SessionError> {
        self.buffer.clear();
        self.buffer.reserve(self.recv_chunk);
        let mut limited = (&mut self.buffer).limit(self.recv_chunk);
        let n = self
            .stream
            .read_buf(&mut limited)
            .await
            .map_err(SessionError::Receive)?;
        self.stats.bytes_received += n as u64;
        Ok(n)
    }

    fn transition(&mut self, next: SessionState) {
        trace!(peer = %self.peer, from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }

    /// Append everything received; echo after each completed frame.
    async fn process_buffer(&mut self) -> Result<(), SessionError> {
        for segment in framing::segments(&self.buffer) {
            self.store.append(segment.bytes).await?;
            if !segment.complete {
                continue;
            }

            self.stats.frames += 1;
            let previous = self.state;
            self.state = SessionState::Echoing;
            trace!(peer = %self.peer, from = ?previous, to = ?self.state, "Session state");
            let sent = self.store.replay_to(&mut self.stream).await?;
            self.stats.bytes_echoed += sent;
            debug!(peer = %self.peer, bytes = sent, "Echoed store");
            trace!(peer = %self.peer, from = ?self.state, to = ?SessionState::Receiving, "Session state");
            self.state = SessionState::Receiving;
        }
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use std::io;
    use tempfile::TempDir;
    use tokio_test::io::Builder;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn temp_store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("aesdsocketdata"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_echo_after_each_frame() {
        let (_dir, store) = temp_store();
        let stream = Builder::new()
            .read(b"hello\n")
            .write(b"hello\n")
            .read(b"world\n")
            .write(b"hello\nworld\n")
            .build();

        let mut session = Session::new(stream, peer(), store.open(1024).await.unwrap(), 1024);
        let stats = session.run().await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.bytes_received, 12);
        assert_eq!(stats.bytes_echoed, 18);
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let (_dir, store) = temp_store();
        let stream = Builder::new()
            .read(b"hel")
            .read(b"lo")
            .read(b"\n")
            .write(b"hello\n")
            .build();

        let mut session = Session::new(stream, peer(), store.open(1024).await.unwrap(), 1024);
        assert_eq!(session.run().await.unwrap().frames, 1);
    }

    #[tokio::test]
    async fn test_many_frames_in_one_read() {
        let (_dir, store) = temp_store();
        let stream = Builder::new()
            .read(b"a\nb\nc")
            .write(b"a\n")
            .write(b"a\nb\n")
            .read(b"\n")
            .write(b"a\nb\nc\n")
            .build();

        let mut session = Session::new(stream, peer(), store.open(1024).await.unwrap(), 1024);
        assert_eq!(session.run().await.unwrap().frames, 3);
        assert_eq!(std::fs::read(store.path()).unwrap(), b"a\nb\nc\n");
    }

    #[tokio::test]
    async fn test_small_receive_chunk() {
        let (_dir, store) = temp_store();
        // With a 2-byte chunk the mock hands out "ab", "c\n", then "d\n".
        let stream = Builder::new()
            .read(b"abc\nd\n")
            .write(b"abc\n")
            .write(b"abc\nd\n")
            .build();

        let mut session = Session::new(stream, peer(), store.open(3).await.unwrap(), 2);
        let stats = session.run().await.unwrap();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.bytes_received, 6);
    }

    #[tokio::test]
    async fn test_partial_frame_is_stored_not_echoed() {
        let (_dir, store) = temp_store();
        let stream = Builder::new().read(b"abc").build();

        let mut session = Session::new(stream, peer(), store.open(1024).await.unwrap(), 1024);
        let stats = session.run().await.unwrap();

        assert_eq!(stats.frames, 0);
        assert_eq!(stats.bytes_echoed, 0);
        assert_eq!(std::fs::read(store.path()).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_binary_payload_waits_for_newline() {
        let (_dir, store) = temp_store();
        let payload = [0u8, 0xff, 0x0d, 0x00, 0x7f];
        let mut framed = payload.to_vec();
        framed.push(b'\n');

        let stream = Builder::new()
            .read(&payload)
            .read(b"\n")
            .write(&framed)
            .build();

        let mut session = Session::new(stream, peer(), store.open(1024).await.unwrap(), 1024);
        assert_eq!(session.run().await.unwrap().frames, 1);
    }

    #[tokio::test]
    async fn test_echo_includes_earlier_content() {
        let (_dir, store) = temp_store();
        std::fs::write(store.path(), b"first\n").unwrap();

        let stream = Builder::new()
            .read(b"second\n")
            .write(b"first\nsecond\n")
            .build();

        let mut session = Session::new(stream, peer(), store.open(1024).await.unwrap(), 1024);
        session.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_error_closes_session() {
        let (_dir, store) = temp_store();
        let stream = Builder::new()
            .read(b"kept")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let mut session = Session::new(stream, peer(), store.open(1024).await.unwrap(), 1024);
        match session.run().await {
            Err(SessionError::Receive(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(std::fs::read(store.path()).unwrap(), b"kept");
    }

    #[tokio::test]
    async fn test_send_error_aborts_session() {
        let (_dir, store) = temp_store();
        let stream = Builder::new()
            .read(b"frame\n")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();

        let mut session = Session::new(stream, peer(), store.open(1024).await.unwrap(), 1024);
        match session.run().await {
            Err(SessionError::Send(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.stats().frames, 1);
    }

    #[tokio::test]
    async fn test_store_write_failure_aborts_session() {
        // Every write to /dev/full fails with ENOSPC.
        let store = Store::new("/dev/full");
        let stream = Builder::new().read(b"x\n").build();

        let mut session = Session::new(stream, peer(), store.open(1024).await.unwrap(), 1024);
        match session.run().await {
            Err(SessionError::WriteStore(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.stats().frames, 0);
        assert_eq!(session.stats().bytes_echoed, 0);
    }
}
