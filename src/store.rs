//! Persistent append-only store.
//!
//! One file on disk holds every completed frame from every connection in
//! completion order. Each session opens its own handle; sessions never
//! overlap, so handles never race.

use crate::error::SessionError;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Permission bits for a newly created store file.
const STORE_MODE: u32 = 0o644;

/// Location of the shared store.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the store for one session, creating it if missing.
    pub async fn open(&self, echo_chunk: usize) -> Result<StoreHandle, SessionError> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .mode(STORE_MODE)
            .open(&self.path)
            .await
            .map_err(|e| SessionError::OpenStore(self.path.clone(), e))?;

        Ok(StoreHandle {
            file,
            echo_chunk: echo_chunk.max(1),
        })
    }

    /// Delete the store file.
    ///
    /// Returns `Ok(false)` if there was nothing to delete.
    pub async fn remove(&self) -> io::Result<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// An open read/append handle on the store.
#[derive(Debug)]
pub struct StoreHandle {
    file: File,
    echo_chunk: usize,
}

impl StoreHandle {
    /// Append `bytes` in full.
    pub async fn append(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.file
            .write_all(bytes)
            .await
            .map_err(SessionError::WriteStore)?;
        self.file.flush().await.map_err(SessionError::WriteStore)?;
        trace!(len = bytes.len(), "Appended to store");
        Ok(())
    }

    /// Stream the whole store to `writer`, then restore the end position.
    ///
    /// Returns the number of bytes sent.
    pub async fn replay_to<W>(&mut self, writer: &mut W) -> Result<u64, SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        self.file
            .seek(SeekFrom::Start(0))
            .await
            .map_err(SessionError::Seek)?;

        let sent = copy_chunked(&mut self.file, writer, self.echo_chunk).await?;

        self.file
            .seek(SeekFrom::End(0))
            .await
            .map_err(SessionError::Seek)?;

        Ok(sent)
    }
}

async fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, chunk: usize) -> Result<u64, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk];
    let mut sent = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(SessionError::ReadStore)?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(SessionError::Send)?;
        sent += n as u64;
    }

    writer.flush().await.map_err(SessionError::Send)?;
    Ok(sent)
}
