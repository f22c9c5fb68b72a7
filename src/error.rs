//! Error types for server startup and per-connection sessions.
//!
//! Failures fall into three classes: startup failures end the process,
//! session failures end one connection, and accept failures are retried.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

/// How the server reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Log and terminate the process with a non-zero status.
    Fatal,
    /// Log and close the current connection; keep accepting.
    ConnectionAborted,
    /// Log and accept again immediately.
    TransientRetry,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Fatal => f.write_str("fatal"),
            ErrorClass::ConnectionAborted => f.write_str("connection-aborted"),
            ErrorClass::TransientRetry => f.write_str("transient-retry"),
        }
    }
}

/// One-time startup precondition failures.
#[derive(Debug)]
pub enum StartupError {
    Runtime(io::Error),
    Signals(io::Error),
    Socket(io::Error),
    SocketOption(io::Error),
    Bind(SocketAddr, io::Error),
    Listen(io::Error),
    Fork(io::Error),
    Setsid(io::Error),
    Chdir(io::Error),
    Stdio(io::Error),
}

impl StartupError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Fatal
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Runtime(e) => write!(f, "Failed to build runtime: {e}"),
            StartupError::Signals(e) => write!(f, "Failed to set signal handler: {e}"),
            StartupError::Socket(e) => write!(f, "Socket creation failed: {e}"),
            StartupError::SocketOption(e) => write!(f, "Setsockopt failed: {e}"),
            StartupError::Bind(addr, e) => write!(f, "Bind to {addr} failed: {e}"),
            StartupError::Listen(e) => write!(f, "Listen failed: {e}"),
            StartupError::Fork(e) => write!(f, "Fork failed: {e}"),
            StartupError::Setsid(e) => write!(f, "Setsid failed: {e}"),
            StartupError::Chdir(e) => write!(f, "Chdir failed: {e}"),
            StartupError::Stdio(e) => write!(f, "Redirecting standard streams failed: {e}"),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::Runtime(e)
            | StartupError::Signals(e)
            | StartupError::Socket(e)
            | StartupError::SocketOption(e)
            | StartupError::Bind(_, e)
            | StartupError::Listen(e)
            | StartupError::Fork(e)
            | StartupError::Setsid(e)
            | StartupError::Chdir(e)
            | StartupError::Stdio(e) => Some(e),
        }
    }
}

/// Failures that abort a single connection.
#[derive(Debug)]
pub enum SessionError {
    OpenStore(PathBuf, io::Error),
    Receive(io::Error),
    WriteStore(io::Error),
    Seek(io::Error),
    ReadStore(io::Error),
    Send(io::Error),
}

impl SessionError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::ConnectionAborted
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::OpenStore(path, e) => {
                write!(f, "Failed to open {}: {}", path.display(), e)
            }
            SessionError::Receive(e) => write!(f, "Recv failed: {e}"),
            SessionError::WriteStore(e) => write!(f, "Write to store failed: {e}"),
            SessionError::Seek(e) => write!(f, "Seek in store failed: {e}"),
            SessionError::ReadStore(e) => write!(f, "Read from store failed: {e}"),
            SessionError::Send(e) => write!(f, "Send failed: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::OpenStore(_, e)
            | SessionError::Receive(e)
            | SessionError::WriteStore(e)
            | SessionError::Seek(e)
            | SessionError::ReadStore(e)
            | SessionError::Send(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_classes() {
        let startup = StartupError::Listen(io::Error::from(io::ErrorKind::AddrInUse));
        assert_eq!(startup.class(), ErrorClass::Fatal);

        let session = SessionError::Send(io::Error::from(io::ErrorKind::BrokenPipe));
        assert_eq!(session.class(), ErrorClass::ConnectionAborted);
    }

    #[test]
    fn test_display_includes_context() {
        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let err = StartupError::Bind(addr, io::Error::from(io::ErrorKind::AddrInUse));
        assert!(err.to_string().starts_with("Bind to 0.0.0.0:9000 failed"));

        let err = SessionError::OpenStore(
            PathBuf::from("/var/tmp/aesdsocketdata"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("/var/tmp/aesdsocketdata"));
        assert_eq!(ErrorClass::TransientRetry.to_string(), "transient-retry");
    }

    #[test]
    fn test_source_is_io_error() {
        let err = SessionError::WriteStore(io::Error::from(io::ErrorKind::WriteZero));
        let source = err.source().unwrap();
        assert!(source.downcast_ref::<io::Error>().is_some());
    }
}
