//! Log sinks.
//!
//! Events go to stderr and to the system log. The syslog sink keeps
//! working after background mode points the standard streams at
//! `/dev/null`.

use std::ffi::{CStr, CString};
use std::io;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const IDENT: &CStr = c"aesdsocket";
const FORMAT: &CStr = c"%s";

/// Install the global subscriber and open the system log.
pub fn init(log_level: &str) -> Syslog {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let syslog = Syslog::open();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(syslog)
                .with_ansi(false)
                .without_time()
                .with_level(false)
                .with_target(false),
        )
        .init();

    syslog
}

/// Handle on the process-wide syslog connection.
#[derive(Debug, Clone, Copy)]
pub struct Syslog {
    _private: (),
}

impl Syslog {
    fn open() -> Self {
        // SAFETY: `IDENT` is a 'static NUL-terminated string, as openlog
        // keeps the pointer for the life of the connection.
        unsafe { libc::openlog(IDENT.as_ptr(), libc::LOG_PID | libc::LOG_CONS, libc::LOG_USER) };
        Self { _private: () }
    }

    /// Close the system log connection.
    pub fn close(self) {
        // SAFETY: no arguments; later syslog calls would reopen implicitly.
        unsafe { libc::closelog() };
    }
}

impl<'a> MakeWriter<'a> for Syslog {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogWriter::new(libc::LOG_INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogWriter::new(priority(meta.level()))
    }
}

/// Map a tracing level onto a syslog priority.
fn priority(level: &Level) -> libc::c_int {
    match *level {
        Level::ERROR => libc::LOG_ERR,
        Level::WARN => libc::LOG_WARNING,
        Level::INFO => libc::LOG_INFO,
        Level::DEBUG | Level::TRACE => libc::LOG_DEBUG,
    }
}

/// Buffers one formatted event and submits it to syslog on drop.
#[derive(Debug)]
pub struct SyslogWriter {
    priority: libc::c_int,
    buf: Vec<u8>,
}

impl SyslogWriter {
    fn new(priority: libc::c_int) -> Self {
        Self {
            priority,
            buf: Vec::new(),
        }
    }

    /// The buffered event as one syslog line.
    fn message(&self) -> Option<CString> {
        let trimmed = self.buf.trim_ascii_end();
        if trimmed.is_empty() {
            return None;
        }
        let line: Vec<u8> = trimmed
            .iter()
            .map(|&b| if b == 0 { b' ' } else { b })
            .collect();
        CString::new(line).ok()
    }
}

impl io::Write for SyslogWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogWriter {
    fn drop(&mut self) {
        if let Some(message) = self.message() {
            // SAFETY: both pointers are NUL-terminated; the message is
            // passed through "%s" so it is never read as a format string.
            unsafe { libc::syslog(self.priority, FORMAT.as_ptr(), message.as_ptr()) };
        }
    }
}
