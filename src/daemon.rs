//! Background launch.
//!
//! Runs after the socket is bound and before it listens, and before any
//! runtime threads exist.

use crate::error::StartupError;
use std::ffi::CStr;
use std::io;

const ROOT_DIR: &CStr = c"/";
const DEV_NULL: &CStr = c"/dev/null";

/// Which side of the fork the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The invoking process. It must exit without serving.
    Parent,
    /// The detached process that carries on with startup.
    Child,
}

/// Fork, start a new session, move to `/`, and point the standard
/// streams at `/dev/null`.
pub fn detach() -> Result<Role, StartupError> {
    // SAFETY: called while the process is still single-threaded.
    let pid = unsafe { libc::fork() };
    if pid == -1 {
        return Err(StartupError::Fork(io::Error::last_os_error()));
    }
    if pid != 0 {
        return Ok(Role::Parent);
    }

    // SAFETY: plain syscall in the freshly forked child.
    if unsafe { libc::setsid() } == -1 {
        return Err(StartupError::Setsid(io::Error::last_os_error()));
    }
    // SAFETY: `ROOT_DIR` is a NUL-terminated 'static string.
    if unsafe { libc::chdir(ROOT_DIR.as_ptr()) } == -1 {
        return Err(StartupError::Chdir(io::Error::last_os_error()));
    }
    redirect_std_streams().map_err(StartupError::Stdio)?;

    Ok(Role::Child)
}

fn redirect_std_streams() -> io::Result<()> {
    // SAFETY: `DEV_NULL` is NUL-terminated; descriptors are checked below.
    let null = unsafe { libc::open(DEV_NULL.as_ptr(), libc::O_RDWR) };
    if null == -1 {
        return Err(io::Error::last_os_error());
    }

    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: `null` is an open descriptor and `fd` is a standard stream
        // number; dup2 closes whatever `fd` referred to before.
        if unsafe { libc::dup2(null, fd) } == -1 {
            let err = io::Error::last_os_error();
            // SAFETY: `null` was opened above and is not used after this.
            unsafe { libc::close(null) };
            return Err(err);
        }
    }

    if null > libc::STDERR_FILENO {
        // SAFETY: fds 0-2 now hold their own duplicates, so the original
        // descriptor is no longer needed.
        unsafe { libc::close(null) };
    }
    Ok(())
}
