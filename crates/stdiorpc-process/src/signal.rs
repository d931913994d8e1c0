use std::process::Child;

/// Ask the child to shut down.
///
/// On Unix this delivers `SIGTERM`; elsewhere there is no graceful request,
/// so the process is killed outright.
#[cfg(unix)]
pub(crate) fn request_termination(child: &mut Child) -> std::io::Result<()> {
    let pid = child.id() as libc::pid_t;

    // SAFETY: `kill` takes plain integers and has no memory-safety
    // preconditions. The pid belongs to a child this process has not reaped
    // yet, so it cannot have been recycled for an unrelated process.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone, waiting for the reaper.
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
pub(crate) fn request_termination(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}
