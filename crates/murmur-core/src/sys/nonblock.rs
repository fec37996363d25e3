//! Blocking-mode flag control (`fcntl(F_GETFL/F_SETFL, O_NONBLOCK)`).

use std::io;
use std::os::fd::AsFd;

use rustix::fs::{OFlags, fcntl_getfl, fcntl_setfl};

/// Whether `fd` is in non-blocking mode.
pub fn is_nonblocking<Fd: AsFd>(fd: Fd) -> io::Result<bool> {
    Ok(fcntl_getfl(fd)?.contains(OFlags::NONBLOCK))
}

/// Switch `fd` in or out of non-blocking mode, leaving other status flags
/// intact. Returns the previous setting.
pub fn set_nonblocking<Fd: AsFd>(fd: Fd, enabled: bool) -> io::Result<bool> {
    let mut flags = fcntl_getfl(&fd)?;
    let previous = flags.contains(OFlags::NONBLOCK);
    if previous != enabled {
        flags.set(OFlags::NONBLOCK, enabled);
        fcntl_setfl(&fd, flags)?;
    }
    Ok(previous)
}
