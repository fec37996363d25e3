//! Listening socket setup.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use rustix::net::{AddressFamily, SocketFlags, SocketType, bind, listen, socket_with, sockopt};
use tracing::debug;

use crate::errors::{CoreError, Result};
use crate::sys::nonblock;

/// Create a non-blocking listening TCP socket bound to `addr`.
///
/// Sequence: socket (close-on-exec) → `SO_REUSEADDR` → bind → listen →
/// `O_NONBLOCK`.
pub fn bind_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::INET,
        SocketAddr::V6(_) => AddressFamily::INET6,
    };
    let fd = socket_with(family, SocketType::STREAM, SocketFlags::CLOEXEC, None)?;
    sockopt::set_socket_reuseaddr(&fd, true)?;
    bind(&fd, &addr)?;
    listen(&fd, backlog)?;
    let _ = nonblock::set_nonblocking(&fd, true)?;
    debug!(%addr, backlog, "listening socket ready");
    Ok(TcpListener::from(fd))
}

/// Resolve `host:port` to the first matching socket address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| CoreError::Unresolved {
            host: host.to_string(),
            port,
        })
}

/// Resolve `host:port` and open a listener on it.
pub fn open_listener(host: &str, port: u16, backlog: i32) -> Result<TcpListener> {
    let addr = resolve(host, port)?;
    Ok(bind_listener(addr, backlog)?)
}
