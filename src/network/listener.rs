//! Listener setup: resolve, bind, listen, non-blocking
//!
//! Kandidat alamat dicoba berurutan, yang pertama berhasil di-bind dipakai.
//! Tanpa host eksplisit: wildcard IPv4 dulu, lalu wildcard IPv6.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::error::{Result, ServerError};

/// Local address candidates in passive-resolution order
pub(crate) fn candidates(port: u16, host: Option<IpAddr>) -> Vec<SocketAddr> {
    match host {
        Some(ip) => vec![SocketAddr::new(ip, port)],
        None => vec![
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
        ],
    }
}

/// Bind the first candidate that accepts, then start listening.
///
/// Ini satu-satunya kondisi fatal di layer network: kalau tidak ada kandidat
/// yang bisa di-bind, atau `listen()` gagal, server tidak bisa jalan.
pub(crate) fn bind_and_listen(port: u16, backlog: i32, host: Option<IpAddr>) -> Result<TcpListener> {
    let mut last_err = None;

    for addr in candidates(port, host) {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = match Socket::new(domain, Type::STREAM, Some(Protocol::TCP)) {
            Ok(s) => s,
            Err(e) => {
                debug!(%addr, error = %e, "socket creation failed, trying next candidate");
                last_err = Some(e);
                continue;
            }
        };

        // Allow immediate rebind after restart (TIME_WAIT)
        if let Err(e) = socket.set_reuse_address(true) {
            last_err = Some(e);
            continue;
        }

        if let Err(e) = socket.bind(&addr.into()) {
            debug!(%addr, error = %e, "bind failed, trying next candidate");
            last_err = Some(e);
            continue;
        }

        socket
            .listen(backlog)
            .map_err(|source| ServerError::Listen { port, source })?;

        set_nonblocking(&socket);

        return Ok(socket.into());
    }

    Err(ServerError::Bind {
        port,
        source: last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no address candidate")
        }),
    })
}

/// Switch a socket to non-blocking mode. Failure is logged, not returned.
#[cfg(unix)]
pub(crate) fn set_nonblocking(socket: &Socket) {
    use std::os::unix::io::AsRawFd;

    let fd = socket.as_raw_fd();

    // SAFETY: fd milik `socket` dan masih terbuka selama pemanggilan ini
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags == -1 {
        warn!(fd, error = %io::Error::last_os_error(), "fcntl(F_GETFL) failed");
        return;
    }

    // SAFETY: sama seperti di atas
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        warn!(fd, error = %io::Error::last_os_error(), "fcntl(F_SETFL) failed");
    }
}

/// Switch a socket to non-blocking mode. Failure is logged, not returned.
#[cfg(not(unix))]
pub(crate) fn set_nonblocking(socket: &Socket) {
    if let Err(e) = socket.set_nonblocking(true) {
        warn!(error = %e, "failed to set non-blocking mode");
    }
}
