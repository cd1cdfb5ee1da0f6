//! Endpoint connector.
//!
//! Opens a non-blocking, close-on-exec stream socket and issues a connect
//! that is expected to complete asynchronously. The outcome of the connect
//! is never inspected here: a refused or unreachable endpoint surfaces later,
//! when the readiness wait reports the socket and the first read fails.

use std::io;
use std::net::{SocketAddrV4, TcpStream};

use socket2::{Domain, SockAddr, Socket, Type};
use tracing::trace;

use crate::error::ConnectError;

/// Issue a non-blocking connect to `addr`.
///
/// Ownership of the socket passes to the caller immediately.
pub fn connect(addr: SocketAddrV4) -> Result<TcpStream, ConnectError> {
    let socket =
        Socket::new(Domain::IPV4, Type::STREAM, None).map_err(ConnectError::Socket)?;

    socket
        .set_nonblocking(true)
        .map_err(ConnectError::Configure)?;
    socket.set_cloexec(true).map_err(ConnectError::Configure)?;

    match socket.connect(&SockAddr::from(addr)) {
        Ok(()) => trace!(address = %addr, "connected immediately"),
        Err(e) if in_progress(&e) => trace!(address = %addr, "connect in progress"),
        Err(e) => trace!(address = %addr, error = %e, "connect failed early"),
    }

    Ok(TcpStream::from(socket))
}

fn in_progress(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == Some(nix::errno::Errno::EINPROGRESS as i32)
}
