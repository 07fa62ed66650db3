//! Listening socket setup.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Set `SO_REUSEADDR` and `SO_REUSEPORT` before bind
//! - Hand the reactor a non-blocking `std::net::TcpListener`
//!
//! # Design Decisions
//! - The socket is created through raw calls because both reuse options must
//!   be applied before `bind`, which the std builder cannot express

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::os::fd::AsRawFd;

use nix::errno::Errno;
use nix::sys::socket::{self, sockopt, AddressFamily, Backlog, SockFlag, SockType, SockaddrIn};

/// Error type for listener setup.
#[derive(Debug)]
pub enum ListenerError {
    /// The configured host is not a dotted IPv4 address.
    BadAddress(String),
    /// Socket creation, option, bind, or listen failed.
    Bind(Errno),
    /// Switching the listener to non-blocking mode failed.
    NonBlocking(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::BadAddress(host) => write!(f, "Bad bind address: {}", host),
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::NonBlocking(e) => write!(f, "Failed to set non-blocking: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Bind the ingress socket and return it ready for the reactor's epoll set.
pub fn bind_listener(host: &str, port: u16, backlog: i32) -> Result<TcpListener, ListenerError> {
    let ip: Ipv4Addr = host
        .parse()
        .map_err(|_| ListenerError::BadAddress(host.to_string()))?;

    let fd = socket::socket(
        AddressFamily::Inet,
        SockType::Stream,
        SockFlag::empty(),
        None,
    )
    .map_err(ListenerError::Bind)?;

    socket::setsockopt(&fd, sockopt::ReuseAddr, &true).map_err(ListenerError::Bind)?;
    socket::setsockopt(&fd, sockopt::ReusePort, &true).map_err(ListenerError::Bind)?;

    let addr = SockaddrIn::from(SocketAddrV4::new(ip, port));
    socket::bind(fd.as_raw_fd(), &addr).map_err(ListenerError::Bind)?;
    socket::listen(&fd, Backlog::new(backlog).map_err(ListenerError::Bind)?)
        .map_err(ListenerError::Bind)?;

    let listener = TcpListener::from(fd);
    listener
        .set_nonblocking(true)
        .map_err(ListenerError::NonBlocking)?;

    let local = listener.local_addr().map_err(ListenerError::NonBlocking)?;
    tracing::info!(address = %local, backlog, "Listener bound");

    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    #[test]
    fn binds_an_ephemeral_port_and_accepts() {
        let listener = bind_listener("127.0.0.1", 0, 16).expect("bind");
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).expect("connect");
        client.write_all(b"ping\n").unwrap();

        // Non-blocking accept needs a brief settle.
        let (mut conn, _) = loop {
            match listener.accept() {
                Ok(pair) => break pair,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                Err(e) => panic!("accept: {e}"),
            }
        };
        conn.set_nonblocking(false).unwrap();
        let mut buf = [0u8; 5];
        conn.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping\n");
    }

    #[test]
    fn rejects_a_hostname_that_is_not_an_address() {
        assert!(matches!(
            bind_listener("not-an-ip", 5555, 16),
            Err(ListenerError::BadAddress(_))
        ));
    }

    #[test]
    fn two_listeners_share_a_port_with_reuseport() {
        let first = bind_listener("127.0.0.1", 0, 16).expect("first bind");
        let port = first.local_addr().unwrap().port();
        let _second = bind_listener("127.0.0.1", port, 16).expect("second bind on same port");
    }
}
