//! UDP plumbing shared by publishers, subscriptions and the discovery server.
//!
//! - Egress sockets for remote publisher endpoints
//! - Receive sockets with address reuse for subscriptions and [`NetworkServer`]
//!
//! Transport is one datagram per message; nothing here retries or fragments.

pub mod server;

pub use server::{DeviceCallback, NetworkServer, RemoteDevice};

use crate::error::{CapyError, CapyResult};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Resolve `host:port` to the first matching socket address
pub fn resolve(host: &str, port: u16) -> CapyResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| CapyError::network(format!("Failed to resolve {}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| CapyError::network(format!("No address for {}:{}", host, port)))
}

/// Bind a UDP receive socket with `SO_REUSEADDR` set
pub fn bind_reusable(addr: SocketAddr) -> CapyResult<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket
        .bind(&addr.into())
        .map_err(|e| CapyError::network(format!("Failed to bind UDP socket to {}: {}", addr, e)))?;
    Ok(socket.into())
}

/// Unbound-port egress socket of the same family as `target`
pub fn egress_socket_for(target: &SocketAddr) -> CapyResult<UdpSocket> {
    let bind_addr: SocketAddr = if target.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    UdpSocket::bind(bind_addr)
        .map_err(|e| CapyError::network(format!("Failed to create egress socket: {}", e)))
}

/// True for the errors a polling read reports when no datagram is waiting
pub(crate) fn is_idle_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_localhost() {
        let addr = resolve("127.0.0.1", 7000).unwrap();
        assert_eq!(addr.port(), 7000);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_reusable_bind_allows_second_socket() {
        let first = bind_reusable("127.0.0.1:0".parse().unwrap()).unwrap();
        let port = first.local_addr().unwrap().port();
        assert_ne!(port, 0);
        let second = bind_reusable(SocketAddr::from(([127, 0, 0, 1], port)));
        assert!(second.is_ok());
    }

    #[test]
    fn test_idle_errors() {
        assert!(is_idle_error(&std::io::ErrorKind::WouldBlock.into()));
        assert!(!is_idle_error(&std::io::ErrorKind::ConnectionReset.into()));
    }
}
