//! Discovery of the address remote peers use to reach this host.
//!
//! A UDP socket is "connected" to a public address; no datagram is sent, but
//! the OS picks the outgoing interface from the routing table and reports it
//! as the socket's local address.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use thiserror::Error;

/// Probe destination used to select the outbound route.
pub const DEFAULT_PROBE: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Error getting local IP address")]
    Socket(#[from] io::Error),

    #[error("Error getting local IP address: no route to {0}")]
    NoRoute(SocketAddr),
}

/// Address printed in the announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachableAddress {
    Ip(IpAddr),
    Localhost,
}

impl ReachableAddress {
    /// Host part for a URL; IPv6 addresses are bracketed.
    pub fn host(&self) -> String {
        match self {
            ReachableAddress::Ip(IpAddr::V6(ip)) => format!("[{}]", ip),
            ReachableAddress::Ip(ip) => ip.to_string(),
            ReachableAddress::Localhost => "localhost".to_string(),
        }
    }
}

impl fmt::Display for ReachableAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host())
    }
}

/// Local address the OS would use to reach the public internet.
pub fn resolve_outbound_local_address() -> Result<IpAddr, AddressError> {
    resolve_with_probe(DEFAULT_PROBE)
}

/// Local address the OS would use to reach `probe`.
pub fn resolve_with_probe(probe: SocketAddr) -> Result<IpAddr, AddressError> {
    let bind_addr = if probe.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr)?;
    socket.connect(probe)?;

    let ip = socket.local_addr()?.ip();
    if ip.is_unspecified() {
        return Err(AddressError::NoRoute(probe));
    }

    tracing::debug!(%ip, %probe, "Resolved outbound local address");
    Ok(ip)
}
