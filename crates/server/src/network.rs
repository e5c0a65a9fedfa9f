//! Local network address discovery for the startup banner.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// TEST-NET-1 address used only to pick a route; nothing is sent.
const PROBE_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 80);

/// The IPv4 address the host would use to reach the wider network.
///
/// Connecting a UDP socket performs route selection without sending a
/// packet; the socket's local address is then the primary interface.
pub fn primary_ipv4() -> io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(PROBE_ADDR)?;

    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Ok(ip),
        other => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no usable non-loopback IPv4 address (got {other})"),
        )),
    }
}

/// [`primary_ipv4`], falling back to loopback with a warning.
pub fn advertised_ipv4() -> Ipv4Addr {
    primary_ipv4().unwrap_or_else(|e| {
        tracing::warn!("Could not determine local network address, using 127.0.0.1: {}", e);
        Ipv4Addr::LOCALHOST
    })
}

/// URL clients on the network should open.
pub fn server_url(ip: Ipv4Addr, port: u16) -> String {
    format!("http://{ip}:{port}/")
}
