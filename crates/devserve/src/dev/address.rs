//! Bind address resolution and bounded port probing.

use crate::error::{Result, ServerError};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, warn};

/// Resolve the configured host to an address to bind.
///
/// Accepts IP literals, `local-ip` (IPv4, else IPv6), `local-ipv4`,
/// `local-ipv6`, `localhost` (always 127.0.0.1) and hostnames, which are
/// looked up and the first IPv4 result preferred.
pub async fn resolve_host(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        return Ok(ip);
    }

    match host {
        "localhost" => Ok(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        "local-ip" => match local_ipv4().await {
            Some(ip) => Ok(ip),
            None => local_ipv6()
                .await
                .ok_or_else(|| ServerError::HostResolution(host.to_string())),
        },
        "local-ipv4" => local_ipv4()
            .await
            .ok_or_else(|| ServerError::HostResolution(host.to_string())),
        "local-ipv6" => local_ipv6()
            .await
            .ok_or_else(|| ServerError::HostResolution(host.to_string())),
        _ => {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
                .await
                .map_err(|_| ServerError::HostResolution(host.to_string()))?
                .collect();
            addrs
                .iter()
                .find(|addr| addr.is_ipv4())
                .or_else(|| addrs.first())
                .map(|addr| addr.ip())
                .ok_or_else(|| ServerError::HostResolution(host.to_string()))
        }
    }
}

/// Address of the interface used for outbound IPv4 traffic.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
async fn local_ipv4() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 80)).await.ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
}

async fn local_ipv6() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0)).await.ok()?;
    socket
        .connect((Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1), 80))
        .await
        .ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
}

/// Bind `ip:port`, moving up one port at a time when it is taken.
///
/// Tries `port` and then up to `retries` following ports. Port 0 asks the OS
/// for any free port and is tried once.
pub async fn bind_with_retries(ip: IpAddr, port: u16, retries: u16) -> Result<TcpListener> {
    let last = if port == 0 {
        0
    } else {
        port.saturating_add(retries)
    };

    for candidate in port..=last {
        let addr = SocketAddr::new(ip, candidate);
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                if candidate != port {
                    warn!(requested = port, using = candidate, "port busy, using next free port");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                debug!(%addr, "port in use");
            }
            Err(e) => {
                return Err(ServerError::Bind {
                    address: addr.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(ServerError::PortExhausted {
        host: ip.to_string(),
        first: port,
        last,
    })
}
