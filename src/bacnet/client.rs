//! BACnet/IP UDP transport.
//!
//! One socket per engine run: bind the preferred port, then walk the
//! conventional BACnet range, advancing only when the port is busy.
//! Requests and replies are correlated by invoke id; stray datagrams are
//! decoded and ignored.

use crate::bacnet::codec::apdu::{self, Apdu, IAm, ReadPropertyAck};
use crate::bacnet::codec::bvlc::BvlcFunction;
use crate::bacnet::codec::{build_datagram, parse_datagram};
use crate::bacnet::{ObjectId, PropertyId};
use crate::core::config::NetworkConfig;
use crate::core::error::{BacexError, BacexResult};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

/// First port of the conventional BACnet/IP range.
pub const BACNET_PORT_BASE: u16 = 47808;
/// Last port tried during fallback.
pub const BACNET_PORT_LAST: u16 = 47820;

const MAX_DATAGRAM: usize = 1500;

/// Outcome of the local-port selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSelection {
    /// Port the socket ended up bound to.
    pub port: u16,
    /// Ports tried, in order, including the selected one.
    pub tried: Vec<u16>,
}

/// A discovered peer announcement.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub source: SocketAddr,
    pub iam: IAm,
}

/// BACnet/IP client socket.
pub struct BacnetClient {
    socket: UdpSocket,
    selection: PortSelection,
    broadcast: SocketAddr,
    read_timeout: Duration,
    read_retries: u32,
    next_invoke: u8,
}

impl BacnetClient {
    /// Bind a client socket according to the network configuration.
    pub async fn bind(config: &NetworkConfig) -> BacexResult<Self> {
        let (bind_ip, broadcast_ip) = resolve_interface(config.local_interface.as_deref())?;

        let mut candidates = vec![config.port];
        for p in BACNET_PORT_BASE..=BACNET_PORT_LAST {
            if !candidates.contains(&p) {
                candidates.push(p);
            }
        }

        let mut tried = Vec::new();
        let mut last_err = None;
        for port in candidates {
            tried.push(port);
            match UdpSocket::bind(SocketAddr::new(bind_ip, port)).await {
                Ok(socket) => {
                    socket.set_broadcast(true)?;
                    tracing::debug!(port, tried = ?tried, "BACnet socket bound");
                    return Ok(Self {
                        socket,
                        broadcast: SocketAddr::new(broadcast_ip, port),
                        selection: PortSelection { port, tried },
                        read_timeout: Duration::from_millis(config.read_timeout_ms),
                        read_retries: config.read_retries,
                        next_invoke: 0,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    last_err = Some(e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(?tried, error = ?last_err, "no BACnet port available");
        Err(BacexError::PortsExhausted { tried })
    }

    /// The local-port selection made at bind time.
    pub fn port_selection(&self) -> &PortSelection {
        &self.selection
    }

    /// Broadcast a Who-Is and collect announcements for `window`.
    ///
    /// Replies are deduplicated by (source address, device instance); the
    /// last announcement wins.
    pub async fn who_is(&mut self, window: Duration) -> BacexResult<Vec<Announcement>> {
        let frame = build_datagram(
            BvlcFunction::OriginalBroadcast,
            false,
            &apdu::encode_who_is(None, None),
        );
        self.socket.send_to(&frame, self.broadcast).await?;

        let mut found: Vec<Announcement> = Vec::new();
        let deadline = Instant::now() + window;
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let (len, source) = match timeout(remaining, self.socket.recv_from(&mut buf)).await {
                Ok(Ok(received)) => received,
                Ok(Err(e)) if is_bounced_send(&e) => continue,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            };
            match parse_datagram(&buf[..len]) {
                Ok(Some(Apdu::IAm(iam))) => {
                    let key = (source, iam.device.instance);
                    if let Some(existing) = found
                        .iter_mut()
                        .find(|a| (a.source, a.iam.device.instance) == key)
                    {
                        existing.iam = iam;
                    } else {
                        found.push(Announcement { source, iam });
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(%source, error = %e, "ignoring undecodable datagram");
                }
            }
        }

        Ok(found)
    }

    /// Read one property from a peer, with timeout and bounded retries.
    pub async fn read_property(
        &mut self,
        peer: SocketAddr,
        object: ObjectId,
        property: PropertyId,
        array_index: Option<u32>,
    ) -> BacexResult<ReadPropertyAck> {
        let invoke_id = self.next_invoke;
        self.next_invoke = self.next_invoke.wrapping_add(1);

        let frame = build_datagram(
            BvlcFunction::OriginalUnicast,
            true,
            &apdu::encode_read_property(invoke_id, object, property, array_index),
        );

        let attempts = self.read_retries + 1;
        let mut buf = [0u8; MAX_DATAGRAM];

        for _attempt in 0..attempts {
            if let Err(e) = self.socket.send_to(&frame, peer).await {
                if is_bounced_send(&e) {
                    continue;
                }
                return Err(e.into());
            }

            let deadline = Instant::now() + self.read_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let (len, source) = match timeout(remaining, self.socket.recv_from(&mut buf)).await
                {
                    Ok(Ok(received)) => received,
                    Ok(Err(e)) if is_bounced_send(&e) => continue,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => break,
                };
                if source.ip() != peer.ip() {
                    continue;
                }
                match parse_datagram(&buf[..len]) {
                    Ok(Some(Apdu::ReadPropertyAck { invoke_id: id, ack })) if id == invoke_id => {
                        return Ok(ack);
                    }
                    Ok(Some(Apdu::Error {
                        invoke_id: id,
                        class,
                        code,
                        ..
                    })) if id == invoke_id => {
                        return Err(BacexError::DeviceError { class, code });
                    }
                    Ok(Some(Apdu::Reject {
                        invoke_id: id,
                        reason,
                    })) if id == invoke_id => {
                        return Err(BacexError::Rejected { reason });
                    }
                    Ok(Some(Apdu::Abort {
                        invoke_id: id,
                        reason,
                    })) if id == invoke_id => {
                        return Err(BacexError::Aborted { reason });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(%source, error = %e, "ignoring undecodable datagram");
                    }
                }
            }
        }

        Err(BacexError::ReadTimeout {
            target: format!("{peer} {object} {property}"),
            attempts,
        })
    }
}

/// ICMP unreachable from an earlier send surfaces as a receive error on
/// some platforms; the peer simply isn't listening, which the timeout
/// already accounts for.
fn is_bounced_send(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::ConnectionReset
    )
}

/// Resolve the configured interface selector into (bind, broadcast) IPs.
///
/// A bare IP binds that address and broadcasts to the limited broadcast
/// address. An IP/CIDR additionally directs broadcasts at the subnet
/// broadcast address.
fn resolve_interface(selector: Option<&str>) -> BacexResult<(IpAddr, IpAddr)> {
    let Some(selector) = selector else {
        return Ok((
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V4(Ipv4Addr::BROADCAST),
        ));
    };

    let mut parts = selector.splitn(2, '/');
    let ip_part = parts.next().unwrap_or(selector).trim();
    let ip: IpAddr = ip_part
        .parse()
        .map_err(|_| BacexError::malformed(format!("bad interface selector: {selector}")))?;

    let broadcast = match (ip, parts.next()) {
        (IpAddr::V4(v4), Some(prefix)) => {
            let bits: u32 = prefix
                .trim()
                .parse()
                .map_err(|_| BacexError::malformed(format!("bad CIDR prefix: {selector}")))?;
            if bits > 32 {
                return Err(BacexError::malformed(format!("bad CIDR prefix: {selector}")));
            }
            let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
            IpAddr::V4(Ipv4Addr::from(u32::from(v4) | !mask))
        }
        _ => IpAddr::V4(Ipv4Addr::BROADCAST),
    };

    Ok((ip, broadcast))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interface_binds_all() {
        let (bind, broadcast) = resolve_interface(None).expect("resolve");
        assert_eq!(bind, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(broadcast, IpAddr::V4(Ipv4Addr::BROADCAST));
    }

    #[test]
    fn cidr_selector_computes_subnet_broadcast() {
        let (bind, broadcast) = resolve_interface(Some("192.168.10.25/24")).expect("resolve");
        assert_eq!(bind, "192.168.10.25".parse::<IpAddr>().unwrap());
        assert_eq!(broadcast, "192.168.10.255".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn bare_ip_uses_limited_broadcast() {
        let (_, broadcast) = resolve_interface(Some("10.0.0.5")).expect("resolve");
        assert_eq!(broadcast, IpAddr::V4(Ipv4Addr::BROADCAST));
    }

    #[test]
    fn bad_selector_is_an_error() {
        assert!(resolve_interface(Some("not-an-ip")).is_err());
        assert!(resolve_interface(Some("10.0.0.5/40")).is_err());
    }
}
