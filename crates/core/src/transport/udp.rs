use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use crate::error::Result;
use crate::sink::PacketSink;

/// Default TTL for multicast RTP, enough to cross a couple of routers.
pub const DEFAULT_MULTICAST_TTL: u32 = 4;

/// UDP sink for outbound RTP packet delivery.
///
/// Binds an ephemeral socket of the destination's address family and
/// connects it, so every packet goes to the single configured (unicast or
/// multicast) destination. Datagram loss is not detected or retried.
#[derive(Debug)]
pub struct UdpSink {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpSink {
    /// Connect an ephemeral UDP socket to `destination`.
    pub fn connect(destination: SocketAddr) -> Result<Self> {
        Self::connect_with_ttl(destination, DEFAULT_MULTICAST_TTL)
    }

    /// Connect, setting `multicast_ttl` when the destination is an IPv4
    /// multicast group.
    pub fn connect_with_ttl(destination: SocketAddr, multicast_ttl: u32) -> Result<Self> {
        let local: SocketAddr = match destination.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        if let IpAddr::V4(ip) = destination.ip()
            && ip.is_multicast()
        {
            socket.set_multicast_ttl_v4(multicast_ttl)?;
        }
        socket.connect(destination)?;

        tracing::info!(
            %destination,
            local = %socket.local_addr()?,
            multicast = destination.ip().is_multicast(),
            "UDP sink connected"
        );
        Ok(Self {
            socket,
            destination,
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl PacketSink for UdpSink {
    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.socket.send(packet)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn delivers_packets_to_destination() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let mut sink = UdpSink::connect(receiver.local_addr().unwrap()).unwrap();
        assert_eq!(sink.destination(), receiver.local_addr().unwrap());

        sink.write_packet(&[0x80, 96, 0, 1]).unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x80, 96, 0, 1]);
        assert_eq!(from.port(), sink.local_addr().unwrap().port());
    }
}
