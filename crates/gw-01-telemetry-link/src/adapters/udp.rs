//! # UDP Link
//!
//! `udpin` binds locally and learns the vehicle's address from the first
//! datagram it receives. `udpout` sends to a fixed peer.

use super::codec::LinkCodec;
use shared_types::{EndpointKind, LinkConnection, LinkConnector, LinkEndpoint, LinkError, LinkMessage};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use tracing::debug;

const MAX_DATAGRAM: usize = 65_535;

/// Opens UDP links framed by `C`.
#[derive(Debug, Clone, Default)]
pub struct UdpLinkConnector<C> {
    codec: C,
}

impl<C: LinkCodec + Clone> UdpLinkConnector<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }
}

impl<C: LinkCodec + Clone> LinkConnector for UdpLinkConnector<C> {
    fn connect(&self, endpoint: &LinkEndpoint) -> Result<Box<dyn LinkConnection>, LinkError> {
        let addr: SocketAddr = endpoint
            .address
            .parse()
            .map_err(|_| LinkError::UnsupportedEndpoint(endpoint.to_string()))?;
        let (socket, peer) = match endpoint.kind {
            EndpointKind::UdpIn => (UdpSocket::bind(addr)?, None),
            EndpointKind::UdpOut => {
                let local: SocketAddr = if addr.is_ipv4() {
                    SocketAddr::from(([0, 0, 0, 0], 0))
                } else {
                    SocketAddr::from(([0u16; 8], 0))
                };
                (UdpSocket::bind(local)?, Some(addr))
            }
            _ => return Err(LinkError::UnsupportedEndpoint(endpoint.to_string())),
        };
        socket.set_nonblocking(true)?;
        debug!(endpoint = %endpoint, local = ?socket.local_addr().ok(), "UDP link open");
        Ok(Box::new(UdpLink {
            socket: Some(socket),
            peer,
            codec: self.codec.clone(),
            endpoint: endpoint.clone(),
            buf: vec![0; MAX_DATAGRAM],
        }))
    }
}

struct UdpLink<C> {
    socket: Option<UdpSocket>,
    peer: Option<SocketAddr>,
    codec: C,
    endpoint: LinkEndpoint,
    buf: Vec<u8>,
}

impl<C: LinkCodec> LinkConnection for UdpLink<C> {
    fn try_recv(&mut self) -> Result<Option<LinkMessage>, LinkError> {
        let socket = self.socket.as_ref().ok_or(LinkError::Closed)?;
        match socket.recv_from(&mut self.buf) {
            Ok((len, from)) => {
                if self.peer.is_none() {
                    debug!(peer = %from, "Learned vehicle address");
                    self.peer = Some(from);
                }
                let message = self.codec.decode(&self.buf[..len])?;
                Ok(Some(message.captured_now()))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn send(&mut self, message: &LinkMessage) -> Result<(), LinkError> {
        let socket = self.socket.as_ref().ok_or(LinkError::Closed)?;
        let peer = self
            .peer
            .ok_or_else(|| LinkError::Io("no vehicle address known yet".into()))?;
        let frame = self.codec.encode(message)?;
        socket.send_to(&frame, peer)?;
        Ok(())
    }

    fn endpoint(&self) -> &LinkEndpoint {
        &self.endpoint
    }

    fn close(&mut self) {
        self.socket = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::JsonCodec;
    use shared_types::DEFAULT_BAUD;
    use std::time::{Duration, Instant};

    fn recv_within(conn: &mut dyn LinkConnection, timeout: Duration) -> Option<LinkMessage> {
        let end = Instant::now() + timeout;
        while Instant::now() < end {
            if let Some(msg) = conn.try_recv().unwrap() {
                return Some(msg);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        None
    }

    #[test]
    fn test_udpout_to_udpin_exchange() {
        let connector = UdpLinkConnector::new(JsonCodec);
        let vehicle_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let vehicle_addr = vehicle_socket.local_addr().unwrap();

        let endpoint = LinkEndpoint::parse(&format!("udpout:{vehicle_addr}"), DEFAULT_BAUD).unwrap();
        let mut link = connector.connect(&endpoint).unwrap();
        link.send(&LinkMessage::new(0, "HEARTBEAT")).unwrap();

        let mut buf = [0u8; 2048];
        vehicle_socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let (len, gateway_addr) = vehicle_socket.recv_from(&mut buf).unwrap();
        assert!(JsonCodec.decode(&buf[..len]).unwrap().is_heartbeat());

        let reply = JsonCodec.encode(&LinkMessage::new(30, "ATTITUDE")).unwrap();
        vehicle_socket.send_to(&reply, gateway_addr).unwrap();
        let got = recv_within(link.as_mut(), Duration::from_secs(2)).unwrap();
        assert_eq!(got.msg_type, "ATTITUDE");
        assert!(got.captured_at.is_some());
    }

    #[test]
    fn test_udpin_cannot_send_before_peer_known() {
        let connector = UdpLinkConnector::new(JsonCodec);
        let endpoint = LinkEndpoint::parse("udpin:127.0.0.1:0", DEFAULT_BAUD).unwrap();
        let mut link = connector.connect(&endpoint).unwrap();
        assert!(matches!(
            link.send(&LinkMessage::new(0, "HEARTBEAT")),
            Err(LinkError::Io(_))
        ));
        assert!(link.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_rejects_non_udp() {
        let connector = UdpLinkConnector::new(JsonCodec);
        let endpoint = LinkEndpoint::parse("tcp:127.0.0.1:5760", DEFAULT_BAUD).unwrap();
        assert!(matches!(
            connector.connect(&endpoint),
            Err(LinkError::UnsupportedEndpoint(_))
        ));
    }

    #[test]
    fn test_closed_link() {
        let connector = UdpLinkConnector::new(JsonCodec);
        let endpoint = LinkEndpoint::parse("udpin:127.0.0.1:0", DEFAULT_BAUD).unwrap();
        let mut link = connector.connect(&endpoint).unwrap();
        link.close();
        assert_eq!(link.try_recv().unwrap_err(), LinkError::Closed);
    }
}
