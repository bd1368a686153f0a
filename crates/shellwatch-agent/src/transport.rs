//! UDP transport to the collector.
//!
//! Best effort: one `send` per datagram, no retries, no acknowledgement. The
//! socket is connected so ICMP errors surface as send failures, which the
//! driver counts and otherwise ignores.

use std::{
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
};

use crate::error::AgentError;

/// Connected UDP socket pointing at the collector.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Resolve `collector` and connect an ephemeral socket to it.
    pub fn connect(collector: &str) -> Result<Self, AgentError> {
        let peer = collector
            .to_socket_addrs()
            .map_err(|e| AgentError::Transport(format!("cannot resolve '{collector}': {e}")))?
            .next()
            .ok_or_else(|| AgentError::Transport(format!("'{collector}' has no address")))?;

        let local: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(local)
            .map_err(|e| AgentError::Transport(format!("failed to open socket: {e}")))?;
        socket
            .connect(peer)
            .map_err(|e| AgentError::Transport(format!("failed to connect to {peer}: {e}")))?;

        tracing::debug!("UDP transport connected to {}", peer);

        Ok(Self { socket, peer })
    }

    /// Send one datagram.
    pub fn send(&self, datagram: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(datagram)?;
        if sent == datagram.len() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {sent} of {} bytes", datagram.len()),
            ))
        }
    }

    /// Collector address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sends_to_collector() {
        let collector = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = collector.local_addr().unwrap();

        let transport = UdpTransport::connect(&addr.to_string()).unwrap();
        assert_eq!(transport.peer(), addr);
        transport.send(b"datagram").unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = collector.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"datagram");
    }

    #[test]
    fn unresolvable_collector_is_transport_error() {
        let err = UdpTransport::connect("no-port-here").unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
    }
}
