//! UDP transport.
//!
//! Thin wrapper over a tokio `UdpSocket`. Datagrams are received into a
//! buffer sized for the largest UDP payload so oversized datagrams are seen at
//! their real length and rejected by the codec instead of being silently
//! truncated by the kernel.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::error::CollectorError;

/// Largest possible UDP payload
pub const RECV_BUFFER_SIZE: usize = 65_536;

/// UDP socket the collector listens on.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind a UDP socket to `address`.
    pub async fn bind(address: &str) -> Result<Self, CollectorError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| CollectorError::Config(format!("invalid bind address '{address}': {e}")))?;

        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| CollectorError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("UDP transport bound to {}", addr);

        Ok(Self { socket })
    }

    /// Receive one datagram into `buf`.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), CollectorError> {
        self.socket
            .recv_from(buf)
            .await
            .map_err(|e| CollectorError::Transport(format!("receive failed: {e}")))
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, CollectorError> {
        self.socket
            .local_addr()
            .map_err(|e| CollectorError::Transport(format!("failed to get local address: {e}")))
    }
}
