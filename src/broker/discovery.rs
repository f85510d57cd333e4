//! UDP discovery responder.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::cancel::CancelSignal;
use crate::error::RelayError;
use crate::protocol::{DISCOVERY_ACK, DISCOVERY_REQUEST};

/// Answers discovery datagrams with the acknowledgement token. Stateless.
#[derive(Debug)]
pub struct DiscoveryResponder {
    socket: UdpSocket,
}

impl DiscoveryResponder {
    /// Binds the responder.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self, RelayError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    /// Address the responder is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.socket.local_addr()?)
    }

    /// Answers requests until `shutdown` fires.
    pub async fn run(self, shutdown: CancelSignal) {
        let mut buf = [0u8; 256];
        loop {
            let received = tokio::select! {
                () = shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };
            let (len, from) = match received {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!(error = %e, "discovery receive failed");
                    continue;
                }
            };
            let Some(datagram) = buf.get(..len) else {
                continue;
            };
            if !contains(datagram, DISCOVERY_REQUEST) {
                tracing::debug!(%from, len, "ignoring unknown datagram");
                continue;
            }
            match self.socket.send_to(DISCOVERY_ACK, from).await {
                Ok(_) => tracing::debug!(%from, "answered discovery request"),
                Err(e) => tracing::warn!(%from, error = %e, "discovery reply failed"),
            }
        }
        tracing::debug!("discovery responder stopped");
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
