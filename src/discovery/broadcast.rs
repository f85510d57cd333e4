//! Broadcast probe: finds a broker on the local network.
//!
//! Sends the discovery request datagram to the broadcast address and waits
//! for the acknowledgement token. The send and the receive are two separate
//! bounded waits. The responder's source address is the broker.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::{Resolved, Strategy};
use crate::cancel::CancelSignal;
use crate::channel::Endpoint;
use crate::protocol::{DISCOVERY_ACK, DISCOVERY_REQUEST};

/// UDP broadcast discovery.
#[derive(Debug, Clone)]
pub struct BroadcastProbe {
    target: SocketAddr,
    handshake_port: u16,
    path: String,
    wait: Duration,
}

impl BroadcastProbe {
    /// Creates a probe sending to `broadcast_addr:discovery_port`; a
    /// responder is reported at its own address on `handshake_port`.
    #[must_use]
    pub fn new(
        broadcast_addr: IpAddr,
        discovery_port: u16,
        handshake_port: u16,
        path: impl Into<String>,
        wait: Duration,
    ) -> Self {
        Self {
            target: SocketAddr::new(broadcast_addr, discovery_port),
            handshake_port,
            path: path.into(),
            wait,
        }
    }
}

#[async_trait]
impl Strategy for BroadcastProbe {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn locate(&self, cancel: CancelSignal) -> Option<Resolved> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
        socket.set_broadcast(true).ok()?;

        match tokio::time::timeout(self.wait, socket.send_to(DISCOVERY_REQUEST, self.target)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::debug!(target_addr = %self.target, error = %e, "discovery send failed");
                return None;
            }
            Err(_) => return None,
        }
        if cancel.is_cancelled() {
            return None;
        }

        let mut buf = [0_u8; 64];
        let (len, from) = match tokio::time::timeout(self.wait, socket.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            _ => return None,
        };
        if cancel.is_cancelled() {
            return None;
        }
        if buf.get(..len) != Some(DISCOVERY_ACK) {
            tracing::debug!(%from, "ignoring unexpected discovery reply");
            return None;
        }

        Some(Resolved::Broker(Endpoint::new(
            SocketAddr::new(from.ip(), self.handshake_port),
            self.path.clone(),
        )))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    async fn fake_responder(reply: &'static [u8]) -> SocketAddr {
        let Ok(socket) = UdpSocket::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = socket.local_addr() else {
            panic!("no local addr");
        };
        tokio::spawn(async move {
            let mut buf = [0_u8; 64];
            if let Ok((_, from)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(reply, from).await;
            }
        });
        addr
    }

    fn probe_for(addr: SocketAddr) -> BroadcastProbe {
        BroadcastProbe::new(addr.ip(), addr.port(), 5002, "/hub", Duration::from_millis(300))
    }

    #[tokio::test]
    async fn ack_yields_responder_address() {
        let responder = fake_responder(DISCOVERY_ACK).await;
        let Some(Resolved::Broker(endpoint)) = probe_for(responder).locate(CancelSignal::new()).await
        else {
            panic!("expected broker endpoint");
        };
        assert_eq!(endpoint.addr.ip(), responder.ip());
        assert_eq!(endpoint.addr.port(), 5002);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let responder = fake_responder(b"NoIamNotTheServer").await;
        assert!(probe_for(responder).locate(CancelSignal::new()).await.is_none());
    }

    #[tokio::test]
    async fn silence_times_out() {
        let Ok(silent) = UdpSocket::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = silent.local_addr() else {
            panic!("no local addr");
        };
        let started = std::time::Instant::now();
        assert!(probe_for(addr).locate(CancelSignal::new()).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(silent);
    }
}
