//! Opening channels: raw reachability probes and full handshakes.
//!
//! [`Connector`] is the seam between the session/discovery logic and the
//! network. [`WsConnector`] is the production implementation over TCP and
//! `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{Channel, Dispatcher, Endpoint};
use crate::error::RelayError;
use crate::protocol::PeerRole;

/// Opens channels to a broker.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Raw connect probe: `true` if `addr` accepts a TCP connection within
    /// `timeout`. The probe connection is closed immediately.
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> bool;

    /// Full channel handshake announcing `role`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Handshake`] if the endpoint refuses or the
    /// handshake does not complete.
    async fn handshake(
        &self,
        endpoint: &Endpoint,
        role: PeerRole,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Channel, RelayError>;
}

/// WebSocket connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    handshake_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector bounding each handshake by `handshake_timeout`.
    #[must_use]
    pub const fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }

    async fn handshake(
        &self,
        endpoint: &Endpoint,
        role: PeerRole,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Channel, RelayError> {
        let url = endpoint.url(role);
        let (ws, _) = tokio::time::timeout(
            self.handshake_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| RelayError::Handshake(format!("{url}: timed out")))?
        .map_err(|e| RelayError::Handshake(format!("{url}: {e}")))?;

        tracing::debug!(%endpoint, %role, "channel handshake complete");
        Ok(Channel::spawn(ws, endpoint.clone(), dispatcher))
    }
}
