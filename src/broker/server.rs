//! Broker process: two handshake listeners plus the discovery responder.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::DiscoveryResponder;
use super::handler::{BrokerState, routes};
use crate::cancel::CancelSignal;
use crate::config::BrokerConfig;
use crate::error::RelayError;

/// A bound, not yet serving, relay broker.
#[derive(Debug)]
pub struct BrokerServer {
    loopback: TcpListener,
    lan: TcpListener,
    discovery: DiscoveryResponder,
    hub_path: String,
    state: BrokerState,
}

/// Addresses the broker actually bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    /// Loopback/emulator handshake listener.
    pub loopback: SocketAddr,
    /// Physical-device handshake listener.
    pub lan: SocketAddr,
    /// UDP discovery responder.
    pub discovery: SocketAddr,
}

impl BrokerServer {
    /// Binds all three listening points.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if any address cannot be bound.
    pub async fn bind(config: &BrokerConfig) -> Result<Self, RelayError> {
        let loopback = TcpListener::bind(config.loopback_addr).await?;
        let lan = TcpListener::bind(config.lan_addr).await?;
        let discovery = DiscoveryResponder::bind(config.discovery_addr).await?;
        Ok(Self {
            loopback,
            lan,
            discovery,
            hub_path: config.hub_path.clone(),
            state: BrokerState::new(CancelSignal::new()),
        })
    }

    /// Addresses actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if a socket has no local address.
    pub fn local_addrs(&self) -> Result<BoundAddrs, RelayError> {
        Ok(BoundAddrs {
            loopback: self.loopback.local_addr()?,
            lan: self.lan.local_addr()?,
            discovery: self.discovery.local_addr()?,
        })
    }

    /// Shared state, including the peer registry.
    #[must_use]
    pub fn state(&self) -> &BrokerState {
        &self.state
    }

    /// Serves until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if either HTTP listener fails.
    pub async fn serve(self, shutdown: CancelSignal) -> Result<(), RelayError> {
        let addrs = self.local_addrs()?;
        let router = Router::new()
            .merge(routes(&self.hub_path))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        let responder = tokio::spawn(self.discovery.run(shutdown.clone()));
        tracing::info!(
            loopback = %addrs.loopback,
            lan = %addrs.lan,
            discovery = %addrs.discovery,
            hub = %self.hub_path,
            "relay broker listening"
        );

        let peers_shutdown = self.state.shutdown.clone();
        let stop_loopback = shutdown.clone();
        let stop_lan = shutdown.clone();
        let loopback = axum::serve(self.loopback, router.clone())
            .with_graceful_shutdown(async move { stop_loopback.cancelled().await });
        let lan = axum::serve(self.lan, router)
            .with_graceful_shutdown(async move { stop_lan.cancelled().await });
        let close_peers = async move {
            shutdown.cancelled().await;
            peers_shutdown.cancel();
            Ok::<(), std::io::Error>(())
        };

        let served = tokio::try_join!(loopback.into_future(), lan.into_future(), close_peers);
        responder.abort();
        served?;
        tracing::info!("relay broker stopped");
        Ok(())
    }
}
