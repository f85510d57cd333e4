//! Loopback probe: emulator hosts that map to the developer machine.
//!
//! Hosts are kept in priority order; only the first `eager` of them are
//! probed. A reachable host is handshaken directly, bypassing broadcast
//! discovery, and the open channel itself is the result.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Resolved, Strategy};
use crate::cancel::CancelSignal;
use crate::channel::{Connector, Dispatcher, Endpoint};
use crate::protocol::PeerRole;

/// Probes well-known emulator loopback addresses.
#[derive(Debug)]
pub struct LoopbackProbe {
    hosts: Vec<IpAddr>,
    eager: usize,
    port: u16,
    path: String,
    probe_timeout: Duration,
    role: PeerRole,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<Dispatcher>,
}

impl LoopbackProbe {
    /// Creates a probe over `hosts` (priority order), trying the first
    /// `eager` of them on `port`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        hosts: Vec<IpAddr>,
        eager: usize,
        port: u16,
        path: impl Into<String>,
        probe_timeout: Duration,
        role: PeerRole,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            hosts,
            eager,
            port,
            path: path.into(),
            probe_timeout,
            role,
            connector,
            dispatcher,
        }
    }
}

#[async_trait]
impl Strategy for LoopbackProbe {
    fn name(&self) -> &'static str {
        "loopback"
    }

    async fn locate(&self, cancel: CancelSignal) -> Option<Resolved> {
        for host in self.hosts.iter().take(self.eager) {
            if cancel.is_cancelled() {
                return None;
            }
            let addr = SocketAddr::new(*host, self.port);
            if !self.connector.probe(addr, self.probe_timeout).await {
                tracing::debug!(%addr, "loopback host unreachable");
                continue;
            }

            let endpoint = Endpoint::new(addr, self.path.clone());
            match self
                .connector
                .handshake(&endpoint, self.role, Arc::clone(&self.dispatcher))
                .await
            {
                Ok(channel) if cancel.is_cancelled() => {
                    channel.close();
                    return None;
                }
                Ok(channel) => return Some(Resolved::Direct(channel)),
                Err(e) => tracing::debug!(%addr, error = %e, "loopback handshake failed"),
            }
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::channel::{Channel, MemoryPeer};
    use crate::error::RelayError;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recording {
        reachable: Vec<IpAddr>,
        probed: Mutex<Vec<IpAddr>>,
        peers: Mutex<Vec<MemoryPeer>>,
    }

    #[async_trait]
    impl Connector for Recording {
        async fn probe(&self, addr: SocketAddr, _timeout: Duration) -> bool {
            if let Ok(mut probed) = self.probed.lock() {
                probed.push(addr.ip());
            }
            self.reachable.contains(&addr.ip())
        }

        async fn handshake(
            &self,
            endpoint: &Endpoint,
            _role: PeerRole,
            dispatcher: Arc<Dispatcher>,
        ) -> Result<Channel, RelayError> {
            let (channel, peer) = Channel::in_memory(endpoint.clone(), dispatcher);
            if let Ok(mut peers) = self.peers.lock() {
                peers.push(peer);
            }
            Ok(channel)
        }
    }

    fn hosts() -> Vec<IpAddr> {
        vec![
            IpAddr::V4(Ipv4Addr::new(10, 0, 2, 2)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 3, 2)),
        ]
    }

    fn probe(connector: Arc<Recording>, eager: usize) -> LoopbackProbe {
        LoopbackProbe::new(
            hosts(),
            eager,
            5001,
            "/hub",
            Duration::from_millis(300),
            PeerRole::Application,
            connector,
            Arc::new(Dispatcher::new()),
        )
    }

    #[tokio::test]
    async fn only_eager_hosts_are_probed() {
        let connector = Arc::new(Recording {
            reachable: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 3, 2))],
            ..Recording::default()
        });
        let strategy = probe(Arc::clone(&connector), 1);
        assert!(strategy.locate(CancelSignal::new()).await.is_none());
        let probed = connector.probed.lock().map(|p| p.clone()).unwrap_or_default();
        assert_eq!(probed, vec![IpAddr::V4(Ipv4Addr::new(10, 0, 2, 2))]);
    }

    #[tokio::test]
    async fn reachable_host_yields_open_channel() {
        let connector = Arc::new(Recording {
            reachable: hosts(),
            ..Recording::default()
        });
        let strategy = probe(connector, 1);
        let Some(Resolved::Direct(channel)) = strategy.locate(CancelSignal::new()).await else {
            panic!("expected a direct channel");
        };
        assert_eq!(channel.endpoint().addr.port(), 5001);
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn cancelled_before_start_reports_nothing() {
        let connector = Arc::new(Recording {
            reachable: hosts(),
            ..Recording::default()
        });
        let strategy = probe(connector, 2);
        let cancel = CancelSignal::new();
        cancel.cancel();
        assert!(strategy.locate(cancel).await.is_none());
    }
}
