//! Discovery Resolver: locating the broker on an unknown network.
//!
//! Three racers share one cancellation signal: the loopback probe
//! (emulators), the broadcast probe (physical devices) and the timeout
//! guard built into [`Resolver::resolve`].

pub mod broadcast;
pub mod loopback;
pub mod resolver;

use std::sync::Arc;

pub use broadcast::BroadcastProbe;
pub use loopback::LoopbackProbe;
pub use resolver::{Resolved, Resolver, Strategy};

use crate::channel::{Connector, Dispatcher};
use crate::config::ClientConfig;
use crate::protocol::PeerRole;

/// Builds the standard resolver: loopback probe plus broadcast probe.
#[must_use]
pub fn standard_resolver(
    config: &ClientConfig,
    role: PeerRole,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<Dispatcher>,
) -> Resolver {
    let loopback = LoopbackProbe::new(
        config.emulator_hosts.clone(),
        config.eager_hosts,
        config.loopback_port,
        config.hub_path.clone(),
        config.probe_timeout,
        role,
        connector,
        dispatcher,
    );
    let broadcast = BroadcastProbe::new(
        config.broadcast_addr,
        config.discovery_port,
        config.lan_port,
        config.hub_path.clone(),
        config.probe_timeout,
    );
    Resolver::new(
        vec![
            Arc::new(loopback) as Arc<dyn Strategy>,
            Arc::new(broadcast) as Arc<dyn Strategy>,
        ],
        config.discovery_budget,
    )
}
