//! Relay Broker: stateless fan-out between connected peers.
//!
//! ```text
//! tool ──┐                       ┌──► app B
//!        ├──► PeerRegistry::fan_out ──► app C
//! app B ─┘   (snapshot, no echo) └──► tool
//! ```
//!
//! The broker answers discovery datagrams, accepts WebSocket handshakes on
//! two listeners and forwards every well-formed text frame to every other
//! peer. It never interprets method names and keeps no state beyond the
//! set of open connections.

pub mod connection;
pub mod discovery;
pub mod handler;
pub mod peer;
pub mod registry;
pub mod server;

pub use discovery::DiscoveryResponder;
pub use handler::BrokerState;
pub use peer::{Peer, PeerId};
pub use registry::PeerRegistry;
pub use server::{BoundAddrs, BrokerServer};
