//! Transport channel: typed dispatch, WebSocket-backed channel and the
//! connector seam used by discovery and the session.

pub mod connection;
pub mod connector;
pub mod dispatch;

pub use connection::{Channel, Endpoint, MemoryPeer};
pub use connector::{Connector, WsConnector};
pub use dispatch::{Dispatcher, Handler};
