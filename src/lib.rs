//! # live-relay
//!
//! Pushes live UI markup and compiled code from a development tool into a
//! running application, over a local network whose topology is not known
//! in advance.
//!
//! ## Architecture
//!
//! ```text
//! ToolClient (tool/)                       AppClient (app/)
//!     │                                         │
//!     ├── Session (session/) ◄─ retry/reconnect ─┤── Session (session/)
//!     │        │                                 │        │
//!     │        │                        Resolver (discovery/)
//!     │        ▼                                 │        ▼
//!     └── Channel (channel/) ══► BrokerServer (broker/) ◄══ Channel
//!                                 fan-out, no echo
//!                                                │
//!                              Applier ─► LiveInstanceSet / UnitCache
//! ```
//!
//! The broker is stateless: it forwards every envelope from one peer to all
//! other peers. Applications find it by racing loopback probes against a UDP
//! broadcast, reconnect on their own after a lost connection, and apply
//! received updates to every live instance of the affected page.

pub mod app;
pub mod broker;
pub mod cancel;
pub mod channel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod session;
pub mod tool;
pub mod unit;
