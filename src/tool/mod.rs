//! Tool side: pushes updates, replays them after rebuilds and surfaces
//! application notifications as events.

pub mod client;
pub mod events;
pub mod pid_file;

pub use client::ToolClient;
pub use events::{DEFAULT_EVENT_CAPACITY, EventBus, ToolEvent};
pub use pid_file::BrokerPidFile;
