//! Session State Machine and its ready signal.

pub mod machine;
pub mod state;

pub use machine::{Locator, RESTORED_MESSAGE, Session, SessionTiming};
pub use state::{ConnectionState, ReadySignal};
