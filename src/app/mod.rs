//! Application side: live pages, the UI executor and the Update Applier.
//!
//! The host supplies [`Page`], [`Application`] and [`CodeLoader`]
//! implementations and runs a [`UiQueue`] on its UI thread. [`AppClient`]
//! ties them to an application [`Session`](crate::session::Session).

pub mod applier;
pub mod client;
pub mod entry;
pub mod live_set;
pub mod page;
pub mod ui_thread;

#[cfg(test)]
pub(crate) mod testing;

pub use applier::{Applier, EnvelopeSink};
pub use client::AppClient;
pub use entry::{CodeLoader, Composition, EntryRegistry, EntryTag, LoadedUnit, MainFactory, RootFactory};
pub use live_set::{InstanceKey, LiveInstanceSet};
pub use page::{Application, Page, ReloadHook};
pub use ui_thread::{UiHandle, UiQueue, ui_channel};
