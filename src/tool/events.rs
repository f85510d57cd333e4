//! Tool-side notifications and their broadcast bus.
//!
//! Every app→tool envelope the [`super::ToolClient`] receives is turned into
//! a [`ToolEvent`] and published on the [`EventBus`]. Editor integrations
//! subscribe to it instead of registering channel handlers.

use tokio::sync::broadcast;

use crate::error::RelayError;
use crate::protocol::{Envelope, Method, codec};

/// Default capacity of the tool event bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Notification raised on the tool side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEvent {
    /// An application instance registered.
    ClientRegistered {
        /// Client id announced by the application.
        client_id: String,
    },
    /// A page became visible in an application.
    PageVisible {
        /// Unit of the page.
        unit: String,
    },
    /// A page stopped being visible.
    PageHidden {
        /// Unit of the page.
        unit: String,
    },
    /// A page applied pushed markup.
    PageApplied {
        /// Unit of the page.
        unit: String,
        /// Markup the application echoed back, decoded.
        markup: String,
    },
    /// An application reloaded a code unit.
    CodeUnitApplied {
        /// Code unit name.
        unit: String,
        /// Version string the unit declares.
        version: String,
    },
    /// An application restored a lost connection.
    Restored {
        /// Free-text message from the application.
        message: String,
    },
    /// An application reported a failure or a diagnostic.
    ExceptionReported {
        /// Free-text report.
        message: String,
    },
}

impl ToolEvent {
    /// Converts an inbound app→tool envelope.
    ///
    /// Returns `Ok(None)` for methods that are not addressed to the tool.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] or [`RelayError::Codec`] if the
    /// arguments do not match the method.
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>, RelayError> {
        let text = |index| envelope.text(index).map(str::to_string);
        let event = match envelope.method {
            Method::RegisterApp => Self::ClientRegistered { client_id: text(0)? },
            Method::PageVisible => Self::PageVisible { unit: text(0)? },
            Method::PageHidden => Self::PageHidden { unit: text(0)? },
            Method::PageApplied => Self::PageApplied {
                unit: text(0)?,
                markup: codec::decompress_text(envelope.bytes(1)?)?,
            },
            Method::CodeUnitApplied => Self::CodeUnitApplied {
                unit: text(0)?,
                version: text(1)?,
            },
            Method::ToolRestored => Self::Restored { message: text(0)? },
            Method::ExceptionReport => Self::ExceptionReported { message: text(0)? },
            Method::RegisterTool
            | Method::UnregisterTool
            | Method::PushPage
            | Method::PushCodeUnit => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Broadcast bus for [`ToolEvent`]s.
///
/// When the ring buffer is full, the oldest events are dropped for lagging
/// receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ToolEvent>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event. Returns the number of receivers reached.
    pub fn publish(&self, event: ToolEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ToolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
