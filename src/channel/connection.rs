//! Persistent, ordered, bidirectional channel to the broker.
//!
//! A [`Channel`] owns two background tasks: a writer draining the outbound
//! queue into the socket and a reader dispatching inbound envelopes through
//! the session's [`Dispatcher`]. Either task ending marks the channel
//! closed, which is the transport-level disconnect event the session
//! watches.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use super::Dispatcher;
use crate::cancel::CancelSignal;
use crate::error::RelayError;
use crate::protocol::{Envelope, PeerRole};

/// Handshake target: socket address plus WebSocket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Address probed and connected to.
    pub addr: SocketAddr,
    /// WebSocket path (e.g. `/hub`).
    pub path: String,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(addr: SocketAddr, path: impl Into<String>) -> Self {
        Self {
            addr,
            path: path.into(),
        }
    }

    /// Returns the handshake URL announcing `role`.
    #[must_use]
    pub fn url(&self, role: PeerRole) -> String {
        format!("ws://{}{}?role={}", self.addr, self.path, role)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.addr, self.path)
    }
}

/// An open channel. Dropping it closes the underlying connection.
#[derive(Debug)]
pub struct Channel {
    endpoint: Endpoint,
    outbound: mpsc::UnboundedSender<Envelope>,
    closed: Arc<watch::Sender<bool>>,
    shutdown: CancelSignal,
}

impl Channel {
    /// Spawns the reader/writer tasks over an established WebSocket.
    pub fn spawn<S>(ws: WebSocketStream<S>, endpoint: Endpoint, dispatcher: Arc<Dispatcher>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();
        let (closed, _) = watch::channel(false);
        let closed = Arc::new(closed);
        let shutdown = CancelSignal::new();

        {
            let closed = Arc::clone(&closed);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                        next = outbound_rx.recv() => {
                            let Some(envelope) = next else { break };
                            let json = match envelope.to_json() {
                                Ok(json) => json,
                                Err(e) => {
                                    tracing::warn!(error = %e, "dropping unserializable envelope");
                                    continue;
                                }
                            };
                            if sink.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                closed.send_replace(true);
            });
        }

        {
            let closed = Arc::clone(&closed);
            let shutdown = shutdown.clone();
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        msg = stream.next() => match msg {
                            Some(Ok(Message::Text(text))) => match Envelope::from_json(text.as_str()) {
                                Ok(envelope) => {
                                    dispatcher.dispatch(envelope).await;
                                }
                                Err(e) => tracing::warn!(error = %e, "ignoring malformed frame"),
                            },
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        }
                    }
                }
                tracing::debug!(%endpoint, "channel reader finished");
                shutdown.cancel();
                closed.send_replace(true);
            });
        }

        Self {
            endpoint,
            outbound,
            closed,
            shutdown,
        }
    }

    /// Creates an in-memory channel whose far end is a [`MemoryPeer`].
    ///
    /// Inbound traffic injected through [`MemoryPeer::deliver`] is dispatched
    /// through `dispatcher` exactly as a network frame would be.
    #[must_use]
    pub fn in_memory(endpoint: Endpoint, dispatcher: Arc<Dispatcher>) -> (Self, MemoryPeer) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let closed = Arc::new(closed);
        let channel = Self {
            endpoint,
            outbound,
            closed: Arc::clone(&closed),
            shutdown: CancelSignal::new(),
        };
        let peer = MemoryPeer {
            sent: outbound_rx,
            closed,
            dispatcher,
        };
        (channel, peer)
    }

    /// Returns the endpoint this channel is connected to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Queues an envelope for sending. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ChannelLost`] if the channel is closed.
    pub fn send(&self, envelope: Envelope) -> Result<(), RelayError> {
        if self.is_closed() {
            return Err(RelayError::ChannelLost);
        }
        self.outbound
            .send(envelope)
            .map_err(|_| RelayError::ChannelLost)
    }

    /// Returns `true` once the transport reported closure.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Completes when the transport reports closure.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Closes the channel from this side.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.closed.send_replace(true);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Far end of an in-memory [`Channel`].
#[derive(Debug)]
pub struct MemoryPeer {
    sent: mpsc::UnboundedReceiver<Envelope>,
    closed: Arc<watch::Sender<bool>>,
    dispatcher: Arc<Dispatcher>,
}

impl MemoryPeer {
    /// Receives the next envelope the channel owner sent.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.sent.recv().await
    }

    /// Returns an already-sent envelope without waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.sent.try_recv().ok()
    }

    /// Delivers an inbound envelope to the channel owner's dispatcher.
    pub async fn deliver(&self, envelope: Envelope) -> bool {
        self.dispatcher.dispatch(envelope).await
    }

    /// Simulates a transport-level disconnect.
    pub fn drop_connection(&self) {
        self.closed.send_replace(true);
    }
}

impl Drop for MemoryPeer {
    fn drop(&mut self) {
        self.closed.send_replace(true);
    }
}
