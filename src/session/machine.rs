//! Session State Machine: connect, lose, reconnect.
//!
//! ```text
//! Disconnected ──► Discovering ──► Connected ──► Reconnecting ──► Connected ...
//!                     ▲    │                        ▲    │
//!                     └────┘ retry every interval   └────┘ probe every interval
//! ```
//!
//! A [`Session`] is cheap to clone; every clone drives the same state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use super::{ConnectionState, ReadySignal};
use crate::cancel::CancelSignal;
use crate::channel::{Channel, Connector, Dispatcher, Endpoint};
use crate::config::ClientConfig;
use crate::discovery::{Resolved, Resolver};
use crate::error::RelayError;
use crate::protocol::{Envelope, PeerRole};

/// Message an application sends after a lost connection is restored.
pub const RESTORED_MESSAGE: &str = "Connection was lost. Here I am again.";

/// Where a session looks for the broker.
#[derive(Debug, Clone)]
pub enum Locator {
    /// Race the discovery strategies on every attempt.
    Discover(Resolver),
    /// Handshake a known endpoint directly.
    Fixed(Endpoint),
}

/// Fixed timings of the retry and reconnect loops.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// Wait between failed discovery rounds and between reconnect polls.
    pub retry_interval: Duration,
    /// Bound of each raw connect probe while reconnecting.
    pub probe_timeout: Duration,
}

impl From<&ClientConfig> for SessionTiming {
    fn from(config: &ClientConfig) -> Self {
        Self {
            retry_interval: config.retry_interval,
            probe_timeout: config.probe_timeout,
        }
    }
}

#[derive(Debug)]
struct Inner {
    role: PeerRole,
    peer_id: String,
    locator: Locator,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<Dispatcher>,
    timing: SessionTiming,
    state: watch::Sender<ConnectionState>,
    ready: ReadySignal,
    channel: RwLock<Option<Arc<Channel>>>,
    attempt: Mutex<()>,
    shutdown: CancelSignal,
}

/// Owns the connect / disconnect / reconnect lifecycle of one peer.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Creates a disconnected session.
    ///
    /// `peer_id` is the session or client id announced in the registration
    /// envelope; `dispatcher` receives every inbound envelope of every
    /// channel the session opens.
    #[must_use]
    pub fn new(
        role: PeerRole,
        peer_id: impl Into<String>,
        locator: Locator,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<Dispatcher>,
        timing: SessionTiming,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                role,
                peer_id: peer_id.into(),
                locator,
                connector,
                dispatcher,
                timing,
                state,
                ready: ReadySignal::new(),
                channel: RwLock::new(None),
                attempt: Mutex::new(()),
                shutdown: CancelSignal::new(),
            }),
        }
    }

    /// Role announced by this session.
    #[must_use]
    pub fn role(&self) -> PeerRole {
        self.inner.role
    }

    /// Session or client id announced at registration.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.inner.peer_id
    }

    /// Dispatch table shared by every channel of this session.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Returns `true` while a registered channel is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribes to state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Waits until the session reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == target).await;
    }

    /// Signal settled once the first attempt of [`Session::run`] finished.
    #[must_use]
    pub fn ready(&self) -> &ReadySignal {
        &self.inner.ready
    }

    /// Makes one connection attempt.
    ///
    /// A call while `Connected` (or while the reconnect loop owns recovery)
    /// is a no-op; concurrent calls are serialized so only one attempt runs
    /// at a time. On failure the session stays `Discovering`. An attempt
    /// that completes after [`Session::close`] is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DiscoveryTimeout`] if no broker was found,
    /// [`RelayError::Handshake`] if the handshake failed, or
    /// [`RelayError::ChannelLost`] if the channel closed before registering
    /// or the session was closed meanwhile.
    pub async fn connect(&self) -> Result<(), RelayError> {
        let _attempt = self.inner.attempt.lock().await;
        if self.inner.shutdown.is_cancelled() {
            return Err(RelayError::ChannelLost);
        }
        if matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Reconnecting
        ) {
            return Ok(());
        }

        self.set_state(ConnectionState::Discovering);
        let channel = Arc::new(self.open().await?);
        {
            // close() cancels before taking this lock.
            let mut slot = self.inner.channel.write().await;
            if self.inner.shutdown.is_cancelled() {
                channel.close();
                self.set_state(ConnectionState::Disconnected);
                return Err(RelayError::ChannelLost);
            }
            channel.send(self.registration())?;
            *slot = Some(Arc::clone(&channel));
            self.set_state(ConnectionState::Connected);
        }
        tracing::info!(
            role = %self.inner.role,
            peer_id = %self.inner.peer_id,
            endpoint = %channel.endpoint(),
            "connected to relay broker"
        );

        tokio::spawn(self.clone().supervise(channel));
        Ok(())
    }

    /// Connects, settles the ready signal after the first attempt, then
    /// retries at the fixed interval until connected or closed.
    pub async fn run(&self) {
        let first = self.connect().await;
        self.inner.ready.settle();
        let Err(e) = first else { return };
        tracing::warn!(error = %e, "unable to connect to the relay broker");

        loop {
            tokio::select! {
                () = tokio::time::sleep(self.inner.timing.retry_interval) => {}
                () = self.inner.shutdown.cancelled() => return,
            }
            tracing::info!("trying to connect again");
            match self.connect().await {
                Ok(()) => return,
                Err(e) => tracing::debug!(
                    error = %e,
                    retry_in_ms = self.inner.timing.retry_interval.as_millis() as u64,
                    "unable to connect"
                ),
            }
        }
    }

    /// Spawns [`Session::run`] on the runtime.
    #[must_use]
    pub fn spawn(&self) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run().await })
    }

    /// Sends an envelope over the current channel.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ChannelLost`] unless the session is connected.
    pub async fn send(&self, envelope: Envelope) -> Result<(), RelayError> {
        if !self.is_connected() {
            return Err(RelayError::ChannelLost);
        }
        let guard = self.inner.channel.read().await;
        guard
            .as_ref()
            .ok_or(RelayError::ChannelLost)?
            .send(envelope)
    }

    /// Stops every loop, closes the channel and returns to `Disconnected`.
    /// A closed session does not reconnect.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        if let Some(channel) = self.inner.channel.write().await.take() {
            channel.close();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Marks a failed start: back to `Disconnected`, loops untouched.
    pub(crate) fn mark_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    async fn open(&self) -> Result<Channel, RelayError> {
        match &self.inner.locator {
            Locator::Fixed(endpoint) => self.handshake(endpoint).await,
            Locator::Discover(resolver) => match resolver.resolve().await? {
                Resolved::Direct(channel) => Ok(channel),
                Resolved::Broker(endpoint) => self.handshake(&endpoint).await,
            },
        }
    }

    async fn handshake(&self, endpoint: &Endpoint) -> Result<Channel, RelayError> {
        self.inner
            .connector
            .handshake(endpoint, self.inner.role, Arc::clone(&self.inner.dispatcher))
            .await
    }

    async fn supervise(self, mut channel: Arc<Channel>) {
        loop {
            tokio::select! {
                biased;
                () = self.inner.shutdown.cancelled() => return,
                () = channel.closed() => {}
            }
            {
                let mut slot = self.inner.channel.write().await;
                if self.inner.shutdown.is_cancelled() {
                    return;
                }
                slot.take();
                self.set_state(ConnectionState::Reconnecting);
            }
            let endpoint = channel.endpoint().clone();
            tracing::warn!(%endpoint, "connection with the relay broker has been lost");

            match self.reconnect(&endpoint).await {
                Some(restored) => channel = restored,
                None => return,
            }
        }
    }

    async fn reconnect(&self, endpoint: &Endpoint) -> Option<Arc<Channel>> {
        let timing = self.inner.timing;
        loop {
            if self.inner.shutdown.is_cancelled() {
                return None;
            }
            if self
                .inner
                .connector
                .probe(endpoint.addr, timing.probe_timeout)
                .await
            {
                tracing::info!(%endpoint, "broker reachable, reconnecting");
                match self.handshake(endpoint).await {
                    Ok(channel) => {
                        let channel = Arc::new(channel);
                        let mut slot = self.inner.channel.write().await;
                        if self.inner.shutdown.is_cancelled() {
                            channel.close();
                            return None;
                        }
                        // The notice goes out before the channel is published,
                        // so it precedes any other traffic on it.
                        if channel.send(self.restored_notice()).is_ok() {
                            *slot = Some(Arc::clone(&channel));
                            self.set_state(ConnectionState::Connected);
                            tracing::info!(%endpoint, "connection restored");
                            return Some(channel);
                        }
                    }
                    Err(e) => tracing::warn!(%endpoint, error = %e, "reconnect handshake failed"),
                }
            }

            tracing::debug!(%endpoint, "unable to reconnect, retrying");
            tokio::select! {
                () = tokio::time::sleep(timing.retry_interval) => {}
                () = self.inner.shutdown.cancelled() => return None,
            }
        }
    }

    fn registration(&self) -> Envelope {
        match self.inner.role {
            PeerRole::Tool => Envelope::register_tool(&self.inner.peer_id),
            PeerRole::Application => Envelope::register_app(&self.inner.peer_id),
        }
    }

    fn restored_notice(&self) -> Envelope {
        match self.inner.role {
            PeerRole::Tool => Envelope::register_tool(&self.inner.peer_id),
            PeerRole::Application => Envelope::tool_restored(RESTORED_MESSAGE),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.inner.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "session state changed");
        }
    }
}
