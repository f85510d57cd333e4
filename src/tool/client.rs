//! Tool-side session object.
//!
//! [`ToolClient`] talks to the broker on the loopback handshake endpoint.
//! It remembers the last payload pushed for every page and code unit so
//! that a full rebuild can resynchronize every application in one pass, and
//! turns the application's notifications into [`ToolEvent`]s.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use super::{BrokerPidFile, EventBus, ToolEvent};
use crate::channel::{Connector, Dispatcher, Endpoint, WsConnector};
use crate::config::ClientConfig;
use crate::error::RelayError;
use crate::protocol::{Envelope, Method, PeerRole, codec};
use crate::session::{Locator, Session, SessionTiming};
use crate::unit::{UnitCache, UnitId, UnitKind};

/// Time the broker gets to forward `unregister-tool` before the channel closes.
const UNREGISTER_GRACE: Duration = Duration::from_millis(300);

/// App→tool methods surfaced as [`ToolEvent`]s.
const NOTIFICATIONS: [Method; 7] = [
    Method::RegisterApp,
    Method::PageVisible,
    Method::PageHidden,
    Method::PageApplied,
    Method::CodeUnitApplied,
    Method::ToolRestored,
    Method::ExceptionReport,
];

/// Tool side of the relay.
#[derive(Debug)]
pub struct ToolClient {
    session: Session,
    pushed: UnitCache,
    events: EventBus,
    pid_file: BrokerPidFile,
    broker_executable: Option<PathBuf>,
    launch_delay: Duration,
    broker: Mutex<Option<Child>>,
}

impl ToolClient {
    /// Builds a client for the broker on `127.0.0.1:<loopback_port>`.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        let endpoint = Endpoint::new(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.loopback_port),
            config.hub_path.clone(),
        );
        let connector: Arc<dyn Connector> = Arc::new(WsConnector::default());
        let session = Session::new(
            PeerRole::Tool,
            Uuid::new_v4().to_string(),
            Locator::Fixed(endpoint),
            connector,
            Arc::new(Dispatcher::new()),
            SessionTiming::from(config),
        );
        Self::with_session(session, config)
    }

    /// Builds a client over an existing tool session.
    #[must_use]
    pub fn with_session(session: Session, config: &ClientConfig) -> Self {
        let events = EventBus::default();
        for method in NOTIFICATIONS {
            let events = events.clone();
            session.dispatcher().on(method, move |envelope| {
                let events = events.clone();
                async move { publish(&events, &envelope) }
            });
        }

        Self {
            session,
            pushed: UnitCache::new(),
            events,
            pid_file: BrokerPidFile::new(config.pid_file.clone()),
            broker_executable: config.broker_executable.clone(),
            launch_delay: config.broker_launch_delay,
            broker: Mutex::new(None),
        }
    }

    /// Starts the tool session.
    ///
    /// Terminates a broker left over from a previous run, launches the
    /// configured broker executable if any, then connects and registers.
    /// A failed start is not retried; once started, lost connections are
    /// recovered in the background.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Startup`] if the broker cannot be launched or
    /// the initial handshake fails.
    pub async fn start(&self) -> Result<(), RelayError> {
        let started = self.try_start().await;
        if let Err(e) = &started {
            tracing::error!(error = %e, "tool session failed to start");
            self.session.mark_disconnected();
        }
        started
    }

    async fn try_start(&self) -> Result<(), RelayError> {
        self.pid_file.terminate_stale().await;
        if let Some(executable) = &self.broker_executable {
            self.launch(executable.clone()).await?;
        }
        self.session
            .connect()
            .await
            .map_err(|e| RelayError::Startup(format!("unable to connect to the relay broker: {e}")))?;
        tracing::info!(session_id = %self.session.peer_id(), "tool session started");
        Ok(())
    }

    async fn launch(&self, executable: PathBuf) -> Result<(), RelayError> {
        let mut child = Command::new(&executable)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RelayError::Startup(format!("unable to launch {}: {e}", executable.display()))
            })?;
        let pid = child
            .id()
            .ok_or_else(|| RelayError::Startup("relay broker exited at launch".to_string()))?;
        self.pid_file
            .record(pid)
            .await
            .map_err(|e| RelayError::Startup(e.to_string()))?;

        tokio::time::sleep(self.launch_delay).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(RelayError::Startup(format!("relay broker exited with {status}")));
        }
        tracing::info!(pid, executable = %executable.display(), "relay broker launched");
        *self.broker.lock().await = Some(child);
        Ok(())
    }

    /// Unregisters, closes the session and terminates the broker.
    ///
    /// A stopped client cannot be started again.
    pub async fn stop(&self) {
        if self.session.is_connected() {
            let farewell = Envelope::unregister_tool(self.session.peer_id());
            if let Err(e) = self.session.send(farewell).await {
                tracing::debug!(error = %e, "unregister-tool not sent");
            }
            tokio::time::sleep(UNREGISTER_GRACE).await;
        }
        self.session.close().await;

        if let Some(mut child) = self.broker.lock().await.take() {
            // kill() reaps the child, so the recorded pid is no longer ours.
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "unable to terminate the relay broker");
            }
            if let Err(e) = self.pid_file.remove().await {
                tracing::warn!(error = %e, "unable to remove the broker pid file");
            }
        }
        tracing::info!("tool session stopped");
    }

    /// Compresses `markup`, caches it for `unit` and pushes it.
    ///
    /// The cache is updated even when the push cannot be sent.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Codec`] if compression fails, or
    /// [`RelayError::ChannelLost`] if the session is not connected.
    pub async fn push_page(
        &self,
        unit: &UnitId,
        markup: &str,
        refresh: bool,
    ) -> Result<(), RelayError> {
        let payload = codec::compress_text(markup)?;
        self.pushed
            .store(UnitKind::Page, unit.clone(), payload.clone())
            .await;
        tracing::debug!(%unit, refresh, "pushing page");
        self.session
            .send(Envelope::push_page(unit, payload, refresh))
            .await
    }

    /// Compresses a code unit image, caches it for `unit` and pushes it.
    ///
    /// The cache is updated even when the push cannot be sent.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Codec`] if compression fails, or
    /// [`RelayError::ChannelLost`] if the session is not connected.
    pub async fn push_code_unit(&self, unit: &UnitId, image: &[u8]) -> Result<(), RelayError> {
        let payload = codec::compress(image)?;
        self.pushed
            .store(UnitKind::Code, unit.clone(), payload.clone())
            .await;
        tracing::debug!(%unit, bytes = image.len(), "pushing code unit");
        self.session
            .send(Envelope::push_code_unit(unit.as_str(), payload))
            .await
    }

    /// Re-sends every cached page and code unit, oldest push first.
    /// Pages go out with refresh set.
    ///
    /// Returns the number of entries sent.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ChannelLost`] if the session drops mid-replay.
    pub async fn push_all(&self) -> Result<usize, RelayError> {
        let snapshot = self.pushed.snapshot().await;
        let count = snapshot.len();
        for (unit, entry) in snapshot {
            let envelope = match entry.kind {
                UnitKind::Page => Envelope::push_page(&unit, entry.payload, true),
                UnitKind::Code => Envelope::push_code_unit(unit.as_str(), entry.payload),
            };
            self.session.send(envelope).await?;
        }
        tracing::info!(units = count, "replayed cached units");
        Ok(count)
    }

    /// Subscribes to application notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ToolEvent> {
        self.events.subscribe()
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Pages and code units pushed so far.
    #[must_use]
    pub fn pushed(&self) -> &UnitCache {
        &self.pushed
    }
}

fn publish(events: &EventBus, envelope: &Envelope) {
    match ToolEvent::from_envelope(envelope) {
        Ok(Some(event)) => {
            tracing::debug!(method = %envelope.method, "application notification");
            events.publish(event);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(method = %envelope.method, error = %e, "malformed notification dropped"),
    }
}
