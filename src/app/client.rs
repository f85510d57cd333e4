//! Application-side session object.
//!
//! [`AppClient`] is constructed once per process and handed to whatever
//! needs it. It owns the application [`Session`] and the [`Applier`], wires
//! the inbound `push-*` handlers, and receives the host's page lifecycle
//! callbacks.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::{Application, Applier, CodeLoader, LiveInstanceSet, Page, UiHandle};
use crate::channel::{Connector, Dispatcher, WsConnector};
use crate::config::ClientConfig;
use crate::discovery::standard_resolver;
use crate::protocol::{Envelope, Method, PeerRole};
use crate::session::{Locator, Session, SessionTiming};

/// Application side of the relay.
#[derive(Debug, Clone)]
pub struct AppClient {
    session: Session,
    applier: Arc<Applier>,
}

impl AppClient {
    /// Builds a client that discovers the broker over WebSocket.
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        app: Arc<dyn Application>,
        loader: Arc<dyn CodeLoader>,
        ui: UiHandle,
    ) -> Self {
        let connector: Arc<dyn Connector> = Arc::new(WsConnector::default());
        let dispatcher = Arc::new(Dispatcher::new());
        let resolver = standard_resolver(
            config,
            PeerRole::Application,
            Arc::clone(&connector),
            Arc::clone(&dispatcher),
        );
        let session = Session::new(
            PeerRole::Application,
            client_id(),
            Locator::Discover(resolver),
            connector,
            dispatcher,
            SessionTiming::from(config),
        );
        Self::with_session(session, app, loader, ui)
    }

    /// Builds a client over an existing application session.
    #[must_use]
    pub fn with_session(
        session: Session,
        app: Arc<dyn Application>,
        loader: Arc<dyn CodeLoader>,
        ui: UiHandle,
    ) -> Self {
        let applier = Arc::new(Applier::new(
            app,
            loader,
            Arc::new(LiveInstanceSet::new()),
            ui,
            Arc::new(session.clone()),
        ));

        let weak = Arc::downgrade(&applier);
        session.dispatcher().on(Method::PushPage, move |envelope| {
            let applier = weak.upgrade();
            async move {
                if let Some(applier) = applier {
                    applier.on_push_page(envelope).await;
                }
            }
        });
        let weak = Arc::downgrade(&applier);
        session.dispatcher().on(Method::PushCodeUnit, move |envelope| {
            let applier = weak.upgrade();
            async move {
                if let Some(applier) = applier {
                    applier.on_push_code_unit(envelope).await;
                }
            }
        });

        Self { session, applier }
    }

    /// Starts connecting in the background.
    #[must_use]
    pub fn start(&self) -> JoinHandle<()> {
        tracing::info!(client_id = %self.session.peer_id(), "starting application session");
        self.session.spawn()
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The update applier.
    #[must_use]
    pub fn applier(&self) -> &Arc<Applier> {
        &self.applier
    }

    /// Call when a page was constructed; applies the cached markup of its
    /// unit if any. Returns `true` if cached markup was applied.
    pub async fn page_created(&self, page: &Arc<dyn Page>) -> bool {
        self.applier.initialize(page).await
    }

    /// Call when a page becomes visible.
    ///
    /// Before the first connection attempt settles this waits for it. The
    /// page is registered for live updates regardless of the connection;
    /// `page-visible` is sent only while connected and never queued.
    pub async fn page_appearing(&self, page: &Arc<dyn Page>) {
        let ready = self.session.ready();
        if !ready.is_settled() {
            ready.wait().await;
        }
        self.applier.live_set().register(page).await;
        if self.session.is_connected() {
            self.notify(Envelope::page_visible(page.unit_id())).await;
        }
    }

    /// Call when a page stops being visible. The page stays registered.
    pub async fn page_disappearing(&self, page: &Arc<dyn Page>) {
        if self.session.is_connected() {
            self.notify(Envelope::page_hidden(page.unit_id())).await;
        }
    }

    /// Forwards a host diagnostic to the tool as an `exception-report`.
    pub async fn report(&self, message: &str) {
        if self.session.is_connected() {
            self.notify(Envelope::exception_report(message)).await;
        }
    }

    /// Closes the session.
    pub async fn close(&self) {
        self.session.close().await;
    }

    async fn notify(&self, envelope: Envelope) {
        let method = envelope.method;
        if let Err(e) = self.session.send(envelope).await {
            tracing::debug!(%method, error = %e, "notification not sent");
        }
    }
}

/// Per-process client id: `RXID-` followed by a 100 ns tick count.
fn client_id() -> String {
    let ticks = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() / 100;
    format!("RXID-{ticks}")
}
