//! Update Applier: cache inbound payloads and apply them to live pages.
//!
//! Inbound envelopes arrive on the channel reader task. Decoding and cache
//! writes happen there; every mutation of a page or of the application
//! object is submitted to the UI thread through [`UiHandle`]. Each outcome
//! is answered with a confirmation (`page-applied`, `code-unit-applied`) or
//! an `exception-report`; no failure escapes to the host.
//!
//! Page markup is cached as soon as it decodes, since later instances pick
//! it up from there. The application markup and code units are cached only
//! once they were applied, so a failed reload leaves the cache as it was.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::page::reload_page;
use super::{Application, CodeLoader, LiveInstanceSet, Page, UiHandle};
use crate::error::RelayError;
use crate::protocol::{Envelope, codec};
use crate::session::Session;
use crate::unit::{UnitCache, UnitId, UnitKind};

/// Outbound path for confirmations and reports.
#[async_trait]
pub trait EnvelopeSink: Send + Sync + fmt::Debug {
    /// Sends one envelope to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ChannelLost`] if nothing is connected.
    async fn send(&self, envelope: Envelope) -> Result<(), RelayError>;
}

#[async_trait]
impl EnvelopeSink for Session {
    async fn send(&self, envelope: Envelope) -> Result<(), RelayError> {
        Session::send(self, envelope).await
    }
}

/// Applies page and code-unit updates on the application side.
#[derive(Debug)]
pub struct Applier {
    app: Arc<dyn Application>,
    loader: Arc<dyn CodeLoader>,
    cache: UnitCache,
    live: Arc<LiveInstanceSet>,
    ui: UiHandle,
    sink: Arc<dyn EnvelopeSink>,
}

impl Applier {
    /// Creates an applier with an empty cache.
    #[must_use]
    pub fn new(
        app: Arc<dyn Application>,
        loader: Arc<dyn CodeLoader>,
        live: Arc<LiveInstanceSet>,
        ui: UiHandle,
        sink: Arc<dyn EnvelopeSink>,
    ) -> Self {
        Self {
            app,
            loader,
            cache: UnitCache::new(),
            live,
            ui,
            sink,
        }
    }

    /// Application-side cache of received payloads.
    #[must_use]
    pub fn cache(&self) -> &UnitCache {
        &self.cache
    }

    /// Live pages eligible for in-place updates.
    #[must_use]
    pub fn live_set(&self) -> &Arc<LiveInstanceSet> {
        &self.live
    }

    /// Handles an inbound `push-page` envelope.
    pub async fn on_push_page(&self, envelope: Envelope) {
        match (envelope.unit(), envelope.bytes(1), envelope.flag(2)) {
            (Ok(unit), Ok(payload), Ok(refresh)) => {
                self.push_page(unit, payload.to_vec(), refresh).await;
            }
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                self.deliver("push-page", Err(e)).await;
            }
        }
    }

    /// Handles an inbound `push-code-unit` envelope.
    pub async fn on_push_code_unit(&self, envelope: Envelope) {
        match (envelope.text(0), envelope.bytes(1)) {
            (Ok(name), Ok(payload)) => {
                let name = name.to_string();
                self.push_code_unit(&name, payload.to_vec()).await;
            }
            (Err(e), _) | (_, Err(e)) => self.deliver("push-code-unit", Err(e)).await,
        }
    }

    /// Caches a page payload and, when `refresh` is set, re-applies it to
    /// every live attached instance of `unit`.
    ///
    /// A payload for the application's own composition unit reloads the
    /// application in place instead; with `refresh` every live page is then
    /// re-applied from its own cache entry.
    pub async fn push_page(&self, unit: UnitId, payload: Vec<u8>, refresh: bool) {
        let outcome = self.apply_page(&unit, payload, refresh).await;
        self.deliver(unit.as_str(), outcome).await;
    }

    /// Loads a code unit, replaces the application root from its entry
    /// points and re-applies cached markup to the new pages.
    pub async fn push_code_unit(&self, name: &str, payload: Vec<u8>) {
        let outcome = self.reload_code(name, payload).await;
        self.deliver(name, outcome).await;
    }

    /// Initializes a newly constructed page from its cache entry.
    ///
    /// The markup is applied on the UI thread, so this must not be awaited
    /// from inside a UI job. Returns `true` if cached markup was applied.
    pub async fn initialize(&self, page: &Arc<dyn Page>) -> bool {
        let Some(entry) = self.cache.get(UnitKind::Page, page.unit_id()).await else {
            return false;
        };
        let result = match codec::decompress_text(&entry.payload) {
            Ok(markup) => {
                let target = Arc::clone(page);
                self.ui
                    .run(move || async move {
                        reload_page(target.as_ref(), &markup)
                            .await
                            .map_err(|e| RelayError::apply(&e))
                    })
                    .await
                    .and_then(|applied| applied)
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                tracing::debug!(unit = %page.unit_id(), version = entry.version, "page initialized from cache");
                true
            }
            Err(e) => {
                self.deliver(page.unit_id().as_str(), Err(e)).await;
                false
            }
        }
    }

    async fn apply_page(
        &self,
        unit: &UnitId,
        payload: Vec<u8>,
        refresh: bool,
    ) -> Result<Vec<Envelope>, RelayError> {
        let markup = codec::decompress_text(&payload)?;

        if unit == self.app.unit_id() {
            let app = Arc::clone(&self.app);
            self.ui
                .run(move || async move { app.load_content(&markup) })
                .await?
                .map_err(|e| RelayError::apply(&e))?;
            let version = self
                .cache
                .store(UnitKind::Page, unit.clone(), payload.clone())
                .await;
            tracing::info!(%unit, version, "application markup reloaded");

            let mut replies = vec![Envelope::page_applied(unit, payload)];
            if refresh {
                let pages = self.live.all_live().await;
                replies.extend(self.refresh_from_cache(pages).await);
            }
            return Ok(replies);
        }

        let version = self
            .cache
            .store(UnitKind::Page, unit.clone(), payload.clone())
            .await;
        tracing::debug!(%unit, version, refresh, "page payload cached");
        if !refresh {
            return Ok(Vec::new());
        }
        let pages = self.live.live(unit).await;
        let mut replies = Vec::with_capacity(pages.len());
        for page in pages {
            replies.push(self.reapply(page, &markup, &payload).await);
        }
        Ok(replies)
    }

    async fn reload_code(&self, name: &str, payload: Vec<u8>) -> Result<Vec<Envelope>, RelayError> {
        let image = codec::decompress(&payload)?;
        let loader = Arc::clone(&self.loader);
        let app = Arc::clone(&self.app);
        let live = Arc::clone(&self.live);
        let owned = name.to_string();
        let (version, pages) = self
            .ui
            .run(move || async move {
                let loaded = loader
                    .load(&owned, &image)
                    .map_err(|e| RelayError::apply(&e))?;
                let composition = loaded.entries.compose(app.as_ref())?;
                app.set_root(composition.root);
                live.replace(&composition.pages).await;
                Ok::<_, RelayError>((loaded.version, composition.pages))
            })
            .await??;
        tracing::info!(unit = name, %version, pages = pages.len(), "code unit reloaded");
        if let Ok(unit) = name.parse::<UnitId>() {
            self.cache.store(UnitKind::Code, unit, payload).await;
        }

        let mut replies = self.refresh_from_cache(pages).await;
        replies.push(Envelope::code_unit_applied(name, &version));
        Ok(replies)
    }

    async fn refresh_from_cache(&self, pages: Vec<Arc<dyn Page>>) -> Vec<Envelope> {
        let mut replies = Vec::with_capacity(pages.len());
        for page in pages {
            let Some(entry) = self.cache.get(UnitKind::Page, page.unit_id()).await else {
                continue;
            };
            let reply = match codec::decompress_text(&entry.payload) {
                Ok(markup) => self.reapply(page, &markup, &entry.payload).await,
                Err(e) => Envelope::exception_report(&format!("{}: {e}", page.unit_id())),
            };
            replies.push(reply);
        }
        replies
    }

    async fn reapply(&self, page: Arc<dyn Page>, markup: &str, payload: &[u8]) -> Envelope {
        let unit = page.unit_id().clone();
        let markup = markup.to_string();
        let result = self
            .ui
            .run(move || async move {
                reload_page(page.as_ref(), &markup)
                    .await
                    .map_err(|e| RelayError::apply(&e))
            })
            .await
            .and_then(|applied| applied);
        match result {
            Ok(()) => {
                tracing::info!(%unit, "page reloaded");
                Envelope::page_applied(&unit, payload.to_vec())
            }
            Err(e) => {
                tracing::warn!(%unit, error = %e, "page reload failed");
                Envelope::exception_report(&format!("{unit}: {e}"))
            }
        }
    }

    async fn deliver(&self, context: &str, outcome: Result<Vec<Envelope>, RelayError>) {
        let replies = match outcome {
            Ok(replies) => replies,
            Err(e) => {
                tracing::warn!(unit = context, error = %e, code = e.error_code(), "update failed");
                vec![Envelope::exception_report(&format!("{context}: {e}"))]
            }
        };
        for reply in replies {
            let method = reply.method;
            if let Err(e) = self.sink.send(reply).await {
                tracing::debug!(%method, error = %e, "reply not delivered");
            }
        }
    }
}
