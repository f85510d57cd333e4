//! In-process doubles for pages, applications, loaders and sinks.

#![allow(clippy::panic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{Application, CodeLoader, EntryRegistry, EnvelopeSink, LoadedUnit, Page, ReloadHook};
use crate::channel::{Channel, Connector, Dispatcher, Endpoint, MemoryPeer};
use crate::error::RelayError;
use crate::protocol::{Envelope, PeerRole};
use crate::unit::UnitId;

fn unit(name: &str) -> UnitId {
    let Ok(unit) = name.parse() else {
        panic!("invalid unit id {name:?}");
    };
    unit
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookKind {
    None,
    Sync,
    Async,
}

#[derive(Debug)]
pub(crate) struct FakePage {
    unit: UnitId,
    attached: AtomicBool,
    content: Mutex<Option<String>>,
    loads: AtomicUsize,
    cleared: AtomicUsize,
    failure: Mutex<Option<String>>,
    hook: Mutex<HookKind>,
    hook_runs: Arc<AtomicUsize>,
    threads: Mutex<Vec<Option<String>>>,
}

impl FakePage {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            unit: unit(name),
            attached: AtomicBool::new(true),
            content: Mutex::new(None),
            loads: AtomicUsize::new(0),
            cleared: AtomicUsize::new(0),
            failure: Mutex::new(None),
            hook: Mutex::new(HookKind::None),
            hook_runs: Arc::new(AtomicUsize::new(0)),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn shared(name: &str) -> Arc<dyn Page> {
        Arc::new(Self::new(name))
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    pub(crate) fn content(&self) -> Option<String> {
        self.content.lock().ok().and_then(|c| c.clone())
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn cleared(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_with(&self, message: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
    }

    pub(crate) fn set_hook(&self, kind: HookKind) {
        if let Ok(mut hook) = self.hook.lock() {
            *hook = kind;
        }
    }

    pub(crate) fn hook_runs(&self) -> usize {
        self.hook_runs.load(Ordering::SeqCst)
    }

    pub(crate) fn load_threads(&self) -> Vec<Option<String>> {
        self.threads.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl Page for FakePage {
    fn unit_id(&self) -> &UnitId {
        &self.unit
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn clear_decorations(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }

    fn load_content(&self, markup: &str) -> anyhow::Result<()> {
        if let Ok(mut threads) = self.threads.lock() {
            threads.push(std::thread::current().name().map(str::to_string));
        }
        if let Some(message) = self.failure.lock().ok().and_then(|f| f.clone()) {
            anyhow::bail!(message);
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut content) = self.content.lock() {
            *content = Some(markup.to_string());
        }
        Ok(())
    }

    fn reload_hook(&self) -> ReloadHook {
        let kind = self.hook.lock().map(|h| *h).unwrap_or(HookKind::None);
        let runs = Arc::clone(&self.hook_runs);
        match kind {
            HookKind::None => ReloadHook::None,
            HookKind::Sync => ReloadHook::Sync(Box::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
            HookKind::Async => ReloadHook::Async(Box::pin(async move {
                tokio::task::yield_now().await;
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
        }
    }
}

#[derive(Debug)]
pub(crate) struct FakeApp {
    unit: UnitId,
    content: Mutex<Option<String>>,
    root: Mutex<Option<Arc<dyn Page>>>,
    failure: Mutex<Option<String>>,
}

impl FakeApp {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            unit: unit(name),
            content: Mutex::new(None),
            root: Mutex::new(None),
            failure: Mutex::new(None),
        }
    }

    pub(crate) fn fail_with(&self, message: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
    }

    pub(crate) fn content(&self) -> Option<String> {
        self.content.lock().ok().and_then(|c| c.clone())
    }
}

impl Application for FakeApp {
    fn unit_id(&self) -> &UnitId {
        &self.unit
    }

    fn load_content(&self, markup: &str) -> anyhow::Result<()> {
        if let Some(message) = self.failure.lock().ok().and_then(|f| f.clone()) {
            anyhow::bail!(message);
        }
        if let Ok(mut content) = self.content.lock() {
            *content = Some(markup.to_string());
        }
        Ok(())
    }

    fn root(&self) -> Option<Arc<dyn Page>> {
        self.root.lock().ok().and_then(|r| r.clone())
    }

    fn set_root(&self, root: Arc<dyn Page>) {
        if let Ok(mut current) = self.root.lock() {
            *current = Some(root);
        }
    }

    fn wrap_in_navigation(&self, _page: Arc<dyn Page>) -> anyhow::Result<Arc<dyn Page>> {
        Ok(FakePage::shared("Navigation"))
    }
}

/// Returns registered units; the version is the image text.
#[derive(Debug, Default)]
pub(crate) struct FakeLoader {
    units: Mutex<HashMap<String, EntryRegistry>>,
}

impl FakeLoader {
    pub(crate) fn provide(&self, name: &str, entries: EntryRegistry) {
        if let Ok(mut units) = self.units.lock() {
            units.insert(name.to_string(), entries);
        }
    }
}

impl CodeLoader for FakeLoader {
    fn load(&self, name: &str, image: &[u8]) -> anyhow::Result<LoadedUnit> {
        let entries = self
            .units
            .lock()
            .ok()
            .and_then(|units| units.get(name).cloned())
            .ok_or_else(|| anyhow::anyhow!("unknown code unit {name}"))?;
        Ok(LoadedUnit {
            version: String::from_utf8_lossy(image).into_owned(),
            entries,
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<Envelope>>,
}

impl RecordingSink {
    pub(crate) fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EnvelopeSink for RecordingSink {
    async fn send(&self, envelope: Envelope) -> Result<(), RelayError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(envelope);
        }
        Ok(())
    }
}

/// Connector whose handshakes open in-memory channels.
#[derive(Debug, Default)]
pub(crate) struct MemoryConnector {
    refuse: AtomicBool,
    peers: Mutex<Vec<MemoryPeer>>,
}

impl MemoryConnector {
    pub(crate) fn refusing() -> Self {
        let connector = Self::default();
        connector.refuse.store(true, Ordering::SeqCst);
        connector
    }

    pub(crate) fn take_peer(&self) -> MemoryPeer {
        let Some(peer) = self.peers.lock().ok().and_then(|mut p| p.pop()) else {
            panic!("no channel was opened");
        };
        peer
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn probe(&self, _addr: SocketAddr, _timeout: Duration) -> bool {
        !self.refuse.load(Ordering::SeqCst)
    }

    async fn handshake(
        &self,
        endpoint: &Endpoint,
        _role: PeerRole,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Channel, RelayError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RelayError::Handshake("connection refused".to_string()));
        }
        let (channel, peer) = Channel::in_memory(endpoint.clone(), dispatcher);
        if let Ok(mut peers) = self.peers.lock() {
            peers.push(peer);
        }
        Ok(channel)
    }
}
