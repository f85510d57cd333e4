//! Typed dispatch table: method name → async handler.
//!
//! Handlers are registered explicitly with [`Dispatcher::on`]. The channel
//! reader awaits each handler before reading the next frame, so inbound
//! envelopes are handled in receipt order.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::protocol::{Envelope, Method};

/// Boxed async handler for one method.
pub type Handler = Arc<dyn Fn(Envelope) -> BoxFuture<'static, ()> + Send + Sync>;

/// Method → handler table shared between a session and its channels.
#[derive(Default)]
pub struct Dispatcher {
    handlers: RwLock<HashMap<Method, Handler>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Dispatcher")
            .field("methods", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method`, replacing any previous handler.
    pub fn on<F, Fut>(&self, method: Method, handler: F)
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |env| handler(env).boxed());
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method, handler);
    }

    /// Returns `true` if a handler is registered for `method`.
    #[must_use]
    pub fn handles(&self, method: Method) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&method)
    }

    /// Runs the handler registered for the envelope's method.
    ///
    /// Returns `false` if no handler is registered; the envelope is dropped.
    pub async fn dispatch(&self, envelope: Envelope) -> bool {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&envelope.method)
            .cloned();
        match handler {
            Some(handler) => {
                handler(envelope).await;
                true
            }
            None => {
                tracing::debug!(method = %envelope.method, "no handler registered, dropping");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        dispatcher.on(Method::PageVisible, move |env| {
            let counter = Arc::clone(&counter);
            async move {
                assert_eq!(env.method, Method::PageVisible);
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(dispatcher.handles(Method::PageVisible));
        let handled = dispatcher
            .dispatch(Envelope::exception_report("ignored"))
            .await;
        assert!(!handled);

        let Ok(unit) = "Views.Home".parse() else {
            panic!("valid unit");
        };
        assert!(dispatcher.dispatch(Envelope::page_visible(&unit)).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn later_registration_replaces_earlier() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        dispatcher.on(Method::ToolRestored, |_| async {});
        let counter = Arc::clone(&hits);
        dispatcher.on(Method::ToolRestored, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(10, Ordering::SeqCst);
            }
        });
        dispatcher.dispatch(Envelope::tool_restored("back")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }
}
