//! Races discovery strategies under one time budget.
//!
//! Every strategy runs concurrently and shares one [`CancelSignal`]. The
//! first strategy to produce a [`Resolved`] wins; the signal is then
//! cancelled and every other strategy is dropped without being polled
//! again, so no result is ever reported after cancellation. A timeout
//! guard cancels the signal once the budget has elapsed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::cancel::CancelSignal;
use crate::channel::{Channel, Endpoint};
use crate::error::RelayError;

/// Outcome of a successful discovery.
#[derive(Debug)]
pub enum Resolved {
    /// A strategy already completed the handshake; the channel is open.
    Direct(Channel),
    /// A broker was located; the caller still has to handshake.
    Broker(Endpoint),
}

impl Resolved {
    /// Returns the endpoint the result points at.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Self::Direct(channel) => channel.endpoint(),
            Self::Broker(endpoint) => endpoint,
        }
    }
}

/// One way of locating the broker.
#[async_trait]
pub trait Strategy: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Attempts to locate the broker. Implementations should check
    /// `cancel` between suspension points and return `None` once it fires.
    async fn locate(&self, cancel: CancelSignal) -> Option<Resolved>;
}

/// Races a fixed set of strategies within a time budget.
#[derive(Debug, Clone)]
pub struct Resolver {
    strategies: Vec<Arc<dyn Strategy>>,
    budget: Duration,
}

impl Resolver {
    /// Creates a resolver over `strategies` bounded by `budget`.
    #[must_use]
    pub fn new(strategies: Vec<Arc<dyn Strategy>>, budget: Duration) -> Self {
        Self { strategies, budget }
    }

    /// Returns the time budget of one resolution.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    /// Runs one discovery round. Does not retry.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DiscoveryTimeout`] if no strategy succeeded
    /// before every strategy finished or the budget elapsed.
    pub async fn resolve(&self) -> Result<Resolved, RelayError> {
        let cancel = CancelSignal::new();
        let mut racers = FuturesUnordered::new();

        for strategy in &self.strategies {
            let strategy = Arc::clone(strategy);
            let cancel = cancel.clone();
            racers.push(
                async move {
                    let name = strategy.name();
                    let result = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        found = strategy.locate(cancel.clone()) => found,
                    };
                    (name, result)
                }
                .boxed(),
            );
        }

        let guard = cancel.clone();
        let budget = self.budget;
        racers.push(
            async move {
                tokio::select! {
                    () = tokio::time::sleep(budget) => {
                        guard.cancel();
                    }
                    () = guard.cancelled() => {}
                }
                ("timeout", None)
            }
            .boxed(),
        );

        while let Some((name, result)) = racers.next().await {
            if let Some(found) = result {
                cancel.cancel();
                tracing::info!(strategy = name, endpoint = %found.endpoint(), "broker located");
                return Ok(found);
            }
            tracing::debug!(strategy = name, "strategy finished without a result");
        }

        Err(RelayError::DiscoveryTimeout)
    }
}
