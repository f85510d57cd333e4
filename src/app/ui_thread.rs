//! Single-consumer executor standing in for the UI thread.
//!
//! Every mutation of live pages is submitted through a [`UiHandle`] and run
//! by the one [`UiQueue`] consumer, one job at a time, in submission order.
//! The network side never touches pages directly.

use std::future::Future;
use std::io;
use std::thread;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use crate::error::RelayError;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Submits jobs to the UI thread.
#[derive(Debug, Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<Job>,
}

/// The consuming end; whoever runs it is the UI thread.
#[derive(Debug)]
pub struct UiQueue {
    rx: mpsc::UnboundedReceiver<Job>,
}

/// Creates a connected handle / queue pair.
#[must_use]
pub fn ui_channel() -> (UiHandle, UiQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiHandle { tx }, UiQueue { rx })
}

impl UiHandle {
    /// Runs `job` on the UI thread and returns its output.
    ///
    /// Must not be awaited from inside another UI job.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Apply`] if the UI queue is no longer running.
    pub async fn run<F, Fut, T>(&self, job: F) -> Result<T, RelayError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                let _ = reply.send(job().await);
            }
            .boxed()
        });
        self.tx
            .send(job)
            .map_err(|_| RelayError::Apply("ui thread is not running".to_string()))?;
        result
            .await
            .map_err(|_| RelayError::Apply("ui job was abandoned".to_string()))
    }
}

impl UiQueue {
    /// Runs queued jobs until every [`UiHandle`] is dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job().await;
        }
        tracing::debug!("ui queue drained");
    }

    /// Runs the queue on a dedicated, named OS thread with its own
    /// single-threaded runtime.
    ///
    /// # Errors
    ///
    /// Returns the error from spawning the thread or building the runtime.
    pub fn spawn_thread(self, name: &str) -> io::Result<thread::JoinHandle<()>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || runtime.block_on(self.run()))
    }
}
