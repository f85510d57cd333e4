//! Broker process marker file.
//!
//! The tool records the PID of the broker it launched so that the next
//! start can terminate a broker left over from a crashed run.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::error::RelayError;

/// Marker file holding the broker's process identifier.
#[derive(Debug, Clone)]
pub struct BrokerPidFile {
    path: PathBuf,
}

impl BrokerPidFile {
    /// Creates a handle; nothing is touched on disk.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the marker file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `pid`, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if the file cannot be written.
    pub async fn record(&self, pid: u32) -> Result<(), RelayError> {
        tokio::fs::write(&self.path, pid.to_string()).await?;
        tracing::debug!(pid, path = %self.path.display(), "broker pid recorded");
        Ok(())
    }

    /// Reads the recorded PID. A missing or unparseable file reads as `None`.
    pub async fn read(&self) -> Option<u32> {
        let content = tokio::fs::read_to_string(&self.path).await.ok()?;
        content.trim().parse().ok()
    }

    /// Kills the recorded process if it is still alive, then removes the
    /// file. Returns `true` if a process was signalled.
    pub async fn terminate_stale(&self) -> bool {
        let Some(pid) = self.read().await else {
            return false;
        };
        let killed = kill_process(pid);
        if killed {
            tracing::info!(pid, "terminated stale relay broker");
        }
        if let Err(e) = self.remove().await {
            tracing::warn!(path = %self.path.display(), error = %e, "unable to remove broker pid file");
        }
        killed
    }

    /// Deletes the file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] for any other removal failure.
    pub async fn remove(&self) -> Result<(), RelayError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn kill_process(raw: u32) -> bool {
    let pid = Pid::from_u32(raw);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::new(),
    );
    system.process(pid).is_some_and(sysinfo::Process::kill)
}
