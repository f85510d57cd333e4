//! Relay error taxonomy.
//!
//! [`RelayError`] is the central error type of the crate. Steady-state
//! variants are recovered where they happen (retried, or reported to the
//! peer as an `exception-report`); only [`RelayError::Startup`] is meant to
//! reach the caller that started a session.

/// Errors produced by discovery, the session, the broker and the applier.
///
/// # Error Code Ranges
///
/// | Range     | Category              |
/// |-----------|-----------------------|
/// | 1000–1999 | Protocol / codec      |
/// | 2000–2999 | Connection            |
/// | 3000–3999 | Startup               |
/// | 4000–4999 | Update application    |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No discovery strategy produced a broker address within the budget.
    #[error("no relay broker found within the discovery budget")]
    DiscoveryTimeout,

    /// The transport channel is closed or was never opened.
    #[error("channel lost")]
    ChannelLost,

    /// A channel handshake against a reachable endpoint failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Decoding, instantiating or hooking an update failed.
    #[error("apply failed: {0}")]
    Apply(String),

    /// A reloaded code unit declares neither entry-point marker.
    #[error("reload configuration error: {0}")]
    ReloadConfiguration(String),

    /// The tool-side session could not be started.
    #[error("startup failed: {0}")]
    Startup(String),

    /// A payload could not be compressed or decompressed.
    #[error("codec error: {0}")]
    Codec(String),

    /// An envelope was malformed or carried unexpected arguments.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying socket or file error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Protocol(_) => 1001,
            Self::Codec(_) => 1002,
            Self::DiscoveryTimeout => 2001,
            Self::ChannelLost => 2002,
            Self::Handshake(_) => 2003,
            Self::Io(_) => 2004,
            Self::Startup(_) => 3001,
            Self::Apply(_) => 4001,
            Self::ReloadConfiguration(_) => 4002,
        }
    }

    /// Returns `false` for failures that must surface to the initiating
    /// caller instead of being retried or reported to the peer.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Startup(_))
    }

    /// Wraps a host callback failure as an [`RelayError::Apply`].
    #[must_use]
    pub fn apply(err: &anyhow::Error) -> Self {
        Self::Apply(format!("{err:#}"))
    }
}
