//! The two peer roles of the relay.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Role a peer declares at handshake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    /// The development-time tool that pushes updates.
    Tool,
    /// A running application instance that applies updates.
    Application,
}

impl PeerRole {
    /// Returns the handshake query value of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Application => "application",
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerRole {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool" => Ok(Self::Tool),
            "application" => Ok(Self::Application),
            other => Err(RelayError::Protocol(format!("unknown peer role: {other}"))),
        }
    }
}
