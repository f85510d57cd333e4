//! Closed vocabulary of envelope method names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Every method an envelope may carry.
///
/// Serialized in kebab-case (`"push-page"`, `"code-unit-applied"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Tool → broker: session id.
    RegisterTool,
    /// Tool → broker: session id.
    UnregisterTool,
    /// Tool → app: unit id, compressed payload, refresh flag.
    PushPage,
    /// Tool → app: unit name, compressed payload.
    PushCodeUnit,
    /// App → broker: client id.
    RegisterApp,
    /// App → tool: unit id.
    PageVisible,
    /// App → tool: unit id.
    PageHidden,
    /// App → tool: unit id, payload echo.
    PageApplied,
    /// App → tool: unit name, version string.
    CodeUnitApplied,
    /// App → tool: free-text message.
    ToolRestored,
    /// App → tool: free-text message.
    ExceptionReport,
}

impl Method {
    /// All methods, in vocabulary order.
    pub const ALL: [Self; 11] = [
        Self::RegisterTool,
        Self::UnregisterTool,
        Self::PushPage,
        Self::PushCodeUnit,
        Self::RegisterApp,
        Self::PageVisible,
        Self::PageHidden,
        Self::PageApplied,
        Self::CodeUnitApplied,
        Self::ToolRestored,
        Self::ExceptionReport,
    ];

    /// Returns the wire name of the method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterTool => "register-tool",
            Self::UnregisterTool => "unregister-tool",
            Self::PushPage => "push-page",
            Self::PushCodeUnit => "push-code-unit",
            Self::RegisterApp => "register-app",
            Self::PageVisible => "page-visible",
            Self::PageHidden => "page-hidden",
            Self::PageApplied => "page-applied",
            Self::CodeUnitApplied => "code-unit-applied",
            Self::ToolRestored => "tool-restored",
            Self::ExceptionReport => "exception-report",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| RelayError::Protocol(format!("unknown method: {s}")))
    }
}
