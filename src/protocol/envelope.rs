//! Envelope: one logical message on the channel.
//!
//! An [`Envelope`] is a method name plus an ordered argument list. On the
//! wire it is a JSON text frame:
//!
//! ```json
//! { "method": "push-page",
//!   "args": [ { "text": "Views.Home" }, { "bytes": "H4sI..." }, { "flag": true } ] }
//! ```
//!
//! Envelopes are fire-and-forget: no acknowledgement, no sequence number.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Method;
use crate::error::RelayError;
use crate::unit::UnitId;

/// One positional envelope argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    /// UTF-8 text.
    Text(String),
    /// Opaque (compressed) byte payload, base64 on the wire.
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    /// Boolean flag.
    Flag(bool),
}

/// A logical message: method name and ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Method discriminator.
    pub method: Method,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Arg>,
}

/// Minimal view of a frame used by the broker to log traffic without
/// interpreting it.
#[derive(Debug, Deserialize)]
pub struct FrameHeader {
    /// Raw method name as sent by the peer.
    pub method: String,
}

impl Envelope {
    /// Creates an envelope from a method and its arguments.
    #[must_use]
    pub fn new(method: Method, args: Vec<Arg>) -> Self {
        Self { method, args }
    }

    /// `register-tool(session id)`.
    #[must_use]
    pub fn register_tool(session_id: &str) -> Self {
        Self::new(Method::RegisterTool, vec![Arg::Text(session_id.to_string())])
    }

    /// `unregister-tool(session id)`.
    #[must_use]
    pub fn unregister_tool(session_id: &str) -> Self {
        Self::new(Method::UnregisterTool, vec![Arg::Text(session_id.to_string())])
    }

    /// `push-page(unit id, compressed payload, refresh flag)`.
    #[must_use]
    pub fn push_page(unit: &UnitId, payload: Vec<u8>, refresh: bool) -> Self {
        Self::new(
            Method::PushPage,
            vec![
                Arg::Text(unit.to_string()),
                Arg::Bytes(payload),
                Arg::Flag(refresh),
            ],
        )
    }

    /// `push-code-unit(unit name, compressed payload)`.
    #[must_use]
    pub fn push_code_unit(name: &str, payload: Vec<u8>) -> Self {
        Self::new(
            Method::PushCodeUnit,
            vec![Arg::Text(name.to_string()), Arg::Bytes(payload)],
        )
    }

    /// `register-app(client id)`.
    #[must_use]
    pub fn register_app(client_id: &str) -> Self {
        Self::new(Method::RegisterApp, vec![Arg::Text(client_id.to_string())])
    }

    /// `page-visible(unit id)`.
    #[must_use]
    pub fn page_visible(unit: &UnitId) -> Self {
        Self::new(Method::PageVisible, vec![Arg::Text(unit.to_string())])
    }

    /// `page-hidden(unit id)`.
    #[must_use]
    pub fn page_hidden(unit: &UnitId) -> Self {
        Self::new(Method::PageHidden, vec![Arg::Text(unit.to_string())])
    }

    /// `page-applied(unit id, payload echo)`.
    #[must_use]
    pub fn page_applied(unit: &UnitId, payload: Vec<u8>) -> Self {
        Self::new(
            Method::PageApplied,
            vec![Arg::Text(unit.to_string()), Arg::Bytes(payload)],
        )
    }

    /// `code-unit-applied(unit name, version string)`.
    #[must_use]
    pub fn code_unit_applied(name: &str, version: &str) -> Self {
        Self::new(
            Method::CodeUnitApplied,
            vec![Arg::Text(name.to_string()), Arg::Text(version.to_string())],
        )
    }

    /// `tool-restored(message)`.
    #[must_use]
    pub fn tool_restored(message: &str) -> Self {
        Self::new(Method::ToolRestored, vec![Arg::Text(message.to_string())])
    }

    /// `exception-report(message)`.
    #[must_use]
    pub fn exception_report(message: &str) -> Self {
        Self::new(Method::ExceptionReport, vec![Arg::Text(message.to_string())])
    }

    /// Returns the text argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] if the argument is missing or is not
    /// text.
    pub fn text(&self, index: usize) -> Result<&str, RelayError> {
        match self.args.get(index) {
            Some(Arg::Text(s)) => Ok(s),
            _ => Err(self.bad_arg(index, "text")),
        }
    }

    /// Returns the byte argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] if the argument is missing or is not
    /// a byte payload.
    pub fn bytes(&self, index: usize) -> Result<&[u8], RelayError> {
        match self.args.get(index) {
            Some(Arg::Bytes(b)) => Ok(b),
            _ => Err(self.bad_arg(index, "bytes")),
        }
    }

    /// Returns the flag argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] if the argument is missing or is not
    /// a flag.
    pub fn flag(&self, index: usize) -> Result<bool, RelayError> {
        match self.args.get(index) {
            Some(Arg::Flag(f)) => Ok(*f),
            _ => Err(self.bad_arg(index, "flag")),
        }
    }

    /// Returns the unit id carried as the first argument.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] if the first argument is missing or
    /// is not a valid dotted unit id.
    pub fn unit(&self) -> Result<UnitId, RelayError> {
        self.text(0)?.parse()
    }

    /// Serializes the envelope to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] if serialization fails.
    pub fn to_json(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Protocol(e.to_string()))
    }

    /// Parses an envelope from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] for malformed JSON or unknown methods.
    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::Protocol(e.to_string()))
    }

    fn bad_arg(&self, index: usize, expected: &str) -> RelayError {
        RelayError::Protocol(format!(
            "{}: argument {index} must be {expected}",
            self.method
        ))
    }
}

mod base64_bytes {
    use super::{Deserialize, Deserializer, Engine, STANDARD, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn unit(s: &str) -> UnitId {
        let Ok(u) = s.parse() else {
            panic!("valid unit id");
        };
        u
    }

    #[test]
    fn push_page_wire_shape() {
        let env = Envelope::push_page(&unit("Views.Home"), vec![1, 2, 3], true);
        let Ok(json) = env.to_json() else {
            panic!("serialization failed");
        };
        assert_eq!(
            json,
            r#"{"method":"push-page","args":[{"text":"Views.Home"},{"bytes":"AQID"},{"flag":true}]}"#
        );
    }

    #[test]
    fn parses_wire_form() {
        let json = r#"{"method":"page-applied","args":[{"text":"Views.About"},{"bytes":"AQID"}]}"#;
        let Ok(env) = Envelope::from_json(json) else {
            panic!("parse failed");
        };
        assert_eq!(env.method, Method::PageApplied);
        assert_eq!(env.text(0).ok(), Some("Views.About"));
        assert_eq!(env.bytes(1).ok(), Some(&[1_u8, 2, 3][..]));
    }

    #[test]
    fn accessors_check_kind_and_position() {
        let env = Envelope::code_unit_applied("App.dll", "1.0.0.4");
        assert!(env.text(1).is_ok());
        assert!(env.bytes(1).is_err());
        assert!(env.flag(5).is_err());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let json = r#"{"method":"SendXaml","args":[]}"#;
        assert!(Envelope::from_json(json).is_err());
    }

    #[test]
    fn header_reads_any_method() {
        let json = r#"{"method":"whatever","args":[]}"#;
        let header: Result<FrameHeader, _> = serde_json::from_str(json);
        let Ok(header) = header else {
            panic!("header parse failed");
        };
        assert_eq!(header.method, "whatever");
    }

    #[test]
    fn unit_argument_is_validated() {
        let env = Envelope::new(Method::PageVisible, vec![Arg::Text("..".to_string())]);
        assert!(env.unit().is_err());
    }
}
