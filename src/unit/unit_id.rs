//! Type-safe unit identifier.
//!
//! [`UnitId`] is a newtype around the dotted name that uniquely identifies
//! one UI page or one code module (e.g. `Views.Home`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Dotted identifier of a reloadable unit.
///
/// Every segment must be non-empty and contain no whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitId(String);

impl UnitId {
    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last dotted segment (the short type name).
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UnitId {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(RelayError::Protocol("unit id is empty".to_string()));
        }
        let valid = s
            .split('.')
            .all(|seg| !seg.is_empty() && !seg.chars().any(char::is_whitespace));
        if !valid {
            return Err(RelayError::Protocol(format!("invalid unit id: {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for UnitId {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UnitId> for String {
    fn from(id: UnitId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dotted_names() {
        let Ok(id) = "MyApp.Views.Home".parse::<UnitId>() else {
            panic!("expected valid id");
        };
        assert_eq!(id.as_str(), "MyApp.Views.Home");
        assert_eq!(id.short_name(), "Home");
    }

    #[test]
    fn accepts_single_segment() {
        assert!("App".parse::<UnitId>().is_ok());
    }

    #[test]
    fn rejects_empty_segments_and_whitespace() {
        assert!("".parse::<UnitId>().is_err());
        assert!("Views..Home".parse::<UnitId>().is_err());
        assert!(".Home".parse::<UnitId>().is_err());
        assert!("Views.Ho me".parse::<UnitId>().is_err());
    }

    #[test]
    fn serde_round_trip_validates() {
        let Ok(id) = "Views.About".parse::<UnitId>() else {
            panic!("expected valid id");
        };
        let Ok(json) = serde_json::to_string(&id) else {
            panic!("serialization failed");
        };
        assert_eq!(json, "\"Views.About\"");
        let bad: Result<UnitId, _> = serde_json::from_str("\"a..b\"");
        assert!(bad.is_err());
    }

    #[test]
    fn hash_works_in_hashmap() {
        use std::collections::HashMap;
        let Ok(id) = "Views.Home".parse::<UnitId>() else {
            panic!("expected valid id");
        };
        let mut map = HashMap::new();
        map.insert(id.clone(), "home");
        assert_eq!(map.get(&id), Some(&"home"));
    }
}
