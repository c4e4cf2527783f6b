//! Server port as supplied by the caller.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConnectErrorKind, EtlError, Result};

/// A port given either as a number or as a string.
///
/// The value is kept exactly as passed and only interpreted when a
/// connection is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Port(String);

impl Port {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Parse the port for a network connection.
    pub fn to_u16(&self) -> Result<u16> {
        self.0.trim().parse::<u16>().map_err(|_| {
            EtlError::connect(
                ConnectErrorKind::InvalidParameters,
                format!("invalid port '{}'", self.0),
            )
        })
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u16> for Port {
    fn from(v: u16) -> Self {
        Port(v.to_string())
    }
}

impl From<u32> for Port {
    fn from(v: u32) -> Self {
        Port(v.to_string())
    }
}

impl From<i32> for Port {
    fn from(v: i32) -> Self {
        Port(v.to_string())
    }
}

impl From<&str> for Port {
    fn from(v: &str) -> Self {
        Port(v.to_string())
    }
}

impl From<String> for Port {
    fn from(v: String) -> Self {
        Port(v)
    }
}

impl Serialize for Port {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Port {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Port(n.to_string()),
            Raw::Text(s) => Port(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_kept_verbatim() {
        assert_eq!(Port::from("5432").as_str(), "5432");
        assert_eq!(Port::from(5432u16).as_str(), "5432");
        assert_eq!(Port::from(" 5432 ").to_u16().unwrap(), 5432);
    }

    #[test]
    fn test_port_invalid_is_connect_error() {
        let err = Port::from("pg").to_u16().unwrap_err();
        assert_eq!(err.connect_kind(), Some(ConnectErrorKind::InvalidParameters));
        assert!(Port::from("70000").to_u16().is_err());
    }

    #[test]
    fn test_port_deserializes_number_or_string() {
        let p: Port = serde_yaml::from_str("5432").unwrap();
        assert_eq!(p, Port::from("5432"));
        let p: Port = serde_yaml::from_str("\"1433\"").unwrap();
        assert_eq!(p, Port::from(1433u16));
    }
}
