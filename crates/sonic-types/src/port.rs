//! Front-panel port identifiers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A system (front-panel) port number as seen by the switch driver.
///
/// Accepts both the bare number and the SONiC interface name form:
///
/// ```
/// use sonic_types::PortId;
///
/// let a: PortId = "13".parse().unwrap();
/// let b: PortId = "Ethernet13".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "Ethernet13");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PortRepr", into = "String")]
pub struct PortId(u32);

/// Either spelling accepted in configuration files.
#[derive(Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Index(u32),
    Name(String),
}

impl TryFrom<PortRepr> for PortId {
    type Error = ParseError;

    fn try_from(repr: PortRepr) -> Result<Self, Self::Error> {
        match repr {
            PortRepr::Index(port) => Ok(PortId(port)),
            PortRepr::Name(name) => name.parse(),
        }
    }
}

impl From<PortId> for String {
    fn from(port: PortId) -> Self {
        port.to_string()
    }
}

impl PortId {
    pub const fn new(port: u32) -> Self {
        PortId(port)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ethernet{}", self.0)
    }
}

impl FromStr for PortId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("Ethernet").unwrap_or(s);
        digits
            .parse()
            .map(PortId)
            .map_err(|_| ParseError::InvalidPort(s.to_string()))
    }
}

impl From<u32> for PortId {
    fn from(port: u32) -> Self {
        PortId(port)
    }
}
