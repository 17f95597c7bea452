//! IPv4 outer-header addresses and match masks.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 address used as a tunnel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv4Address(Ipv4Addr);

impl Ipv4Address {
    pub const UNSPECIFIED: Self = Ipv4Address(Ipv4Addr::UNSPECIFIED);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address(Ipv4Addr::new(a, b, c, d))
    }

    pub fn from_bits(bits: u32) -> Self {
        Ipv4Address(Ipv4Addr::from(bits))
    }

    pub fn to_bits(&self) -> u32 {
        u32::from(self.0)
    }

    pub const fn is_unspecified(&self) -> bool {
        self.0.is_unspecified()
    }

    pub const fn is_multicast(&self) -> bool {
        self.0.is_multicast()
    }

    /// Applies `mask`, keeping only the matched bits.
    pub fn masked(&self, mask: Ipv4Mask) -> Self {
        Self::from_bits(self.to_bits() & mask.to_bits())
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv4Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>()
            .map(Ipv4Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Address(addr)
    }
}

impl From<Ipv4Address> for Ipv4Addr {
    fn from(addr: Ipv4Address) -> Self {
        addr.0
    }
}

/// A contiguous IPv4 match mask, stored as its prefix length.
///
/// `Ipv4Mask::HOST` (/32) matches exactly one address; `Ipv4Mask::ANY` (/0)
/// matches everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Ipv4Mask(u8);

impl Ipv4Mask {
    pub const ANY: Ipv4Mask = Ipv4Mask(0);
    pub const HOST: Ipv4Mask = Ipv4Mask(32);

    pub fn from_prefix_len(len: u8) -> Result<Self, ParseError> {
        if len <= 32 {
            Ok(Ipv4Mask(len))
        } else {
            Err(ParseError::InvalidIpMask(len.to_string()))
        }
    }

    /// Builds a mask from its dotted/bit form; rejects non-contiguous masks.
    pub fn from_bits(bits: u32) -> Result<Self, ParseError> {
        let len = bits.leading_ones();
        if bits.checked_shl(len).unwrap_or(0) != 0 {
            return Err(ParseError::InvalidIpMask(Ipv4Addr::from(bits).to_string()));
        }
        Ok(Ipv4Mask(len as u8))
    }

    pub const fn prefix_len(&self) -> u8 {
        self.0
    }

    pub const fn to_bits(&self) -> u32 {
        match self.0 {
            0 => 0,
            len => u32::MAX << (32 - len as u32),
        }
    }
}

impl Default for Ipv4Mask {
    fn default() -> Self {
        Self::HOST
    }
}

impl fmt::Display for Ipv4Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl TryFrom<u8> for Ipv4Mask {
    type Error = ParseError;

    fn try_from(len: u8) -> Result<Self, Self::Error> {
        Ipv4Mask::from_prefix_len(len)
    }
}

impl From<Ipv4Mask> for u8 {
    fn from(mask: Ipv4Mask) -> u8 {
        mask.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_address_bits() {
        let sip: Ipv4Address = "170.0.0.17".parse().unwrap();
        assert_eq!(sip.to_bits(), 0xAA00_0011);
        assert_eq!(Ipv4Address::from_bits(0xAB00_0011).to_string(), "171.0.0.17");
        assert!("171.0.0".parse::<Ipv4Address>().is_err());
    }

    #[test]
    fn test_mask_bits() {
        assert_eq!(Ipv4Mask::HOST.to_bits(), 0xFFFF_FFFF);
        assert_eq!(Ipv4Mask::ANY.to_bits(), 0);
        assert_eq!(Ipv4Mask::from_prefix_len(24).unwrap().to_bits(), 0xFFFF_FF00);
        assert_eq!(Ipv4Mask::from_bits(0xFFFF_0000).unwrap().prefix_len(), 16);
        assert_eq!(Ipv4Mask::from_bits(0).unwrap(), Ipv4Mask::ANY);
        assert!(Ipv4Mask::from_bits(0xFF00_FF00).is_err());
        assert!(Ipv4Mask::from_prefix_len(33).is_err());
    }

    #[test]
    fn test_masked() {
        let addr: Ipv4Address = "10.1.2.3".parse().unwrap();
        let mask = Ipv4Mask::from_prefix_len(16).unwrap();
        assert_eq!(addr.masked(mask).to_string(), "10.1.0.0");
        assert_eq!(addr.masked(Ipv4Mask::ANY), Ipv4Address::UNSPECIFIED);
    }
}
