//! Overlay segment identifiers: bridge domains, VNIs and MPLS labels.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a virtual bridge domain (VSI).
///
/// Values up to 4094 overlap the VLAN space; larger values are pure
/// virtual switch instances. Zero is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BridgeDomainId(u32);

impl BridgeDomainId {
    pub const MAX: u32 = 0xFFFF;

    /// Like [`BridgeDomainId::new`], usable in constants.
    pub const fn checked(id: u32) -> Option<Self> {
        if id >= 1 && id <= Self::MAX {
            Some(BridgeDomainId(id))
        } else {
            None
        }
    }

    pub const fn new(id: u32) -> Result<Self, ParseError> {
        if id >= 1 && id <= Self::MAX {
            Ok(BridgeDomainId(id))
        } else {
            Err(ParseError::InvalidBridgeDomain(id))
        }
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BridgeDomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for BridgeDomainId {
    type Error = ParseError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        BridgeDomainId::new(id)
    }
}

impl From<BridgeDomainId> for u32 {
    fn from(id: BridgeDomainId) -> u32 {
        id.0
    }
}

/// A 24-bit VXLAN network identifier.
///
/// # Examples
///
/// ```
/// use sonic_types::Vni;
///
/// assert_eq!(Vni::new(5000).unwrap().as_u32(), 5000);
/// assert!(Vni::new(1 << 24).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Vni(u32);

impl Vni {
    pub const MAX: u32 = (1 << 24) - 1;

    /// Like [`Vni::new`], usable in constants.
    pub const fn checked(vni: u32) -> Option<Self> {
        if vni <= Self::MAX {
            Some(Vni(vni))
        } else {
            None
        }
    }

    pub const fn new(vni: u32) -> Result<Self, ParseError> {
        if vni <= Self::MAX {
            Ok(Vni(vni))
        } else {
            Err(ParseError::InvalidVni(vni))
        }
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Vni {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for Vni {
    type Error = ParseError;

    fn try_from(vni: u32) -> Result<Self, Self::Error> {
        Vni::new(vni)
    }
}

impl From<Vni> for u32 {
    fn from(vni: Vni) -> u32 {
        vni.0
    }
}

/// A 20-bit MPLS label outside the reserved range 0-15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MplsLabel(u32);

impl MplsLabel {
    pub const MIN: u32 = 16;
    pub const MAX: u32 = (1 << 20) - 1;

    pub const fn new(label: u32) -> Result<Self, ParseError> {
        if label >= Self::MIN && label <= Self::MAX {
            Ok(MplsLabel(label))
        } else {
            Err(ParseError::InvalidMplsLabel(label))
        }
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MplsLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for MplsLabel {
    type Error = ParseError;

    fn try_from(label: u32) -> Result<Self, Self::Error> {
        MplsLabel::new(label)
    }
}

impl From<MplsLabel> for u32 {
    fn from(label: MplsLabel) -> u32 {
        label.0
    }
}
