//! Tunnel types.

use serde::{Deserialize, Serialize};
use sonic_sai::api::{
    DscpMapId, DscpMode, TunnelInitiatorAttributes, TunnelTerminatorAttributes,
    TunnelTerminatorKey, TunnelType,
};
use sonic_sai::RouterInterfaceOid;
use sonic_types::{Ipv4Address, Ipv4Mask, MacAddress, VlanId};
use std::fmt;

/// Highest DSCP code point.
pub const MAX_DSCP: u8 = 63;

/// Tunnel encapsulation as written in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelKind {
    #[default]
    Vxlan,
    L2gre,
}

impl From<TunnelKind> for TunnelType {
    fn from(kind: TunnelKind) -> Self {
        match kind {
            TunnelKind::Vxlan => TunnelType::Vxlan,
            TunnelKind::L2gre => TunnelType::L2Gre,
        }
    }
}

impl fmt::Display for TunnelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&TunnelType::from(*self), f)
    }
}

/// How the outer DSCP is chosen. Exactly one mode applies.
///
/// ```toml
/// dscp = { mode = "assign", value = 10 }
/// dscp = { mode = "copy-inner" }
/// dscp = { mode = "map", map_id = 3 }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum DscpPolicy {
    /// Fixed value from the tunnel configuration
    Assign { value: u8 },
    /// Copied from the inner packet
    #[default]
    CopyInner,
    /// Looked up in a DSCP map; the map id is mandatory
    Map {
        #[serde(default)]
        map_id: Option<u32>,
    },
}

impl DscpPolicy {
    /// Converts into the switch representation, rejecting an out-of-range
    /// value or a map without a (non-zero) map id.
    pub fn resolve(&self) -> Result<DscpMode, String> {
        match *self {
            DscpPolicy::Assign { value } if value > MAX_DSCP => {
                Err(format!("DSCP value {} exceeds {}", value, MAX_DSCP))
            }
            DscpPolicy::Assign { value } => Ok(DscpMode::Assign(value)),
            DscpPolicy::CopyInner => Ok(DscpMode::CopyInner),
            DscpPolicy::Map { map_id } => map_id
                .and_then(DscpMapId::new)
                .map(DscpMode::Map)
                .ok_or_else(|| "DSCP mode \"map\" requires a non-zero map_id".to_string()),
        }
    }
}

/// Outer-header template of an initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitiatorSpec {
    pub tunnel_type: TunnelType,
    /// Transport VLAN the initiator's interface lives on
    pub vlan: VlanId,
    pub src_mac: MacAddress,
    pub src_ip: Ipv4Address,
    pub dst_ip: Ipv4Address,
    pub ttl: u8,
    pub dscp: DscpPolicy,
    pub copy_inner_df: bool,
}

impl InitiatorSpec {
    pub fn attributes(&self) -> Result<TunnelInitiatorAttributes, String> {
        Ok(TunnelInitiatorAttributes {
            tunnel_type: self.tunnel_type,
            vlan: self.vlan,
            src_mac: self.src_mac,
            src_ip: self.src_ip,
            dst_ip: self.dst_ip,
            ttl: self.ttl,
            dscp: self.dscp.resolve()?,
            copy_inner_df: self.copy_inner_df,
        })
    }
}

/// Match rule of a terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminatorSpec {
    pub tunnel_type: TunnelType,
    pub src_ip: Ipv4Address,
    pub src_mask: Ipv4Mask,
    pub dst_ip: Ipv4Address,
    pub dst_mask: Ipv4Mask,
    pub router_interface: Option<RouterInterfaceOid>,
}

impl TerminatorSpec {
    /// Matches traffic coming back from the initiator's peer: the outer
    /// addresses are swapped and fully masked.
    pub fn reversed(
        initiator: &InitiatorSpec,
        router_interface: Option<RouterInterfaceOid>,
    ) -> Self {
        Self {
            tunnel_type: initiator.tunnel_type,
            src_ip: initiator.dst_ip,
            src_mask: Ipv4Mask::HOST,
            dst_ip: initiator.src_ip,
            dst_mask: Ipv4Mask::HOST,
            router_interface,
        }
    }

    pub fn attributes(&self) -> TunnelTerminatorAttributes {
        TunnelTerminatorAttributes {
            tunnel_type: self.tunnel_type,
            src_ip: self.src_ip,
            src_mask: self.src_mask,
            dst_ip: self.dst_ip,
            dst_mask: self.dst_mask,
            router_interface: self.router_interface,
        }
    }

    pub fn key(&self) -> TunnelTerminatorKey {
        self.attributes().key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dscp_policy_resolution() {
        assert_eq!(DscpPolicy::CopyInner.resolve().unwrap(), DscpMode::CopyInner);
        assert_eq!(
            DscpPolicy::Assign { value: 46 }.resolve().unwrap(),
            DscpMode::Assign(46)
        );
        assert!(DscpPolicy::Assign { value: 64 }.resolve().is_err());
        assert!(DscpPolicy::Map { map_id: None }.resolve().is_err());
        assert!(DscpPolicy::Map { map_id: Some(0) }.resolve().is_err());
        assert_eq!(
            DscpPolicy::Map { map_id: Some(3) }.resolve().unwrap().to_string(),
            "map(3)"
        );
    }

    #[test]
    fn test_dscp_policy_serde() {
        let policy: DscpPolicy = serde_json::from_str(r#"{"mode":"map"}"#).unwrap();
        assert_eq!(policy, DscpPolicy::Map { map_id: None });

        let policy: DscpPolicy = serde_json::from_str(r#"{"mode":"assign","value":10}"#).unwrap();
        assert_eq!(policy, DscpPolicy::Assign { value: 10 });

        assert_eq!(
            serde_json::to_string(&DscpPolicy::CopyInner).unwrap(),
            r#"{"mode":"copy-inner"}"#
        );
    }

    #[test]
    fn test_reversed_terminator() {
        let initiator = InitiatorSpec {
            tunnel_type: TunnelType::Vxlan,
            vlan: VlanId::new(20).unwrap(),
            src_mac: "00:0c:00:02:00:00".parse().unwrap(),
            src_ip: Ipv4Address::new(170, 0, 0, 17),
            dst_ip: Ipv4Address::new(171, 0, 0, 17),
            ttl: 50,
            dscp: DscpPolicy::CopyInner,
            copy_inner_df: false,
        };
        let term = TerminatorSpec::reversed(&initiator, None);
        assert_eq!(term.key().to_string(), "vxlan 171.0.0.17/32->170.0.0.17/32");
    }
}
