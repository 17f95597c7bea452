//! FDB types.

use sonic_sai::api::{bridge_oid, FdbDestination, FdbEntry, FdbEntryKey, FdbEntryType};
use sonic_sai::LogicalPort;
use sonic_types::{BridgeDomainId, MacAddress};

/// One (domain, MAC) -> destination binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdbEntrySpec {
    pub domain: BridgeDomainId,
    pub mac: MacAddress,
    pub destination: FdbDestination,
    pub entry_type: FdbEntryType,
}

impl FdbEntrySpec {
    pub fn to_port(domain: BridgeDomainId, mac: MacAddress, port: LogicalPort) -> Self {
        Self {
            domain,
            mac,
            destination: FdbDestination::Port(port),
            entry_type: FdbEntryType::Static,
        }
    }

    pub fn key(&self) -> FdbEntryKey {
        FdbEntryKey {
            bridge: bridge_oid(self.domain),
            mac: self.mac,
        }
    }

    pub fn entry(&self) -> FdbEntry {
        FdbEntry {
            destination: self.destination,
            entry_type: self.entry_type,
        }
    }

    /// Checks the MAC against the destination kind.
    pub fn validate(&self) -> Result<(), String> {
        match self.destination {
            FdbDestination::Port(_) if !self.mac.is_unicast() || self.mac.is_zero() => Err(
                format!("port entry needs a unicast MAC, got {}", self.mac),
            ),
            FdbDestination::FloodGroup(_) if !self.mac.is_multicast() => Err(format!(
                "flood group entry needs a multicast MAC, got {}",
                self.mac
            )),
            _ => Ok(()),
        }
    }
}

pub(super) fn describe_destination(destination: &FdbDestination) -> String {
    match destination {
        FdbDestination::Port(port) => port.to_string(),
        FdbDestination::FloodGroup(group) => format!("group[{}]", group.index()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_sai::L2mcGroupOid;

    #[test]
    fn test_validate_mac_kind() {
        let domain = BridgeDomainId::new(100).unwrap();
        let group = FdbDestination::FloodGroup(L2mcGroupOid::from_index(100));

        let flood = FdbEntrySpec {
            domain,
            mac: "01:00:5e:01:01:14".parse().unwrap(),
            destination: group,
            entry_type: FdbEntryType::Static,
        };
        assert!(flood.validate().is_ok());

        let unicast_to_group = FdbEntrySpec {
            mac: "00:00:00:00:00:f1".parse().unwrap(),
            ..flood
        };
        assert!(unicast_to_group.validate().is_err());

        let zero_to_port = FdbEntrySpec::to_port(
            domain,
            MacAddress::ZERO,
            LogicalPort::TunnelPort(sonic_sai::TunnelPortOid::from_index(1)),
        );
        assert!(zero_to_port.validate().is_err());
    }
}
