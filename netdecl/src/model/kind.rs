use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Device kinds, one per top-level block of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKind {
    Ethernet,
    Wifi,
    Modem,
    Bridge,
    Bond,
    Vlan,
    Tunnel,
    Vrf,
    Dummy,
    Veth,
    /// Open vSwitch patch port, created from `openvswitch.ports`.
    OvsPort,
    /// Opaque NetworkManager device carried only through passthrough.
    NmDevice,
}

impl DeviceKind {
    /// Kinds that have a document block, in canonical block order.
    pub const BLOCKS: [DeviceKind; 11] = [
        DeviceKind::Ethernet,
        DeviceKind::Modem,
        DeviceKind::Wifi,
        DeviceKind::Bridge,
        DeviceKind::Bond,
        DeviceKind::Tunnel,
        DeviceKind::Veth,
        DeviceKind::Vlan,
        DeviceKind::Vrf,
        DeviceKind::Dummy,
        DeviceKind::NmDevice,
    ];

    pub fn block_name(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernets",
            Self::Wifi => "wifis",
            Self::Modem => "modems",
            Self::Bridge => "bridges",
            Self::Bond => "bonds",
            Self::Vlan => "vlans",
            Self::Tunnel => "tunnels",
            Self::Vrf => "vrfs",
            Self::Dummy => "dummy-devices",
            Self::Veth => "virtual-ethernets",
            Self::OvsPort => "openvswitch.ports",
            Self::NmDevice => "nm-devices",
        }
    }

    pub fn from_block(name: &str) -> Option<Self> {
        Self::BLOCKS
            .into_iter()
            .find(|kind| kind.block_name() == name)
    }

    /// Devices that exist in hardware and are bound with `match`.
    pub fn is_physical(self) -> bool {
        matches!(self, Self::Ethernet | Self::Wifi | Self::Modem)
    }

    /// Devices the backend has to create.
    pub fn is_virtual(self) -> bool {
        !self.is_physical() && self != Self::NmDevice
    }

    /// Devices that take members through `interfaces`.
    pub fn is_aggregator(self) -> bool {
        matches!(self, Self::Bridge | Self::Bond | Self::Vrf)
    }
}

/// Target network-management subsystem.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize, Deserialize,
)]
pub enum Backend {
    #[strum(serialize = "networkd")]
    #[serde(rename = "networkd")]
    Networkd,
    #[strum(serialize = "NetworkManager")]
    #[serde(rename = "NetworkManager")]
    NetworkManager,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{Backend, DeviceKind};

    #[test]
    fn block_names_round_trip() {
        for kind in DeviceKind::BLOCKS {
            assert_eq!(DeviceKind::from_block(kind.block_name()), Some(kind));
        }
        assert_eq!(DeviceKind::from_block("openvswitch.ports"), None);
    }

    #[test]
    fn backend_names_are_case_sensitive() {
        assert_eq!(Backend::from_str("NetworkManager"), Ok(Backend::NetworkManager));
        assert!(Backend::from_str("networkmanager").is_err());
        assert_eq!(Backend::Networkd.to_string(), "networkd");
    }
}
