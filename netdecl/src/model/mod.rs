//! Device definitions and global settings of a network configuration.
//!
//! Every field is optional so that a definition can stand for a fragment of
//! one document as well as for the merged result of the whole hierarchy.
//! `None` means "not set here", which is different from a value equal to the
//! backend default.

pub mod ip;
pub mod kind;
pub mod merge;
pub mod params;
pub mod tunnel;
pub mod wifi;

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::error::Location;

pub use ip::{
    Address, DhcpIdentifier, DhcpOverrides, Family, Lifetime, LinkLocal, Nameservers, Route,
    RouteScope, RouteType, RoutingPolicyRule, UseDomains,
};
pub use kind::{Backend, DeviceKind};
pub use merge::{Clear, Merge};
pub use params::{
    is_glob, BondParams, BridgeParams, Match, ModemSettings, NmSettings, OvsSettings,
};
pub use tunnel::{TunnelMode, TunnelSettings, WireguardPeer};
pub use wifi::{AccessPoint, AuthSettings, EapMethod, KeyManagement, WifiMode};

use merge::{
    clear_map_nested, clear_nested, merge_map, merge_map_nested, merge_nested, merge_opt,
    merge_union,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EthernetSettings {
    pub auth: Option<AuthSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WifiSettings {
    pub access_points: Option<IndexMap<String, AccessPoint>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VlanSettings {
    pub id: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VrfSettings {
    pub table: Option<u32>,
}

/// Settings that only exist for one kind of device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindPayload {
    Ethernet(EthernetSettings),
    Wifi(WifiSettings),
    Modem(ModemSettings),
    Bridge(Option<BridgeParams>),
    Bond(Option<BondParams>),
    Vlan(VlanSettings),
    Tunnel(TunnelSettings),
    Vrf(VrfSettings),
    Dummy,
    Veth,
    OvsPort,
    NmDevice,
}

impl KindPayload {
    pub fn empty(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Ethernet => Self::Ethernet(EthernetSettings::default()),
            DeviceKind::Wifi => Self::Wifi(WifiSettings::default()),
            DeviceKind::Modem => Self::Modem(ModemSettings::default()),
            DeviceKind::Bridge => Self::Bridge(None),
            DeviceKind::Bond => Self::Bond(None),
            DeviceKind::Vlan => Self::Vlan(VlanSettings::default()),
            DeviceKind::Tunnel => Self::Tunnel(TunnelSettings::default()),
            DeviceKind::Vrf => Self::Vrf(VrfSettings::default()),
            DeviceKind::Dummy => Self::Dummy,
            DeviceKind::Veth => Self::Veth,
            DeviceKind::OvsPort => Self::OvsPort,
            DeviceKind::NmDevice => Self::NmDevice,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Ethernet(_) => DeviceKind::Ethernet,
            Self::Wifi(_) => DeviceKind::Wifi,
            Self::Modem(_) => DeviceKind::Modem,
            Self::Bridge(_) => DeviceKind::Bridge,
            Self::Bond(_) => DeviceKind::Bond,
            Self::Vlan(_) => DeviceKind::Vlan,
            Self::Tunnel(_) => DeviceKind::Tunnel,
            Self::Vrf(_) => DeviceKind::Vrf,
            Self::Dummy => DeviceKind::Dummy,
            Self::Veth => DeviceKind::Veth,
            Self::OvsPort => DeviceKind::OvsPort,
            Self::NmDevice => DeviceKind::NmDevice,
        }
    }

    fn merge(&mut self, later: Self) {
        match (self, later) {
            (Self::Ethernet(a), Self::Ethernet(b)) => merge_nested(&mut a.auth, b.auth),
            (Self::Wifi(a), Self::Wifi(b)) => {
                merge_map_nested(&mut a.access_points, b.access_points)
            }
            (Self::Modem(a), Self::Modem(b)) => a.merge(b),
            (Self::Bridge(a), Self::Bridge(b)) => merge_nested(a, b),
            (Self::Bond(a), Self::Bond(b)) => merge_nested(a, b),
            (Self::Vlan(a), Self::Vlan(b)) => merge_opt(&mut a.id, b.id),
            (Self::Tunnel(a), Self::Tunnel(b)) => a.merge(b),
            (Self::Vrf(a), Self::Vrf(b)) => merge_opt(&mut a.table, b.table),
            _ => {}
        }
    }

    /// Unset a kind-specific document key. Returns false for unknown keys.
    fn clear(&mut self, key: &str) -> bool {
        match (self, key) {
            (Self::Ethernet(s), "auth") => s.auth = None,
            (Self::Wifi(s), "access-points") => s.access_points = None,
            (Self::Bridge(p), "parameters") => *p = None,
            (Self::Bond(p), "parameters") => *p = None,
            (Self::Vlan(s), "id") => s.id = None,
            (Self::Vrf(s), "table") => s.table = None,
            (Self::Modem(m), key) => {
                let slot = match key {
                    "apn" => &mut m.apn,
                    "device-id" => &mut m.device_id,
                    "network-id" => &mut m.network_id,
                    "number" => &mut m.number,
                    "password" => &mut m.password,
                    "pin" => &mut m.pin,
                    "sim-id" => &mut m.sim_id,
                    "sim-operator-id" => &mut m.sim_operator_id,
                    "username" => &mut m.username,
                    "auto-config" => {
                        m.auto_config = None;
                        return true;
                    }
                    _ => return false,
                };
                *slot = None;
            }
            (Self::Tunnel(t), key) => match key {
                "mode" => t.mode = None,
                "local" => t.local = None,
                "remote" => t.remote = None,
                "key" => t.key = None,
                "keys" => t.keys = None,
                "ttl" => t.ttl = None,
                "port" => t.port = None,
                "id" => t.vni = None,
                "peers" => t.peers = None,
                "mark" => t.mark = None,
                _ => return false,
            },
            _ => return false,
        }
        true
    }

    /// Unset a field below a kind-specific key, such as one bond parameter.
    fn clear_below(&mut self, key: &str, rest: &[String]) -> bool {
        match (self, key) {
            (Self::Ethernet(s), "auth") => clear_nested(&mut s.auth, rest),
            (Self::Wifi(s), "access-points") => clear_map_nested(&mut s.access_points, rest),
            (Self::Bridge(p), "parameters") => clear_nested(p, rest),
            (Self::Bond(p), "parameters") => clear_nested(p, rest),
            (Self::Tunnel(t), "keys") => clear_nested(&mut t.keys, rest),
            _ => false,
        }
    }
}

/// Where a definition and its fields were read from.
///
/// Never part of structural equality: two definitions read from different
/// files compare equal when their contents do.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    /// The highest-precedence document that mentions the definition.
    pub origin_file: Option<PathBuf>,
    /// Position of the definition's key in that document.
    pub origin: Option<Location>,
    /// Position of individual values, keyed by dotted field path
    /// (`addresses.0`, `interfaces.1`, `parameters.priority`).
    pub marks: IndexMap<String, Location>,
}

impl Provenance {
    /// Position of a field, falling back to the definition itself.
    pub fn location(&self, field: &str) -> Option<Location> {
        self.marks
            .get(field)
            .or(self.origin.as_ref())
            .cloned()
    }

    fn merge(&mut self, later: Self) {
        if later.origin_file.is_some() {
            self.origin_file = later.origin_file;
            self.origin = later.origin;
        }
        self.marks.extend(later.marks);
    }
}

impl PartialEq for Provenance {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for Provenance {}

/// One device as declared, possibly merged from several documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDefinition {
    pub id: String,
    pub renderer: Option<Backend>,
    /// Renderer set on the kind block the definition was read from.
    pub block_renderer: Option<Backend>,
    pub matching: Option<Match>,
    pub set_name: Option<String>,
    pub addresses: Option<Vec<Address>>,
    pub routes: Option<Vec<Route>>,
    pub routing_policy: Option<Vec<RoutingPolicyRule>>,
    pub dhcp4: Option<bool>,
    pub dhcp6: Option<bool>,
    pub dhcp4_overrides: Option<DhcpOverrides>,
    pub dhcp6_overrides: Option<DhcpOverrides>,
    pub dhcp_identifier: Option<DhcpIdentifier>,
    pub nameservers: Option<Nameservers>,
    pub link_local: Option<Vec<LinkLocal>>,
    pub accept_ra: Option<bool>,
    pub ipv6_privacy: Option<bool>,
    pub macaddress: Option<String>,
    pub mtu: Option<u32>,
    pub optional: Option<bool>,
    pub wakeonlan: Option<bool>,
    pub critical: Option<bool>,
    pub link: Option<String>,
    pub peer: Option<String>,
    pub interfaces: Option<Vec<String>>,
    pub openvswitch: Option<OvsSettings>,
    pub networkmanager: Option<NmSettings>,
    pub payload: KindPayload,
    pub provenance: Provenance,
}

impl DeviceDefinition {
    pub fn new(id: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            renderer: None,
            block_renderer: None,
            matching: None,
            set_name: None,
            addresses: None,
            routes: None,
            routing_policy: None,
            dhcp4: None,
            dhcp6: None,
            dhcp4_overrides: None,
            dhcp6_overrides: None,
            dhcp_identifier: None,
            nameservers: None,
            link_local: None,
            accept_ra: None,
            ipv6_privacy: None,
            macaddress: None,
            mtu: None,
            optional: None,
            wakeonlan: None,
            critical: None,
            link: None,
            peer: None,
            interfaces: None,
            openvswitch: None,
            networkmanager: None,
            payload: KindPayload::empty(kind),
            provenance: Provenance::default(),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.payload.kind()
    }

    pub fn dhcp4(&self) -> bool {
        self.dhcp4.unwrap_or(false)
    }

    pub fn dhcp6(&self) -> bool {
        self.dhcp6.unwrap_or(false)
    }

    pub fn interfaces(&self) -> &[String] {
        self.interfaces.as_deref().unwrap_or(&[])
    }

    pub fn addresses(&self) -> &[Address] {
        self.addresses.as_deref().unwrap_or(&[])
    }

    pub fn routes(&self) -> &[Route] {
        self.routes.as_deref().unwrap_or(&[])
    }

    pub fn routing_policy(&self) -> &[RoutingPolicyRule] {
        self.routing_policy.as_deref().unwrap_or(&[])
    }

    /// Link-local families, defaulting to IPv6 only.
    pub fn link_local(&self) -> Vec<LinkLocal> {
        match &self.link_local {
            Some(set) => {
                let mut set = set.clone();
                set.sort();
                set.dedup();
                set
            }
            None => vec![LinkLocal::Ipv6],
        }
    }

    pub fn has_match(&self) -> bool {
        self.matching.as_ref().is_some_and(|m| !m.is_empty())
    }

    pub fn passthrough(&self) -> Option<&IndexMap<String, String>> {
        self.networkmanager.as_ref()?.passthrough.as_ref()
    }

    /// Every ID this definition refers to, with the field it came from.
    pub fn references(&self) -> Vec<(String, &str)> {
        let mut refs = Vec::new();
        if let Some(link) = &self.link {
            refs.push(("link".to_string(), link.as_str()));
        }
        if let Some(peer) = &self.peer {
            refs.push(("peer".to_string(), peer.as_str()));
        }
        for (idx, member) in self.interfaces().iter().enumerate() {
            refs.push((format!("interfaces.{idx}"), member.as_str()));
        }
        refs
    }

    /// Unset a top-level document key. Returns false for unknown keys.
    pub fn clear_field(&mut self, key: &str) -> bool {
        match key {
            "renderer" => self.renderer = None,
            "match" => self.matching = None,
            "set-name" => self.set_name = None,
            "addresses" => self.addresses = None,
            "routes" => self.routes = None,
            "routing-policy" => self.routing_policy = None,
            "dhcp4" => self.dhcp4 = None,
            "dhcp6" => self.dhcp6 = None,
            "dhcp4-overrides" => self.dhcp4_overrides = None,
            "dhcp6-overrides" => self.dhcp6_overrides = None,
            "dhcp-identifier" => self.dhcp_identifier = None,
            "nameservers" => self.nameservers = None,
            "link-local" => self.link_local = None,
            "accept-ra" => self.accept_ra = None,
            "ipv6-privacy" => self.ipv6_privacy = None,
            "macaddress" => self.macaddress = None,
            "mtu" => self.mtu = None,
            "optional" => self.optional = None,
            "wakeonlan" => self.wakeonlan = None,
            "critical" => self.critical = None,
            "link" => self.link = None,
            "peer" => self.peer = None,
            "interfaces" => self.interfaces = None,
            "openvswitch" => self.openvswitch = None,
            "networkmanager" => self.networkmanager = None,
            other => return self.payload.clear(other),
        }
        true
    }

    /// Unset the field at a document path below the definition, e.g.
    /// `["dhcp4-overrides", "use-dns"]` or
    /// `["networkmanager", "passthrough", "ethernet.wake-on-lan"]`.
    pub fn clear_path(&mut self, path: &[String]) -> bool {
        let Some((key, rest)) = path.split_first() else {
            return false;
        };
        if rest.is_empty() {
            return self.clear_field(key);
        }
        match key.as_str() {
            "match" => clear_nested(&mut self.matching, rest),
            "dhcp4-overrides" => clear_nested(&mut self.dhcp4_overrides, rest),
            "dhcp6-overrides" => clear_nested(&mut self.dhcp6_overrides, rest),
            "nameservers" => clear_nested(&mut self.nameservers, rest),
            "openvswitch" => clear_nested(&mut self.openvswitch, rest),
            "networkmanager" => clear_nested(&mut self.networkmanager, rest),
            other => self.payload.clear_below(other, rest),
        }
    }
}

impl Merge for DeviceDefinition {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.renderer, later.renderer);
        merge_opt(&mut self.block_renderer, later.block_renderer);
        merge_nested(&mut self.matching, later.matching);
        merge_opt(&mut self.set_name, later.set_name);
        merge_opt(&mut self.addresses, later.addresses);
        merge_opt(&mut self.routes, later.routes);
        merge_opt(&mut self.routing_policy, later.routing_policy);
        merge_opt(&mut self.dhcp4, later.dhcp4);
        merge_opt(&mut self.dhcp6, later.dhcp6);
        merge_nested(&mut self.dhcp4_overrides, later.dhcp4_overrides);
        merge_nested(&mut self.dhcp6_overrides, later.dhcp6_overrides);
        merge_opt(&mut self.dhcp_identifier, later.dhcp_identifier);
        merge_nested(&mut self.nameservers, later.nameservers);
        merge_opt(&mut self.link_local, later.link_local);
        merge_opt(&mut self.accept_ra, later.accept_ra);
        merge_opt(&mut self.ipv6_privacy, later.ipv6_privacy);
        merge_opt(&mut self.macaddress, later.macaddress);
        merge_opt(&mut self.mtu, later.mtu);
        merge_opt(&mut self.optional, later.optional);
        merge_opt(&mut self.wakeonlan, later.wakeonlan);
        merge_opt(&mut self.critical, later.critical);
        merge_opt(&mut self.link, later.link);
        merge_opt(&mut self.peer, later.peer);
        merge_union(&mut self.interfaces, later.interfaces);
        merge_nested(&mut self.openvswitch, later.openvswitch);
        merge_nested(&mut self.networkmanager, later.networkmanager);
        self.payload.merge(later.payload);
        self.provenance.merge(later.provenance);
    }
}

/// Global `openvswitch` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalOvs {
    /// Patch port pairs.
    pub ports: Option<Vec<(String, String)>>,
    pub external_ids: Option<IndexMap<String, String>>,
    pub other_config: Option<IndexMap<String, String>>,
    pub protocols: Option<Vec<String>>,
}

impl GlobalOvs {
    pub fn is_empty(&self) -> bool {
        self.ports.as_ref().map_or(true, Vec::is_empty)
            && self.external_ids.as_ref().map_or(true, IndexMap::is_empty)
            && self.other_config.as_ref().map_or(true, IndexMap::is_empty)
            && self.protocols.as_ref().map_or(true, Vec::is_empty)
    }
}

impl Merge for GlobalOvs {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.ports, later.ports);
        merge_map(&mut self.external_ids, later.external_ids);
        merge_map(&mut self.other_config, later.other_config);
        merge_opt(&mut self.protocols, later.protocols);
    }
}

/// Settings directly under `network:`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalSettings {
    pub version: Option<u32>,
    pub renderer: Option<Backend>,
    pub openvswitch: Option<GlobalOvs>,
}

impl Merge for GlobalSettings {
    fn merge(&mut self, later: Self) {
        merge_opt(&mut self.version, later.version);
        merge_opt(&mut self.renderer, later.renderer);
        merge_nested(&mut self.openvswitch, later.openvswitch);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use indexmap::IndexMap;

    use super::{
        BondParams, DeviceDefinition, DeviceKind, DhcpOverrides, KindPayload, Merge, NmSettings,
        VlanSettings,
    };

    fn path(text: &str) -> Vec<String> {
        text.split('/').map(str::to_string).collect()
    }

    #[test]
    fn merge_overrides_scalars_and_unions_members() {
        let mut first = DeviceDefinition::new("br0", DeviceKind::Bridge);
        first.interfaces = Some(vec!["eth0".into()]);
        first.mtu = Some(1500);
        let mut second = DeviceDefinition::new("br0", DeviceKind::Bridge);
        second.interfaces = Some(vec!["eth1".into(), "eth0".into()]);
        second.mtu = Some(9000);
        second.dhcp4 = Some(true);

        first.merge(second);
        assert_eq!(first.interfaces(), ["eth0", "eth1"]);
        assert_eq!(first.mtu, Some(9000));
        assert!(first.dhcp4());
    }

    #[test]
    fn provenance_is_ignored_by_equality() {
        let a = DeviceDefinition::new("eth0", DeviceKind::Ethernet);
        let mut b = a.clone();
        b.provenance.origin_file = Some(PathBuf::from("/etc/netdecl/a.yaml"));
        assert_eq!(a, b);
    }

    #[test]
    fn clear_field_reaches_kind_payload() {
        let mut vlan = DeviceDefinition::new("vlan10", DeviceKind::Vlan);
        vlan.payload = KindPayload::Vlan(VlanSettings { id: Some(10) });
        assert!(vlan.clear_field("id"));
        assert_eq!(vlan.payload, KindPayload::Vlan(VlanSettings { id: None }));
        assert!(!vlan.clear_field("access-points"));
    }

    #[test]
    fn clear_path_unsets_nested_fields() {
        let mut eth = DeviceDefinition::new("eth0", DeviceKind::Ethernet);
        eth.dhcp4_overrides = Some(DhcpOverrides {
            use_dns: Some(false),
            route_metric: Some(100),
            ..DhcpOverrides::default()
        });
        eth.networkmanager = Some(NmSettings {
            passthrough: Some(IndexMap::from([
                ("ethernet.wake-on-lan".to_string(), "0".to_string()),
                ("ipv4.dns-priority".to_string(), "10".to_string()),
            ])),
            ..NmSettings::default()
        });

        assert!(eth.clear_path(&path("dhcp4-overrides/use-dns")));
        assert!(eth.clear_path(&path("networkmanager/passthrough/ethernet.wake-on-lan")));
        let overrides = eth.dhcp4_overrides.as_ref().expect("overrides");
        assert_eq!(overrides.use_dns, None);
        assert_eq!(overrides.route_metric, Some(100));
        let passthrough = eth.passthrough().expect("passthrough");
        assert_eq!(passthrough.keys().collect::<Vec<_>>(), ["ipv4.dns-priority"]);
        assert!(!eth.clear_path(&path("dhcp4-overrides/use-dnz")));
    }

    #[test]
    fn clear_path_reaches_kind_parameters() {
        let mut bond = DeviceDefinition::new("bond0", DeviceKind::Bond);
        bond.payload = KindPayload::Bond(Some(BondParams {
            min_links: Some(2),
            primary: Some("eth0".into()),
            ..BondParams::default()
        }));
        assert!(bond.clear_path(&path("parameters/primary")));
        let KindPayload::Bond(Some(params)) = &bond.payload else {
            panic!("bond parameters");
        };
        assert_eq!(params.primary, None);
        assert_eq!(params.min_links, Some(2));
    }
}
