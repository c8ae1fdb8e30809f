//! Decoding of one device definition and its shared settings.

use netdecl_doc::{DocNode, NodeValue};

use super::decode::{opt, Decoder};
use super::payload;
use crate::error::Result;
use crate::model::ip::parse_cidr;
use crate::model::{
    Address, DeviceDefinition, DeviceKind, DhcpOverrides, Match, Nameservers, Route,
    RoutingPolicyRule,
};

/// A decoded definition plus the paths the document explicitly set to null,
/// relative to the definition (`["mtu"]`, `["dhcp4-overrides", "use-dns"]`).
#[derive(Debug, Clone)]
pub struct DeviceFragment {
    pub definition: DeviceDefinition,
    pub cleared: Vec<Vec<String>>,
}

const COMMON_KEYS: &[&str] = &[
    "renderer",
    "dhcp4",
    "dhcp6",
    "dhcp4-overrides",
    "dhcp6-overrides",
    "dhcp-identifier",
    "addresses",
    "routes",
    "routing-policy",
    "nameservers",
    "link-local",
    "accept-ra",
    "ipv6-privacy",
    "macaddress",
    "mtu",
    "optional",
    "critical",
    "openvswitch",
    "networkmanager",
];

const PHYSICAL_KEYS: &[&str] = &["match", "set-name", "wakeonlan"];

/// Document keys accepted for a kind.
pub fn allowed_keys(kind: DeviceKind) -> Vec<&'static str> {
    let specific: &[&str] = match kind {
        DeviceKind::Ethernet => &["auth"],
        DeviceKind::Wifi => &["access-points"],
        DeviceKind::Modem => &[
            "apn",
            "auto-config",
            "device-id",
            "network-id",
            "number",
            "password",
            "pin",
            "sim-id",
            "sim-operator-id",
            "username",
        ],
        DeviceKind::Bridge | DeviceKind::Bond => &["interfaces", "parameters"],
        DeviceKind::Vrf => &["interfaces", "table"],
        DeviceKind::Vlan => &["id", "link"],
        DeviceKind::Tunnel => &[
            "mode", "local", "remote", "key", "keys", "ttl", "port", "id", "peers", "mark", "link",
        ],
        DeviceKind::Veth => &["peer"],
        DeviceKind::Dummy | DeviceKind::OvsPort | DeviceKind::NmDevice => &[],
    };
    if kind == DeviceKind::NmDevice {
        return vec!["renderer", "networkmanager"];
    }
    let mut keys = COMMON_KEYS.to_vec();
    if kind.is_physical() {
        keys.extend_from_slice(PHYSICAL_KEYS);
    }
    keys.extend_from_slice(specific);
    keys
}

/// Decode the mapping of one definition found under a kind block.
pub(crate) fn decode_device(
    d: &mut Decoder<'_>,
    id: &str,
    kind: DeviceKind,
    node: &DocNode,
) -> Result<DeviceFragment> {
    let mut def = DeviceDefinition::new(id, kind);
    let mut cleared = Vec::new();
    let what = format!("{} '{id}'", kind.block_name());
    let allowed = allowed_keys(kind);

    for entry in d.mapping(node, &what)? {
        let key = entry.key.as_str();
        let v = &entry.value;
        if !allowed.contains(&key) {
            return Err(d.unknown_key(entry, &what));
        }
        d.mark(key, v);
        if v.is_null() {
            cleared.push(vec![key.to_string()]);
            continue;
        }
        null_paths(v, &mut vec![key.to_string()], &mut cleared);
        match key {
            "renderer" => def.renderer = Some(d.enumerated(v, "renderer")?),
            "dhcp4" => def.dhcp4 = Some(d.boolean(v, key)?),
            "dhcp6" => def.dhcp6 = Some(d.boolean(v, key)?),
            "dhcp4-overrides" => def.dhcp4_overrides = Some(decode_overrides(d, v, key)?),
            "dhcp6-overrides" => def.dhcp6_overrides = Some(decode_overrides(d, v, key)?),
            "dhcp-identifier" => def.dhcp_identifier = Some(d.enumerated(v, key)?),
            "addresses" => def.addresses = Some(decode_addresses(d, v)?),
            "routes" => def.routes = Some(decode_routes(d, v)?),
            "routing-policy" => def.routing_policy = Some(decode_rules(d, v)?),
            "nameservers" => def.nameservers = Some(decode_nameservers(d, v)?),
            "link-local" => {
                let items = d.sequence(v, key)?;
                let mut set = Vec::new();
                for item in items {
                    set.push(d.enumerated(item, "link-local")?);
                }
                def.link_local = Some(set);
            }
            "accept-ra" => def.accept_ra = Some(d.boolean(v, key)?),
            "ipv6-privacy" => def.ipv6_privacy = Some(d.boolean(v, key)?),
            "macaddress" => def.macaddress = Some(d.string(v, key)?),
            "mtu" => def.mtu = Some(d.uint(v, key)?),
            "optional" => def.optional = Some(d.boolean(v, key)?),
            "critical" => def.critical = Some(d.boolean(v, key)?),
            "wakeonlan" => def.wakeonlan = Some(d.boolean(v, key)?),
            "match" => def.matching = Some(decode_match(d, v)?),
            "set-name" => def.set_name = Some(d.string(v, key)?),
            "link" => def.link = Some(d.string(v, key)?),
            "peer" => def.peer = Some(d.string(v, key)?),
            "interfaces" => {
                let members = d.strings(v, key)?;
                for (idx, item) in d.sequence(v, key)?.iter().enumerate() {
                    d.mark(format!("interfaces.{idx}"), item);
                }
                def.interfaces = Some(members);
            }
            "openvswitch" => def.openvswitch = Some(payload::decode_ovs(d, v)?),
            "networkmanager" => def.networkmanager = Some(payload::decode_nm(d, v)?),
            _ => payload::decode_kind_key(d, &mut def.payload, key, v)?,
        }
    }

    Ok(DeviceFragment {
        definition: def,
        cleared,
    })
}

/// Collect the paths of null values nested in mappings below `node`.
/// Sequence items are replaced wholesale and never searched.
fn null_paths(node: &DocNode, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
    let Some(entries) = node.as_mapping() else {
        return;
    };
    for entry in entries {
        prefix.push(entry.key.clone());
        if entry.value.is_null() {
            out.push(prefix.clone());
        } else {
            null_paths(&entry.value, prefix, out);
        }
        prefix.pop();
    }
}

fn decode_overrides(d: &Decoder<'_>, node: &DocNode, what: &str) -> Result<DhcpOverrides> {
    let mut o = DhcpOverrides::default();
    for entry in d.mapping(node, what)? {
        let v = &entry.value;
        let key = entry.key.as_str();
        match key {
            "use-dns" => o.use_dns = d.opt_bool(v, key)?,
            "use-ntp" => o.use_ntp = d.opt_bool(v, key)?,
            "send-hostname" => o.send_hostname = d.opt_bool(v, key)?,
            "use-hostname" => o.use_hostname = d.opt_bool(v, key)?,
            "use-mtu" => o.use_mtu = d.opt_bool(v, key)?,
            "hostname" => o.hostname = d.opt_string(v, key)?,
            "use-routes" => o.use_routes = d.opt_bool(v, key)?,
            "route-metric" => o.route_metric = d.opt_uint(v, key)?,
            "use-domains" => o.use_domains = d.opt_enum(v, key)?,
            _ => return Err(d.unknown_key(entry, what)),
        }
    }
    Ok(o)
}

fn decode_addresses(d: &mut Decoder<'_>, node: &DocNode) -> Result<Vec<Address>> {
    let mut out = Vec::new();
    for (idx, item) in d.sequence(node, "addresses")?.iter().enumerate() {
        d.mark(format!("addresses.{idx}"), item);
        let address = match &item.value {
            NodeValue::Scalar(_) => Address::new(d.string(item, "addresses")?),
            NodeValue::Mapping(entries) if entries.len() == 1 => {
                let entry = &entries[0];
                let mut address = Address::new(entry.key.clone());
                for option in d.mapping(&entry.value, "address options")? {
                    let v = &option.value;
                    match option.key.as_str() {
                        "lifetime" => address.lifetime = d.opt_enum(v, "lifetime")?,
                        "label" => address.label = d.opt_string(v, "label")?,
                        _ => return Err(d.unknown_key(option, "address options")),
                    }
                }
                address
            }
            _ => {
                return Err(d.schema(
                    item,
                    "expected an address or a single-key mapping of address options",
                ))
            }
        };
        if parse_cidr(&address.cidr).is_none() {
            return Err(d.semantic(
                item,
                format!("malformed address '{}', expected prefix/length", address.cidr),
            ));
        }
        out.push(address);
    }
    Ok(out)
}

fn decode_routes(d: &mut Decoder<'_>, node: &DocNode) -> Result<Vec<Route>> {
    let mut out = Vec::new();
    for (idx, item) in d.sequence(node, "routes")?.iter().enumerate() {
        d.mark(format!("routes.{idx}"), item);
        let mut route = Route::default();
        for entry in d.mapping(item, "route")? {
            let v = &entry.value;
            let key = entry.key.as_str();
            d.mark(format!("routes.{idx}.{key}"), v);
            match key {
                "to" => route.to = d.opt_string(v, key)?,
                "via" => route.via = d.opt_string(v, key)?,
                "from" => route.from = d.opt_string(v, key)?,
                "metric" => route.metric = d.opt_uint(v, key)?,
                "table" => route.table = d.opt_uint(v, key)?,
                "scope" => route.scope = d.opt_enum(v, "route scope")?,
                "type" => route.route_type = d.opt_enum(v, "route type")?,
                "on-link" => route.on_link = d.opt_bool(v, key)?,
                "mtu" => route.mtu = d.opt_uint(v, key)?,
                "congestion-window" => route.congestion_window = d.opt_uint(v, key)?,
                "advertised-receive-window" => {
                    route.advertised_receive_window = d.opt_uint(v, key)?
                }
                _ => return Err(d.unknown_key(entry, "route")),
            }
        }
        out.push(route);
    }
    Ok(out)
}

fn decode_rules(d: &mut Decoder<'_>, node: &DocNode) -> Result<Vec<RoutingPolicyRule>> {
    let mut out = Vec::new();
    for (idx, item) in d.sequence(node, "routing-policy")?.iter().enumerate() {
        d.mark(format!("routing-policy.{idx}"), item);
        let mut rule = RoutingPolicyRule::default();
        for entry in d.mapping(item, "routing-policy rule")? {
            let v = &entry.value;
            let key = entry.key.as_str();
            d.mark(format!("routing-policy.{idx}.{key}"), v);
            match key {
                "from" => rule.from = d.opt_string(v, key)?,
                "to" => rule.to = d.opt_string(v, key)?,
                "table" => rule.table = d.opt_uint(v, key)?,
                "priority" => rule.priority = d.opt_uint(v, key)?,
                "mark" => rule.mark = d.opt_uint(v, key)?,
                "type-of-service" => {
                    rule.type_of_service = match d.opt_uint(v, key)? {
                        Some(tos) => Some(u8::try_from(tos).map_err(|_| {
                            d.semantic(v, format!("type-of-service {tos} out of range 0..=255"))
                        })?),
                        None => None,
                    }
                }
                "input-interface" => rule.input_interface = d.opt_string(v, key)?,
                _ => return Err(d.unknown_key(entry, "routing-policy rule")),
            }
        }
        out.push(rule);
    }
    Ok(out)
}

fn decode_nameservers(d: &Decoder<'_>, node: &DocNode) -> Result<Nameservers> {
    let mut ns = Nameservers::default();
    for entry in d.mapping(node, "nameservers")? {
        let v = &entry.value;
        match entry.key.as_str() {
            "addresses" => ns.addresses = d.opt_strings(v, "nameservers.addresses")?,
            "search" => ns.search = d.opt_strings(v, "nameservers.search")?,
            _ => return Err(d.unknown_key(entry, "nameservers")),
        }
    }
    Ok(ns)
}

fn decode_match(d: &Decoder<'_>, node: &DocNode) -> Result<Match> {
    let mut m = Match::default();
    for entry in d.mapping(node, "match")? {
        let v = &entry.value;
        match entry.key.as_str() {
            "name" => m.name = d.opt_string(v, "match.name")?,
            "macaddress" => m.macaddress = d.opt_string(v, "match.macaddress")?,
            "driver" => m.driver = opt(v, |n| d.one_or_many(n, "match.driver"))?,
            _ => return Err(d.unknown_key(entry, "match")),
        }
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use netdecl_doc::parse;

    use super::{decode_device, Decoder};
    use crate::error::ErrorKind;
    use crate::model::{DeviceKind, Lifetime};

    fn decode(kind: DeviceKind, yaml: &str) -> crate::error::Result<super::DeviceFragment> {
        let node = parse(yaml).expect("parse");
        let mut d = Decoder::new(None);
        decode_device(&mut d, "dev0", kind, &node)
    }

    #[test]
    fn addresses_accept_options_mapping() {
        let frag = decode(
            DeviceKind::Ethernet,
            "addresses:\n  - 10.0.0.2/24\n  - \"2001:db8::2/64\": {lifetime: 0, label: lan}\n",
        )
        .expect("decode");
        let addrs = frag.definition.addresses.expect("addresses");
        assert_eq!(addrs[0].cidr, "10.0.0.2/24");
        assert_eq!(addrs[1].lifetime, Some(Lifetime::Zero));
        assert_eq!(addrs[1].label.as_deref(), Some("lan"));
    }

    #[test]
    fn match_is_rejected_for_virtual_kinds() {
        let err = decode(DeviceKind::Bridge, "match: {name: eth0}\n").expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.message().contains("unknown key 'match'"));
    }

    #[test]
    fn null_values_are_reported_as_cleared() {
        let frag = decode(DeviceKind::Ethernet, "mtu: null\ndhcp4: true\n").expect("decode");
        assert_eq!(frag.cleared, [["mtu"]]);
        assert_eq!(frag.definition.dhcp4, Some(true));
    }

    #[test]
    fn nested_nulls_are_reported_by_path() {
        let frag = decode(
            DeviceKind::Ethernet,
            concat!(
                "dhcp4-overrides: {use-dns: null, route-metric: 100}\n",
                "networkmanager:\n",
                "  passthrough: {ethernet.wake-on-lan: null, ipv4.dns-priority: '10'}\n",
                "addresses: [10.0.0.2/24]\n",
            ),
        )
        .expect("decode");
        assert_eq!(
            frag.cleared,
            [
                vec!["dhcp4-overrides", "use-dns"],
                vec!["networkmanager", "passthrough", "ethernet.wake-on-lan"],
            ]
        );
        let def = frag.definition;
        assert_eq!(def.dhcp4_overrides.and_then(|o| o.route_metric), Some(100));
        let passthrough = def.networkmanager.and_then(|nm| nm.passthrough).expect("passthrough");
        assert_eq!(passthrough.keys().collect::<Vec<_>>(), ["ipv4.dns-priority"]);
    }

    #[test]
    fn malformed_address_points_at_item() {
        let err = decode(DeviceKind::Ethernet, "addresses: [10.0.0.300/24]\n").expect_err("fail");
        assert_eq!(err.kind(), ErrorKind::Semantic);
        assert_eq!(err.location().map(|l| l.line), Some(1));
    }
}
