//! Decoding of kind-specific settings.

use indexmap::IndexMap;
use netdecl_doc::DocNode;

use super::decode::Decoder;
use crate::error::Result;
use crate::model::params::{OvsController, OvsSettings};
use crate::model::tunnel::{PeerKeys, TunnelKeys};
use crate::model::{
    AccessPoint, AuthSettings, BondParams, BridgeParams, KindPayload, NmSettings, WireguardPeer,
};

/// Decode one kind-specific key into the payload.
pub(crate) fn decode_kind_key(
    d: &mut Decoder<'_>,
    payload: &mut KindPayload,
    key: &str,
    v: &DocNode,
) -> Result<()> {
    match payload {
        KindPayload::Ethernet(s) if key == "auth" => s.auth = Some(decode_auth(d, v)?),
        KindPayload::Wifi(s) if key == "access-points" => {
            s.access_points = Some(decode_access_points(d, v)?)
        }
        KindPayload::Modem(m) => {
            match key {
                "apn" => m.apn = d.opt_string(v, key)?,
                "auto-config" => m.auto_config = d.opt_bool(v, key)?,
                "device-id" => m.device_id = d.opt_string(v, key)?,
                "network-id" => m.network_id = d.opt_string(v, key)?,
                "number" => m.number = d.opt_string(v, key)?,
                "password" => m.password = d.opt_string(v, key)?,
                "pin" => m.pin = d.opt_string(v, key)?,
                "sim-id" => m.sim_id = d.opt_string(v, key)?,
                "sim-operator-id" => m.sim_operator_id = d.opt_string(v, key)?,
                "username" => m.username = d.opt_string(v, key)?,
                _ => {}
            }
        }
        KindPayload::Bridge(p) if key == "parameters" => *p = Some(decode_bridge_params(d, v)?),
        KindPayload::Bond(p) if key == "parameters" => *p = Some(decode_bond_params(d, v)?),
        KindPayload::Vlan(s) if key == "id" => s.id = Some(d.uint(v, "vlan id")?),
        KindPayload::Vrf(s) if key == "table" => s.table = Some(d.uint(v, "vrf table")?),
        KindPayload::Tunnel(t) => match key {
            "mode" => t.mode = Some(d.enumerated(v, "tunnel mode")?),
            "local" => t.local = Some(d.string(v, key)?),
            "remote" => t.remote = Some(d.string(v, key)?),
            "key" => t.key = Some(d.string(v, key)?),
            "keys" => t.keys = Some(decode_tunnel_keys(d, v)?),
            "ttl" => t.ttl = Some(d.uint(v, key)?),
            "port" => t.port = Some(d.uint(v, key)?),
            "id" => t.vni = Some(d.uint(v, "vxlan id")?),
            "mark" => t.mark = Some(d.uint(v, key)?),
            "peers" => t.peers = Some(decode_peers(d, v)?),
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

pub(crate) fn decode_auth(d: &Decoder<'_>, node: &DocNode) -> Result<AuthSettings> {
    let mut a = AuthSettings::default();
    for entry in d.mapping(node, "auth")? {
        let v = &entry.value;
        let key = entry.key.as_str();
        match key {
            "key-management" => a.key_management = d.opt_enum(v, "key-management")?,
            "method" => a.method = d.opt_enum(v, "auth method")?,
            "identity" => a.identity = d.opt_string(v, key)?,
            "anonymous-identity" => a.anonymous_identity = d.opt_string(v, key)?,
            "password" => a.password = d.opt_string(v, key)?,
            "ca-certificate" => a.ca_certificate = d.opt_string(v, key)?,
            "client-certificate" => a.client_certificate = d.opt_string(v, key)?,
            "client-key" => a.client_key = d.opt_string(v, key)?,
            "client-key-password" => a.client_key_password = d.opt_string(v, key)?,
            "phase2-auth" => a.phase2_auth = d.opt_string(v, key)?,
            _ => return Err(d.unknown_key(entry, "auth")),
        }
    }
    Ok(a)
}

fn decode_access_points(
    d: &mut Decoder<'_>,
    node: &DocNode,
) -> Result<IndexMap<String, AccessPoint>> {
    let mut out = IndexMap::new();
    for ap_entry in d.mapping(node, "access-points")? {
        let ssid = ap_entry.key.clone();
        d.mark(format!("access-points.{ssid}"), &ap_entry.value);
        if ap_entry.value.is_null() {
            continue;
        }
        let what = format!("access point '{ssid}'");
        let mut ap = AccessPoint::default();
        for entry in d.mapping(&ap_entry.value, &what)? {
            let v = &entry.value;
            let key = entry.key.as_str();
            d.mark(format!("access-points.{ssid}.{key}"), v);
            match key {
                "password" => ap.password = d.opt_string(v, key)?,
                "mode" => ap.mode = d.opt_enum(v, "wifi mode")?,
                "bssid" => ap.bssid = d.opt_string(v, key)?,
                "band" => ap.band = d.opt_enum(v, "wifi band")?,
                "channel" => ap.channel = d.opt_uint(v, key)?,
                "hidden" => ap.hidden = d.opt_bool(v, key)?,
                "auth" if !v.is_null() => ap.auth = Some(decode_auth(d, v)?),
                "networkmanager" if !v.is_null() => ap.networkmanager = Some(decode_nm(d, v)?),
                "auth" | "networkmanager" => {}
                _ => return Err(d.unknown_key(entry, &what)),
            }
        }
        out.insert(ssid, ap);
    }
    Ok(out)
}

fn decode_bridge_params(d: &mut Decoder<'_>, node: &DocNode) -> Result<BridgeParams> {
    let mut p = BridgeParams::default();
    for entry in d.mapping(node, "bridge parameters")? {
        let v = &entry.value;
        let key = entry.key.as_str();
        d.mark(format!("parameters.{key}"), v);
        if v.is_null() {
            continue;
        }
        match key {
            "ageing-time" | "aging-time" => p.ageing_time = Some(d.string(v, key)?),
            "priority" => p.priority = Some(d.uint(v, key)?),
            "port-priority" => p.port_priority = Some(d.uint_map(v, key)?),
            "forward-delay" => p.forward_delay = Some(d.string(v, key)?),
            "hello-time" => p.hello_time = Some(d.string(v, key)?),
            "max-age" => p.max_age = Some(d.string(v, key)?),
            "path-cost" => p.path_cost = Some(d.uint_map(v, key)?),
            "stp" => p.stp = Some(d.boolean(v, key)?),
            "vlan-filtering" => p.vlan_filtering = Some(d.boolean(v, key)?),
            "vlan-default-pvid" => p.vlan_default_pvid = Some(d.uint(v, key)?),
            "vlans" => p.vlans = Some(d.strings(v, key)?),
            _ => return Err(d.unknown_key(entry, "bridge parameters")),
        }
    }
    Ok(p)
}

fn decode_bond_params(d: &mut Decoder<'_>, node: &DocNode) -> Result<BondParams> {
    let mut p = BondParams::default();
    for entry in d.mapping(node, "bond parameters")? {
        let v = &entry.value;
        let key = entry.key.as_str();
        d.mark(format!("parameters.{key}"), v);
        if v.is_null() {
            continue;
        }
        match key {
            "mode" => p.mode = Some(d.enumerated(v, "bond mode")?),
            "lacp-rate" => p.lacp_rate = Some(d.enumerated(v, "lacp-rate")?),
            "mii-monitor-interval" => p.mii_monitor_interval = Some(d.string(v, key)?),
            "min-links" => p.min_links = Some(d.uint(v, key)?),
            "transmit-hash-policy" => {
                p.transmit_hash_policy = Some(d.enumerated(v, "transmit-hash-policy")?)
            }
            "ad-select" => p.ad_select = Some(d.enumerated(v, "ad-select")?),
            "all-members-active" => p.all_members_active = Some(d.boolean(v, key)?),
            "arp-interval" => p.arp_interval = Some(d.string(v, key)?),
            "arp-ip-targets" => p.arp_ip_targets = Some(d.strings(v, key)?),
            "arp-validate" => p.arp_validate = Some(d.enumerated(v, "arp-validate")?),
            "arp-all-targets" => p.arp_all_targets = Some(d.enumerated(v, "arp-all-targets")?),
            "up-delay" => p.up_delay = Some(d.string(v, key)?),
            "down-delay" => p.down_delay = Some(d.string(v, key)?),
            "fail-over-mac-policy" => {
                p.fail_over_mac_policy = Some(d.enumerated(v, "fail-over-mac-policy")?)
            }
            "gratuitous-arp" => p.gratuitous_arp = Some(d.uint(v, key)?),
            "packets-per-member" => p.packets_per_member = Some(d.uint(v, key)?),
            "primary-reselect-policy" => {
                p.primary_reselect_policy = Some(d.enumerated(v, "primary-reselect-policy")?)
            }
            "resend-igmp" => p.resend_igmp = Some(d.uint(v, key)?),
            "learn-packet-interval" => p.learn_packet_interval = Some(d.string(v, key)?),
            "primary" => p.primary = Some(d.string(v, key)?),
            _ => return Err(d.unknown_key(entry, "bond parameters")),
        }
    }
    Ok(p)
}

fn decode_tunnel_keys(d: &Decoder<'_>, node: &DocNode) -> Result<TunnelKeys> {
    let mut k = TunnelKeys::default();
    for entry in d.mapping(node, "tunnel keys")? {
        let v = &entry.value;
        let key = entry.key.as_str();
        match key {
            "input" => k.input = d.opt_string(v, key)?,
            "output" => k.output = d.opt_string(v, key)?,
            "private" => k.private = d.opt_string(v, key)?,
            _ => return Err(d.unknown_key(entry, "tunnel keys")),
        }
    }
    Ok(k)
}

fn decode_peers(d: &mut Decoder<'_>, node: &DocNode) -> Result<Vec<WireguardPeer>> {
    let mut out = Vec::new();
    for (idx, item) in d.sequence(node, "peers")?.iter().enumerate() {
        d.mark(format!("peers.{idx}"), item);
        let mut peer = WireguardPeer::default();
        for entry in d.mapping(item, "wireguard peer")? {
            let v = &entry.value;
            let key = entry.key.as_str();
            match key {
                "keys" => {
                    let mut keys = PeerKeys::default();
                    for k in d.mapping(v, "peer keys")? {
                        match k.key.as_str() {
                            "public" => keys.public = d.opt_string(&k.value, "public")?,
                            "shared" => keys.shared = d.opt_string(&k.value, "shared")?,
                            _ => return Err(d.unknown_key(k, "peer keys")),
                        }
                    }
                    peer.keys = keys;
                }
                "allowed-ips" => peer.allowed_ips = d.opt_strings(v, key)?,
                "endpoint" => peer.endpoint = d.opt_string(v, key)?,
                "keepalive" => peer.keepalive = d.opt_uint(v, key)?,
                _ => return Err(d.unknown_key(entry, "wireguard peer")),
            }
        }
        out.push(peer);
    }
    Ok(out)
}

pub(crate) fn decode_ovs(d: &Decoder<'_>, node: &DocNode) -> Result<OvsSettings> {
    let mut o = OvsSettings::default();
    for entry in d.mapping(node, "openvswitch")? {
        let v = &entry.value;
        let key = entry.key.as_str();
        match key {
            "fail-mode" => o.fail_mode = d.opt_enum(v, "fail-mode")?,
            "mcast-snooping" => o.mcast_snooping = d.opt_bool(v, key)?,
            "rstp" => o.rstp = d.opt_bool(v, key)?,
            "protocols" => o.protocols = d.opt_strings(v, key)?,
            "lacp" => o.lacp = d.opt_enum(v, "lacp")?,
            "external-ids" => o.external_ids = d.opt_string_map(v, key)?,
            "other-config" => o.other_config = d.opt_string_map(v, key)?,
            "controller" if v.is_null() => {}
            "controller" => {
                let mut c = OvsController::default();
                for ce in d.mapping(v, "controller")? {
                    match ce.key.as_str() {
                        "addresses" => c.addresses = d.opt_strings(&ce.value, "addresses")?,
                        "connection-mode" => {
                            c.connection_mode = d.opt_enum(&ce.value, "connection-mode")?
                        }
                        _ => return Err(d.unknown_key(ce, "controller")),
                    }
                }
                o.controller = Some(c);
            }
            _ => return Err(d.unknown_key(entry, "openvswitch")),
        }
    }
    Ok(o)
}

pub(crate) fn decode_nm(d: &Decoder<'_>, node: &DocNode) -> Result<NmSettings> {
    let mut nm = NmSettings::default();
    for entry in d.mapping(node, "networkmanager")? {
        let v = &entry.value;
        let key = entry.key.as_str();
        match key {
            "name" => nm.name = d.opt_string(v, key)?,
            "uuid" => nm.uuid = d.opt_string(v, key)?,
            "stable-id" => nm.stable_id = d.opt_string(v, key)?,
            "device" => nm.device = d.opt_string(v, key)?,
            "passthrough" => {
                let map = d.opt_string_map(v, key)?;
                if let Some(map) = &map {
                    if let Some(bad) = map.keys().find(|k| !k.contains('.')) {
                        return Err(d.semantic(
                            v,
                            format!("passthrough key '{bad}' must be written section.key"),
                        ));
                    }
                }
                nm.passthrough = map;
            }
            _ => return Err(d.unknown_key(entry, "networkmanager")),
        }
    }
    Ok(nm)
}

#[cfg(test)]
mod tests {
    use netdecl_doc::parse;

    use super::{decode_kind_key, decode_nm};
    use crate::model::params::BondMode;
    use crate::model::{DeviceKind, KindPayload};
    use crate::parse::decode::Decoder;

    #[test]
    fn bond_parameters_decode_enums() {
        let node = parse("mode: 802.3ad\nmii-monitor-interval: 100\n").expect("parse");
        let mut d = Decoder::new(None);
        let mut payload = KindPayload::empty(DeviceKind::Bond);
        decode_kind_key(&mut d, &mut payload, "parameters", &node).expect("decode");
        let KindPayload::Bond(Some(params)) = payload else {
            panic!("expected bond parameters");
        };
        assert_eq!(params.mode, Some(BondMode::Ieee8023ad));
        assert_eq!(params.mii_monitor_interval.as_deref(), Some("100"));
    }

    #[test]
    fn passthrough_keeps_insertion_order() {
        let node = parse("passthrough:\n  proxy.method: none\n  ethtool.feature-rx: \"true\"\n")
            .expect("parse");
        let nm = decode_nm(&Decoder::new(None), &node).expect("decode");
        let keys: Vec<_> = nm.passthrough.expect("passthrough").into_keys().collect();
        assert_eq!(keys, ["proxy.method", "ethtool.feature-rx"]);
    }
}
