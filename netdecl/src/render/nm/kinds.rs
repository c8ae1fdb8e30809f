//! Kind-specific keyfile sections.

use netdecl_doc::Keyfile;

use crate::model::params::duration_ms;
use crate::model::wifi::Band;
use crate::model::{
    AccessPoint, AuthSettings, BondParams, BridgeParams, DeviceKind, KeyManagement, KindPayload,
    ModemSettings, TunnelMode, TunnelSettings,
};
use crate::state::{ResolvedDevice, State};

/// `connection.type` for a device.
pub fn connection_type(dev: &ResolvedDevice) -> Option<&'static str> {
    Some(match &dev.def.payload {
        KindPayload::Ethernet(_) => "ethernet",
        KindPayload::Wifi(_) => "wifi",
        KindPayload::Modem(m) if m.is_gsm() => "gsm",
        KindPayload::Modem(_) => "cdma",
        KindPayload::Bridge(_) => "bridge",
        KindPayload::Bond(_) => "bond",
        KindPayload::Vlan(_) => "vlan",
        KindPayload::Vrf(_) => "vrf",
        KindPayload::Dummy => "dummy",
        KindPayload::Veth => "veth",
        KindPayload::Tunnel(t) => match t.mode? {
            TunnelMode::Wireguard => "wireguard",
            TunnelMode::Vxlan => "vxlan",
            _ => "ip-tunnel",
        },
        KindPayload::OvsPort | KindPayload::NmDevice => return None,
    })
}

/// Write the kind section, and `[bridge-port]` for bridge members.
pub fn kind_sections(kf: &mut Keyfile, state: &State, dev: &ResolvedDevice) {
    let def = &dev.def;
    match &def.payload {
        KindPayload::Ethernet(eth) => {
            link_settings(kf, "ethernet", dev);
            if let Some(auth) = &eth.auth {
                eap_section(kf, auth);
            }
        }
        KindPayload::Modem(m) => modem(kf, m),
        KindPayload::Bridge(params) => {
            kf.section_mut("bridge");
            if let Some(params) = params {
                bridge(kf, params);
            }
        }
        KindPayload::Bond(params) => {
            kf.section_mut("bond");
            if let Some(params) = params {
                bond(kf, params);
            }
        }
        KindPayload::Vlan(vlan) => {
            if let Some(id) = vlan.id {
                kf.set("vlan", "id", id.to_string());
            }
            if let Some(parent) = state.parent_of(dev) {
                kf.set("vlan", "parent", parent_name(state, parent));
            }
        }
        KindPayload::Vrf(vrf) => {
            if let Some(table) = vrf.table {
                kf.set("vrf", "table", table.to_string());
            }
        }
        KindPayload::Veth => {
            if let Some(peer) = state.peer_of(dev) {
                kf.set("veth", "peer", peer.id());
            }
        }
        KindPayload::Tunnel(t) => tunnel(kf, state, dev, t),
        _ => {}
    }
    if let Some(mtu) = def.mtu.filter(|_| !def.kind().is_physical()) {
        if let Some(section) = mtu_section(def.kind()) {
            kf.set(section, "mtu", mtu.to_string());
        }
    }

    if let Some(agg) = state.aggregator_of(dev) {
        if let KindPayload::Bridge(Some(params)) = &agg.def.payload {
            if let Some(cost) = params.path_cost.as_ref().and_then(|m| m.get(dev.id())) {
                kf.set("bridge-port", "path-cost", cost.to_string());
            }
            if let Some(prio) = params.port_priority.as_ref().and_then(|m| m.get(dev.id())) {
                kf.set("bridge-port", "priority", prio.to_string());
            }
        }
    }
}

fn mtu_section(kind: DeviceKind) -> Option<&'static str> {
    match kind {
        DeviceKind::Bond | DeviceKind::Bridge | DeviceKind::Vlan | DeviceKind::Dummy | DeviceKind::Veth => {
            Some("ethernet")
        }
        _ => None,
    }
}

fn parent_name(state: &State, parent: &ResolvedDevice) -> String {
    state
        .interface_name(parent)
        .unwrap_or(parent.id())
        .to_string()
}

/// MAC, MTU and wake-on-lan of a physical link.
fn link_settings(kf: &mut Keyfile, section: &str, dev: &ResolvedDevice) {
    let def = &dev.def;
    kf.section_mut(section);
    if let Some(mac) = def.matching.as_ref().and_then(|m| m.macaddress.as_deref()) {
        kf.set(section, "mac-address", mac.to_uppercase());
    }
    if let Some(mac) = &def.macaddress {
        kf.set(section, "cloned-mac-address", mac.to_uppercase());
    }
    if let Some(mtu) = def.mtu {
        kf.set(section, "mtu", mtu.to_string());
    }
    if def.wakeonlan == Some(true) && section == "ethernet" {
        kf.set(section, "wake-on-lan", "64");
    }
}

/// `[wifi]`, `[wifi-security]` and `[802-1x]` for one access point.
pub fn wifi_sections(kf: &mut Keyfile, dev: &ResolvedDevice, ssid: &str, ap: &AccessPoint) {
    kf.set("wifi", "ssid", ssid);
    kf.set("wifi", "mode", ap.mode().to_string());
    if let Some(bssid) = &ap.bssid {
        kf.set("wifi", "bssid", bssid.to_uppercase());
    }
    if let Some(band) = ap.band {
        let band = match band {
            Band::A => "a",
            Band::Bg => "bg",
        };
        kf.set("wifi", "band", band);
    }
    if let Some(channel) = ap.channel {
        kf.set("wifi", "channel", channel.to_string());
    }
    if ap.hidden == Some(true) {
        kf.set("wifi", "hidden", "true");
    }
    link_settings(kf, "wifi", dev);

    let auth = ap.effective_auth();
    let key_mgmt = match auth.effective_key_management() {
        KeyManagement::None => return,
        KeyManagement::Psk => "wpa-psk",
        KeyManagement::Sae => "sae",
        KeyManagement::Eap => "wpa-eap",
        KeyManagement::Ieee8021x => "ieee8021x",
    };
    kf.set("wifi-security", "key-mgmt", key_mgmt);
    if auth.uses_eap() {
        eap_section(kf, &auth);
    } else if let Some(psk) = &auth.password {
        kf.set("wifi-security", "psk", psk.as_str());
    }
}

fn eap_section(kf: &mut Keyfile, auth: &AuthSettings) {
    const SECTION: &str = "802-1x";
    if let Some(method) = auth.method {
        kf.set(SECTION, "eap", format!("{method};"));
    }
    let keys = [
        ("identity", &auth.identity),
        ("anonymous-identity", &auth.anonymous_identity),
        ("password", &auth.password),
        ("ca-cert", &auth.ca_certificate),
        ("client-cert", &auth.client_certificate),
        ("private-key", &auth.client_key),
        ("private-key-password", &auth.client_key_password),
        ("phase2-auth", &auth.phase2_auth),
    ];
    for (key, value) in keys {
        if let Some(value) = value {
            kf.set(SECTION, key, value.as_str());
        }
    }
}

fn modem(kf: &mut Keyfile, m: &ModemSettings) {
    let section = if m.is_gsm() { "gsm" } else { "cdma" };
    kf.section_mut(section);
    let strings = [
        ("apn", &m.apn),
        ("device-id", &m.device_id),
        ("network-id", &m.network_id),
        ("number", &m.number),
        ("password", &m.password),
        ("pin", &m.pin),
        ("sim-id", &m.sim_id),
        ("sim-operator-id", &m.sim_operator_id),
        ("username", &m.username),
    ];
    for (key, value) in strings {
        if let Some(value) = value {
            kf.set(section, key, value.as_str());
        }
    }
    if let Some(auto) = m.auto_config {
        kf.set(section, "auto-config", auto.to_string());
    }
}

/// NetworkManager bridge timers are whole seconds.
fn seconds(value: &Option<String>) -> Option<String> {
    let value = value.as_deref()?;
    Some(if value.bytes().all(|b| b.is_ascii_digit()) {
        value.to_string()
    } else {
        duration_ms(value).map_or_else(|| value.to_string(), |ms| (ms / 1000).to_string())
    })
}

fn bridge(kf: &mut Keyfile, p: &BridgeParams) {
    let entries = [
        ("ageing-time", seconds(&p.ageing_time)),
        ("priority", p.priority.map(|v| v.to_string())),
        ("forward-delay", seconds(&p.forward_delay)),
        ("hello-time", seconds(&p.hello_time)),
        ("max-age", seconds(&p.max_age)),
        ("stp", p.stp.map(|v| v.to_string())),
    ];
    for (key, value) in entries {
        if let Some(value) = value {
            kf.set("bridge", key, value);
        }
    }
}

/// NetworkManager bond timers are milliseconds.
fn millis(value: &Option<String>) -> Option<String> {
    let value = value.as_deref()?;
    Some(duration_ms(value).map_or_else(|| value.to_string(), |ms| ms.to_string()))
}

fn bond(kf: &mut Keyfile, p: &BondParams) {
    let entries = [
        ("mode", p.mode.map(|v| v.to_string())),
        ("lacp_rate", p.lacp_rate.map(|v| v.to_string())),
        ("miimon", millis(&p.mii_monitor_interval)),
        ("min_links", p.min_links.map(|v| v.to_string())),
        ("xmit_hash_policy", p.transmit_hash_policy.map(|v| v.to_string())),
        ("ad_select", p.ad_select.map(|v| v.to_string())),
        ("all_slaves_active", p.all_members_active.map(|v| u8::from(v).to_string())),
        ("arp_interval", millis(&p.arp_interval)),
        ("arp_ip_target", p.arp_ip_targets.as_ref().map(|t| t.join(","))),
        ("arp_validate", p.arp_validate.map(|v| v.to_string())),
        ("arp_all_targets", p.arp_all_targets.map(|v| v.to_string())),
        ("updelay", millis(&p.up_delay)),
        ("downdelay", millis(&p.down_delay)),
        ("fail_over_mac", p.fail_over_mac_policy.map(|v| v.to_string())),
        ("num_grat_arp", p.gratuitous_arp.map(|v| v.to_string())),
        ("packets_per_slave", p.packets_per_member.map(|v| v.to_string())),
        ("primary_reselect", p.primary_reselect_policy.map(|v| v.to_string())),
        ("resend_igmp", p.resend_igmp.map(|v| v.to_string())),
        ("lp_interval", millis(&p.learn_packet_interval)),
        ("primary", p.primary.clone()),
    ];
    for (key, value) in entries {
        if let Some(value) = value {
            kf.set("bond", key, value);
        }
    }
}

fn tunnel(kf: &mut Keyfile, state: &State, dev: &ResolvedDevice, t: &TunnelSettings) {
    let Some(mode) = t.mode else { return };
    let parent = state.parent_of(dev).map(|p| parent_name(state, p));
    match mode {
        TunnelMode::Wireguard => {
            kf.section_mut("wireguard");
            if let Some(key) = t.private_key() {
                kf.set("wireguard", "private-key", key);
            }
            if let Some(port) = t.port {
                kf.set("wireguard", "listen-port", port.to_string());
            }
            if let Some(mark) = t.mark {
                kf.set("wireguard", "fwmark", mark.to_string());
            }
            for peer in t.peers.iter().flatten() {
                let Some(public) = &peer.keys.public else { continue };
                let section = format!("wireguard-peer.{public}");
                kf.section_mut(&section);
                if let Some(endpoint) = &peer.endpoint {
                    kf.set(&section, "endpoint", endpoint.as_str());
                }
                if let Some(ips) = &peer.allowed_ips {
                    let ips: String = ips.iter().map(|ip| format!("{ip};")).collect();
                    kf.set(&section, "allowed-ips", ips);
                }
                if let Some(keepalive) = peer.keepalive {
                    kf.set(&section, "persistent-keepalive", keepalive.to_string());
                }
                if let Some(shared) = &peer.keys.shared {
                    kf.set(&section, "preshared-key", shared.as_str());
                    kf.set(&section, "preshared-key-flags", "0");
                }
            }
        }
        TunnelMode::Vxlan => {
            kf.section_mut("vxlan");
            let entries = [
                ("id", t.vni.map(|v| v.to_string())),
                ("local", t.local.clone()),
                ("remote", t.remote.clone()),
                ("destination-port", t.port.map(|v| v.to_string())),
                ("ttl", t.ttl.map(|v| v.to_string())),
                ("parent", parent),
            ];
            for (key, value) in entries {
                if let Some(value) = value {
                    kf.set("vxlan", key, value);
                }
            }
        }
        _ => {
            let entries = [
                ("mode", mode.nm_mode().map(|v| v.to_string())),
                ("local", t.local.clone()),
                ("remote", t.remote.clone()),
                ("ttl", t.ttl.map(|v| v.to_string())),
                ("input-key", t.input_key().filter(|_| mode.is_keyed()).map(str::to_string)),
                ("output-key", t.output_key().filter(|_| mode.is_keyed()).map(str::to_string)),
                ("parent", parent),
            ];
            for (key, value) in entries {
                if let Some(value) = value {
                    kf.set("ip-tunnel", key, value);
                }
            }
        }
    }
}
