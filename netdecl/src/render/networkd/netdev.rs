//! `.netdev` units for the devices networkd creates.

use crate::model::params::duration_ms;
use crate::model::{BondParams, BridgeParams, KindPayload, TunnelMode, TunnelSettings};
use crate::render::units::{UnitFile, UnitSection};
use crate::state::{ResolvedDevice, State};

/// The `.netdev` unit for `dev`, or `None` when networkd does not create it.
pub fn netdev_unit(state: &State, dev: &ResolvedDevice) -> Option<UnitFile> {
    if !dev.kind().is_virtual() || state.is_ovs(dev) {
        return None;
    }
    let def = &dev.def;
    let kind = match &def.payload {
        KindPayload::Bridge(_) => "bridge",
        KindPayload::Bond(_) => "bond",
        KindPayload::Vlan(_) => "vlan",
        KindPayload::Vrf(_) => "vrf",
        KindPayload::Dummy => "dummy",
        KindPayload::Veth => {
            // One netdev creates both ends of the pair.
            if state.peer_of(dev).is_some_and(|peer| peer.id() < dev.id()) {
                return None;
            }
            "veth"
        }
        KindPayload::Tunnel(tunnel) => tunnel.mode?.netdev_kind(),
        _ => return None,
    };

    let mut unit = UnitFile::new();
    unit.section("NetDev")
        .set("Name", dev.id())
        .set("Kind", kind)
        .set_opt("MTUBytes", def.mtu)
        .set_opt("MACAddress", def.macaddress.as_deref());

    match &def.payload {
        KindPayload::Bridge(Some(params)) => bridge(unit.section("Bridge"), params),
        KindPayload::Bond(Some(params)) => bond(unit.section("Bond"), params),
        KindPayload::Vlan(vlan) => {
            unit.section("VLAN").set_opt("Id", vlan.id);
        }
        KindPayload::Vrf(vrf) => {
            unit.section("VRF").set_opt("Table", vrf.table);
        }
        KindPayload::Veth => {
            if let Some(peer) = state.peer_of(dev) {
                unit.section("Peer").set("Name", peer.id());
            }
        }
        KindPayload::Tunnel(tunnel) => tunnel_sections(&mut unit, dev, tunnel),
        _ => {}
    }
    Some(unit)
}

fn bridge(section: &mut UnitSection, p: &BridgeParams) {
    section
        .set_opt("AgeingTimeSec", p.ageing_time.as_deref())
        .set_opt("Priority", p.priority)
        .set_opt("ForwardDelaySec", p.forward_delay.as_deref())
        .set_opt("HelloTimeSec", p.hello_time.as_deref())
        .set_opt("MaxAgeSec", p.max_age.as_deref())
        .set_bool("STP", p.stp);
}

/// Bond timers are milliseconds when unsuffixed; networkd reads seconds.
fn millis(value: &Option<String>) -> Option<String> {
    let value = value.as_deref()?;
    Some(match duration_ms(value) {
        Some(ms) if value.bytes().all(|b| b.is_ascii_digit()) => format!("{ms}ms"),
        _ => value.to_string(),
    })
}

fn bond(section: &mut UnitSection, p: &BondParams) {
    section
        .set_opt("Mode", p.mode)
        .set_opt("LACPTransmitRate", p.lacp_rate)
        .set_opt("MIIMonitorSec", millis(&p.mii_monitor_interval))
        .set_opt("MinLinks", p.min_links)
        .set_opt("TransmitHashPolicy", p.transmit_hash_policy)
        .set_opt("AdSelect", p.ad_select)
        .set_bool("AllSlavesActive", p.all_members_active)
        .set_opt("ARPIntervalSec", millis(&p.arp_interval))
        .set_opt(
            "ARPIPTargets",
            p.arp_ip_targets.as_ref().map(|targets| targets.join(" ")),
        )
        .set_opt("ARPValidate", p.arp_validate)
        .set_opt("ARPAllTargets", p.arp_all_targets)
        .set_opt("UpDelaySec", millis(&p.up_delay))
        .set_opt("DownDelaySec", millis(&p.down_delay))
        .set_opt("FailOverMACPolicy", p.fail_over_mac_policy)
        .set_opt("GratuitousARP", p.gratuitous_arp)
        .set_opt("PacketsPerSlave", p.packets_per_member)
        .set_opt("PrimaryReselectPolicy", p.primary_reselect_policy)
        .set_opt("ResendIGMP", p.resend_igmp)
        .set_opt("LearnPacketIntervalSec", millis(&p.learn_packet_interval));
}

fn tunnel_sections(unit: &mut UnitFile, dev: &ResolvedDevice, t: &TunnelSettings) {
    let Some(mode) = t.mode else { return };
    let independent = dev.def.link.is_none().then_some("true");
    match mode {
        TunnelMode::Wireguard => {
            let section = unit.section("WireGuard");
            key_or_file(section, "PrivateKey", t.private_key());
            section
                .set_opt("ListenPort", t.port)
                .set_opt("FirewallMark", t.mark);
            for peer in t.peers.iter().flatten() {
                let section = unit.section("WireGuardPeer");
                section.set_opt("PublicKey", peer.keys.public.as_deref());
                key_or_file(section, "PresharedKey", peer.keys.shared.as_deref());
                section
                    .set_opt(
                        "AllowedIPs",
                        peer.allowed_ips.as_ref().map(|ips| ips.join(",")),
                    )
                    .set_opt("Endpoint", peer.endpoint.as_deref())
                    .set_opt("PersistentKeepalive", peer.keepalive);
            }
        }
        TunnelMode::Vxlan => {
            unit.section("VXLAN")
                .set_opt("VNI", t.vni)
                .set_opt("Local", t.local.as_deref())
                .set_opt("Remote", t.remote.as_deref())
                .set_opt("DestinationPort", t.port)
                .set_opt("TTL", t.ttl)
                .set_opt("Independent", independent);
        }
        _ => {
            let section = unit.section("Tunnel");
            section
                .set_opt("Independent", independent)
                .set_opt("Local", t.local.as_deref())
                .set_opt("Remote", t.remote.as_deref())
                .set_opt("TTL", t.ttl);
            match mode {
                TunnelMode::Ipip6 | TunnelMode::Ip6ip6 => {
                    section.set("Mode", mode);
                }
                TunnelMode::Isatap => {
                    section.set("ISATAP", "true");
                }
                _ => {}
            }
            if mode.is_keyed() {
                section
                    .set_opt("InputKey", t.input_key())
                    .set_opt("OutputKey", t.output_key());
            }
        }
    }
}

/// Keys given as absolute paths are read from that file.
fn key_or_file(section: &mut UnitSection, key: &str, value: Option<&str>) {
    match value {
        Some(path) if path.starts_with('/') => {
            section.set(&format!("{key}File"), path);
        }
        other => {
            section.set_opt(key, other);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::netdev_unit;
    use crate::context::EngineContext;
    use crate::parse::Parser;
    use crate::state::State;

    fn state(yaml: &str) -> State {
        let mut parser = Parser::new();
        parser.load_str(yaml, None).expect("load");
        parser.freeze(&EngineContext::default()).expect("freeze")
    }

    #[test]
    fn bond_timers_default_to_milliseconds() {
        let state = state(
            "network:\n  bonds:\n    bond0:\n      parameters:\n        mode: 802.3ad\n        mii-monitor-interval: 100\n        up-delay: 2s\n",
        );
        let unit = netdev_unit(&state, state.get("bond0").expect("bond0")).expect("netdev");
        assert_eq!(
            unit.to_string(),
            "[NetDev]\nName=bond0\nKind=bond\n\n[Bond]\nMode=802.3ad\nMIIMonitorSec=100ms\nUpDelaySec=2s\n"
        );
    }

    #[test]
    fn veth_pair_is_created_once() {
        let state = state(
            "network:\n  virtual-ethernets:\n    veth1: {peer: veth0}\n    veth0: {peer: veth1}\n",
        );
        let first = netdev_unit(&state, state.get("veth0").expect("veth0")).expect("netdev");
        assert_eq!(first.get("Peer", "Name"), Some("veth1"));
        assert!(netdev_unit(&state, state.get("veth1").expect("veth1")).is_none());
    }

    #[test]
    fn wireguard_key_paths_use_file_settings() {
        let state = state(
            "network:\n  tunnels:\n    wg0:\n      mode: wireguard\n      port: 51820\n      key: /etc/wg/private.key\n      peers:\n        - keys: {public: \"pubkey=\"}\n          allowed-ips: [10.0.0.0/24, \"fd00::/64\"]\n          endpoint: 192.0.2.1:51820\n",
        );
        let unit = netdev_unit(&state, state.get("wg0").expect("wg0")).expect("netdev");
        assert_eq!(unit.get("WireGuard", "PrivateKeyFile"), Some("/etc/wg/private.key"));
        assert_eq!(unit.get("WireGuardPeer", "AllowedIPs"), Some("10.0.0.0/24,fd00::/64"));
    }

    #[test]
    fn physical_devices_have_no_netdev() {
        let state = state("network:\n  ethernets:\n    eth0: {}\n");
        assert!(netdev_unit(&state, state.get("eth0").expect("eth0")).is_none());
    }
}
