//! Canonical YAML output of definitions and whole states.
//!
//! Keys come out in a fixed order, blocks in [`DeviceKind::BLOCKS`] order
//! and devices in load order. Unset fields are omitted; a field path listed
//! in the context's `always_serialize` set is written as `null` when unset,
//! so that the document overrides lower tiers.

use indexmap::IndexMap;
use netdecl_doc::{write, DocNode};
use tracing::{debug, warn};

use crate::context::EngineContext;
use crate::error::{Error, Result};
use crate::model::tunnel::TunnelKeys;
use crate::model::{
    AccessPoint, Address, AuthSettings, Backend, BondParams, BridgeParams, DeviceDefinition,
    DeviceKind, DhcpOverrides, GlobalOvs, GlobalSettings, KindPayload, Match, ModemSettings,
    Nameservers, NmSettings, OvsSettings, Route, RoutingPolicyRule, TunnelSettings,
};
use crate::patch::split_path;
use crate::state::State;

/// Serialize a frozen state to YAML text.
pub fn state_to_yaml(state: &State, ctx: &EngineContext) -> Result<String> {
    let doc = state_document(state, ctx);
    to_text(&doc)
}

/// Serialize definitions and globals to YAML text.
pub fn definitions_to_yaml<'a>(
    defs: impl IntoIterator<Item = &'a DeviceDefinition>,
    globals: &GlobalSettings,
    always: &[String],
) -> Result<String> {
    to_text(&document(defs, globals, always))
}

fn to_text(doc: &DocNode) -> Result<String> {
    write(doc).map_err(|err| Error::semantic(format!("cannot serialize document: {err}"), None))
}

/// The document tree of a state. Patch ports come out as the global
/// `openvswitch.ports` list they were created from.
pub fn state_document(state: &State, ctx: &EngineContext) -> DocNode {
    let defs: Vec<&DeviceDefinition> = state
        .in_load_order()
        .into_iter()
        .map(|dev| &dev.def)
        .collect();
    document(defs, state.globals(), &ctx.always_serialize)
}

/// Build a `network:` document from definitions in the given order.
pub fn document<'a>(
    defs: impl IntoIterator<Item = &'a DeviceDefinition>,
    globals: &GlobalSettings,
    always: &[String],
) -> DocNode {
    let defs: Vec<&DeviceDefinition> = defs
        .into_iter()
        .filter(|def| def.kind() != DeviceKind::OvsPort)
        .collect();

    let mut network = DocNode::mapping();
    if let Some(version) = globals.version {
        network.insert("version", uint(version));
    }
    if let Some(renderer) = globals.renderer {
        network.insert("renderer", DocNode::string(renderer.to_string()));
    }
    if let Some(ovs) = &globals.openvswitch {
        network.insert("openvswitch", global_ovs(ovs));
    }

    for kind in DeviceKind::BLOCKS {
        let members: Vec<&DeviceDefinition> =
            defs.iter().copied().filter(|def| def.kind() == kind).collect();
        if members.is_empty() {
            continue;
        }
        let block_renderer = shared_block_renderer(&members);
        let mut block = DocNode::mapping();
        if let Some(renderer) = block_renderer {
            block.insert("renderer", DocNode::string(renderer.to_string()));
        }
        for def in members {
            // Without a shared block renderer an inherited one moves onto the device.
            let renderer = match block_renderer {
                Some(_) => def.renderer,
                None => def.renderer.or(def.block_renderer),
            };
            block.insert(def.id.clone(), definition_node(def, renderer));
        }
        network.insert(kind.block_name(), block);
    }

    let mut root = DocNode::mapping().with("network", network);
    for path in always {
        force_null(&mut root, path);
    }
    root
}

/// The block renderer, when every definition without its own renderer
/// carries the same one.
fn shared_block_renderer(defs: &[&DeviceDefinition]) -> Option<Backend> {
    let mut inherited = defs
        .iter()
        .filter(|def| def.renderer.is_none())
        .map(|def| def.block_renderer);
    let first = inherited.next()??;
    inherited.all(|r| r == Some(first)).then_some(first)
}

/// Insert `null` at `path` unless a value is already there.
fn force_null(root: &mut DocNode, path: &str) {
    let segments = split_path(path);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut node = root;
    for segment in parents {
        if node.get(segment).map_or(true, DocNode::is_null)
            && !node.insert(segment.clone(), DocNode::mapping())
        {
            warn!(path, "always-serialize path crosses a scalar");
            return;
        }
        let Some(next) = node.get_mut(segment) else {
            return;
        };
        node = next;
    }
    if node.get(last).is_none() {
        if node.insert(last.clone(), DocNode::null()) {
            debug!(path, "serialized as null");
        } else {
            warn!(path, "always-serialize path crosses a scalar");
        }
    }
}

/// Canonical mapping of one definition, without its ID.
pub fn definition(def: &DeviceDefinition) -> DocNode {
    definition_node(def, def.renderer)
}

fn definition_node(def: &DeviceDefinition, renderer: Option<Backend>) -> DocNode {
    let mut m = Fields::default();
    m.put("renderer", renderer.map(|r| DocNode::string(r.to_string())));
    m.put("match", def.matching.as_ref().map(matching));
    m.put("set-name", def.set_name.as_deref().map(DocNode::string));
    m.put("macaddress", def.macaddress.as_deref().map(DocNode::string));
    m.put("mtu", def.mtu.map(uint));
    m.put("wakeonlan", def.wakeonlan.map(boolean));
    m.put("optional", def.optional.map(boolean));
    m.put("critical", def.critical.map(boolean));
    m.put("link", def.link.as_deref().map(DocNode::string));
    m.put("peer", def.peer.as_deref().map(DocNode::string));
    m.put("interfaces", def.interfaces.as_deref().map(strings));
    payload(&mut m, &def.payload);
    m.put("dhcp4", def.dhcp4.map(boolean));
    m.put("dhcp6", def.dhcp6.map(boolean));
    m.put(
        "dhcp-identifier",
        def.dhcp_identifier.map(|v| DocNode::string(v.to_string())),
    );
    m.put("dhcp4-overrides", def.dhcp4_overrides.as_ref().map(overrides));
    m.put("dhcp6-overrides", def.dhcp6_overrides.as_ref().map(overrides));
    m.put("accept-ra", def.accept_ra.map(boolean));
    m.put("ipv6-privacy", def.ipv6_privacy.map(boolean));
    m.put(
        "link-local",
        def.link_local.as_ref().map(|_| {
            DocNode::sequence(
                def.link_local()
                    .into_iter()
                    .map(|ll| DocNode::string(ll.to_string()))
                    .collect(),
            )
        }),
    );
    m.put(
        "addresses",
        def.addresses
            .as_ref()
            .map(|a| DocNode::sequence(a.iter().map(address).collect())),
    );
    m.put("nameservers", def.nameservers.as_ref().map(nameservers));
    m.put(
        "routes",
        def.routes
            .as_ref()
            .map(|r| DocNode::sequence(r.iter().map(route).collect())),
    );
    m.put(
        "routing-policy",
        def.routing_policy
            .as_ref()
            .map(|r| DocNode::sequence(r.iter().map(rule).collect())),
    );
    m.put("openvswitch", def.openvswitch.as_ref().map(ovs));
    m.put("networkmanager", def.networkmanager.as_ref().map(nm));
    m.done()
}

/// Mapping builder that skips unset values.
struct Fields(DocNode);

impl Default for Fields {
    fn default() -> Self {
        Self(DocNode::mapping())
    }
}

impl Fields {
    fn put(&mut self, key: &str, value: Option<DocNode>) {
        if let Some(value) = value {
            self.0.insert(key, value);
        }
    }

    fn done(self) -> DocNode {
        self.0
    }
}

fn uint(v: u32) -> DocNode {
    DocNode::plain(v.to_string())
}

fn boolean(v: bool) -> DocNode {
    DocNode::plain(v.to_string())
}

fn strings(items: &[String]) -> DocNode {
    DocNode::sequence(items.iter().map(|s| DocNode::string(s.as_str())).collect())
}

fn string_map(map: &IndexMap<String, String>) -> DocNode {
    let mut node = DocNode::mapping();
    for (key, value) in map {
        node.insert(key.clone(), DocNode::string(value.as_str()));
    }
    node
}

fn uint_map(map: &IndexMap<String, u32>) -> DocNode {
    let mut node = DocNode::mapping();
    for (key, value) in map {
        node.insert(key.clone(), uint(*value));
    }
    node
}

fn text(value: &Option<String>) -> Option<DocNode> {
    value.as_deref().map(DocNode::string)
}

/// Durations read naturally unquoted (`100`, `2s`).
fn duration(value: &Option<String>) -> Option<DocNode> {
    value.as_deref().map(DocNode::plain)
}

fn enumerated<T: ToString>(value: Option<T>) -> Option<DocNode> {
    value.map(|v| DocNode::string(v.to_string()))
}

fn matching(m: &Match) -> DocNode {
    let mut f = Fields::default();
    f.put("name", text(&m.name));
    f.put("macaddress", text(&m.macaddress));
    f.put(
        "driver",
        m.driver.as_ref().map(|drivers| match drivers.as_slice() {
            [one] => DocNode::string(one.as_str()),
            many => strings(many),
        }),
    );
    f.done()
}

fn address(a: &Address) -> DocNode {
    if a.is_simple() {
        return DocNode::string(a.cidr.as_str());
    }
    let mut options = Fields::default();
    options.put("lifetime", enumerated(a.lifetime));
    options.put("label", text(&a.label));
    DocNode::mapping().with(a.cidr.clone(), options.done())
}

fn route(r: &Route) -> DocNode {
    let mut f = Fields::default();
    f.put("to", text(&r.to));
    f.put("via", text(&r.via));
    f.put("from", text(&r.from));
    f.put("metric", r.metric.map(uint));
    f.put("table", r.table.map(uint));
    f.put("scope", enumerated(r.scope));
    f.put("type", enumerated(r.route_type));
    f.put("on-link", r.on_link.map(boolean));
    f.put("mtu", r.mtu.map(uint));
    f.put("congestion-window", r.congestion_window.map(uint));
    f.put(
        "advertised-receive-window",
        r.advertised_receive_window.map(uint),
    );
    f.done()
}

fn rule(r: &RoutingPolicyRule) -> DocNode {
    let mut f = Fields::default();
    f.put("from", text(&r.from));
    f.put("to", text(&r.to));
    f.put("table", r.table.map(uint));
    f.put("priority", r.priority.map(uint));
    f.put("mark", r.mark.map(uint));
    f.put("type-of-service", r.type_of_service.map(|t| uint(u32::from(t))));
    f.put("input-interface", text(&r.input_interface));
    f.done()
}

fn nameservers(ns: &Nameservers) -> DocNode {
    let mut f = Fields::default();
    f.put("addresses", ns.addresses.as_deref().map(strings));
    f.put("search", ns.search.as_deref().map(strings));
    f.done()
}

fn overrides(o: &DhcpOverrides) -> DocNode {
    let mut f = Fields::default();
    f.put("use-dns", o.use_dns.map(boolean));
    f.put("use-ntp", o.use_ntp.map(boolean));
    f.put("send-hostname", o.send_hostname.map(boolean));
    f.put("use-hostname", o.use_hostname.map(boolean));
    f.put("use-mtu", o.use_mtu.map(boolean));
    f.put("hostname", text(&o.hostname));
    f.put("use-routes", o.use_routes.map(boolean));
    f.put("route-metric", o.route_metric.map(uint));
    f.put("use-domains", enumerated(o.use_domains));
    f.done()
}

fn payload(m: &mut Fields, payload: &KindPayload) {
    match payload {
        KindPayload::Ethernet(eth) => m.put("auth", eth.auth.as_ref().map(auth)),
        KindPayload::Wifi(wifi) => m.put(
            "access-points",
            wifi.access_points.as_ref().map(|aps| {
                let mut node = DocNode::mapping();
                for (ssid, ap) in aps {
                    node.insert(ssid.clone(), access_point(ap));
                }
                node
            }),
        ),
        KindPayload::Modem(modem) => modem_fields(m, modem),
        KindPayload::Bridge(params) => m.put("parameters", params.as_ref().map(bridge)),
        KindPayload::Bond(params) => m.put("parameters", params.as_ref().map(bond)),
        KindPayload::Vlan(vlan) => m.put("id", vlan.id.map(uint)),
        KindPayload::Vrf(vrf) => m.put("table", vrf.table.map(uint)),
        KindPayload::Tunnel(t) => tunnel(m, t),
        KindPayload::Dummy | KindPayload::Veth | KindPayload::OvsPort | KindPayload::NmDevice => {}
    }
}

fn auth(a: &AuthSettings) -> DocNode {
    let mut f = Fields::default();
    f.put("key-management", enumerated(a.key_management));
    f.put("method", enumerated(a.method));
    f.put("identity", text(&a.identity));
    f.put("anonymous-identity", text(&a.anonymous_identity));
    f.put("password", text(&a.password));
    f.put("ca-certificate", text(&a.ca_certificate));
    f.put("client-certificate", text(&a.client_certificate));
    f.put("client-key", text(&a.client_key));
    f.put("client-key-password", text(&a.client_key_password));
    f.put("phase2-auth", text(&a.phase2_auth));
    f.done()
}

fn access_point(ap: &AccessPoint) -> DocNode {
    let mut f = Fields::default();
    f.put("password", text(&ap.password));
    f.put("mode", enumerated(ap.mode));
    f.put("bssid", text(&ap.bssid));
    f.put("band", enumerated(ap.band));
    f.put("channel", ap.channel.map(uint));
    f.put("hidden", ap.hidden.map(boolean));
    f.put("auth", ap.auth.as_ref().map(auth));
    f.put("networkmanager", ap.networkmanager.as_ref().map(nm));
    f.done()
}

fn modem_fields(m: &mut Fields, modem: &ModemSettings) {
    m.put("apn", text(&modem.apn));
    m.put("auto-config", modem.auto_config.map(boolean));
    m.put("device-id", text(&modem.device_id));
    m.put("network-id", text(&modem.network_id));
    m.put("number", text(&modem.number));
    m.put("password", text(&modem.password));
    m.put("pin", text(&modem.pin));
    m.put("sim-id", text(&modem.sim_id));
    m.put("sim-operator-id", text(&modem.sim_operator_id));
    m.put("username", text(&modem.username));
}

fn bridge(p: &BridgeParams) -> DocNode {
    let mut f = Fields::default();
    f.put("ageing-time", duration(&p.ageing_time));
    f.put("priority", p.priority.map(uint));
    f.put("port-priority", p.port_priority.as_ref().map(uint_map));
    f.put("forward-delay", duration(&p.forward_delay));
    f.put("hello-time", duration(&p.hello_time));
    f.put("max-age", duration(&p.max_age));
    f.put("path-cost", p.path_cost.as_ref().map(uint_map));
    f.put("stp", p.stp.map(boolean));
    f.put("vlan-filtering", p.vlan_filtering.map(boolean));
    f.put("vlan-default-pvid", p.vlan_default_pvid.map(uint));
    f.put("vlans", p.vlans.as_deref().map(strings));
    f.done()
}

fn bond(p: &BondParams) -> DocNode {
    let mut f = Fields::default();
    f.put("mode", enumerated(p.mode));
    f.put("lacp-rate", enumerated(p.lacp_rate));
    f.put("mii-monitor-interval", duration(&p.mii_monitor_interval));
    f.put("min-links", p.min_links.map(uint));
    f.put("transmit-hash-policy", enumerated(p.transmit_hash_policy));
    f.put("ad-select", enumerated(p.ad_select));
    f.put("all-members-active", p.all_members_active.map(boolean));
    f.put("arp-interval", duration(&p.arp_interval));
    f.put("arp-ip-targets", p.arp_ip_targets.as_deref().map(strings));
    f.put("arp-validate", enumerated(p.arp_validate));
    f.put("arp-all-targets", enumerated(p.arp_all_targets));
    f.put("up-delay", duration(&p.up_delay));
    f.put("down-delay", duration(&p.down_delay));
    f.put("fail-over-mac-policy", enumerated(p.fail_over_mac_policy));
    f.put("gratuitous-arp", p.gratuitous_arp.map(uint));
    f.put("packets-per-member", p.packets_per_member.map(uint));
    f.put("primary-reselect-policy", enumerated(p.primary_reselect_policy));
    f.put("resend-igmp", p.resend_igmp.map(uint));
    f.put("learn-packet-interval", duration(&p.learn_packet_interval));
    f.put("primary", text(&p.primary));
    f.done()
}

fn tunnel_keys(k: &TunnelKeys) -> DocNode {
    let mut f = Fields::default();
    f.put("input", text(&k.input));
    f.put("output", text(&k.output));
    f.put("private", text(&k.private));
    f.done()
}

fn tunnel(m: &mut Fields, t: &TunnelSettings) {
    m.put("mode", enumerated(t.mode));
    m.put("local", text(&t.local));
    m.put("remote", text(&t.remote));
    m.put("key", text(&t.key));
    m.put("keys", t.keys.as_ref().map(tunnel_keys));
    m.put("ttl", t.ttl.map(uint));
    m.put("port", t.port.map(uint));
    m.put("id", t.vni.map(uint));
    m.put("mark", t.mark.map(uint));
    m.put(
        "peers",
        t.peers.as_ref().map(|peers| {
            DocNode::sequence(
                peers
                    .iter()
                    .map(|peer| {
                        let mut keys = Fields::default();
                        keys.put("public", text(&peer.keys.public));
                        keys.put("shared", text(&peer.keys.shared));
                        let mut f = Fields::default();
                        f.put("keys", Some(keys.done()));
                        f.put("allowed-ips", peer.allowed_ips.as_deref().map(strings));
                        f.put("endpoint", text(&peer.endpoint));
                        f.put("keepalive", peer.keepalive.map(uint));
                        f.done()
                    })
                    .collect(),
            )
        }),
    );
}

fn ovs(o: &OvsSettings) -> DocNode {
    let mut f = Fields::default();
    f.put("fail-mode", enumerated(o.fail_mode));
    f.put("mcast-snooping", o.mcast_snooping.map(boolean));
    f.put("rstp", o.rstp.map(boolean));
    f.put("protocols", o.protocols.as_deref().map(strings));
    f.put(
        "controller",
        o.controller.as_ref().map(|c| {
            let mut cf = Fields::default();
            cf.put("addresses", c.addresses.as_deref().map(strings));
            cf.put("connection-mode", enumerated(c.connection_mode));
            cf.done()
        }),
    );
    f.put("external-ids", o.external_ids.as_ref().map(string_map));
    f.put("other-config", o.other_config.as_ref().map(string_map));
    f.put("lacp", enumerated(o.lacp));
    f.done()
}

fn global_ovs(o: &GlobalOvs) -> DocNode {
    let mut f = Fields::default();
    f.put(
        "ports",
        o.ports.as_ref().map(|pairs| {
            DocNode::sequence(
                pairs
                    .iter()
                    .map(|(a, b)| {
                        DocNode::sequence(vec![DocNode::string(a.as_str()), DocNode::string(b.as_str())])
                    })
                    .collect(),
            )
        }),
    );
    f.put("external-ids", o.external_ids.as_ref().map(string_map));
    f.put("other-config", o.other_config.as_ref().map(string_map));
    f.put("protocols", o.protocols.as_deref().map(strings));
    f.done()
}

fn nm(n: &NmSettings) -> DocNode {
    let mut f = Fields::default();
    f.put("name", text(&n.name));
    f.put("uuid", text(&n.uuid));
    f.put("stable-id", text(&n.stable_id));
    f.put("device", text(&n.device));
    f.put("passthrough", n.passthrough.as_ref().map(string_map));
    f.done()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{definitions_to_yaml, state_to_yaml};
    use crate::context::EngineContext;
    use crate::model::GlobalSettings;
    use crate::parse::Parser;

    fn load(yaml: &str) -> Parser {
        let mut parser = Parser::new();
        parser.load_str(yaml, None).expect("load");
        parser
    }

    #[test]
    fn canonical_key_order_and_blocks() {
        let ctx = EngineContext::default();
        let state = load(
            "network:\n  bridges:\n    br0:\n      dhcp4: true\n      interfaces: [eth0]\n  ethernets:\n    eth0: {mtu: 9000}\n  version: 2\n",
        )
        .freeze(&ctx)
        .expect("freeze");
        assert_eq!(
            state_to_yaml(&state, &ctx).expect("yaml"),
            "network:\n  version: 2\n  ethernets:\n    eth0:\n      mtu: 9000\n  bridges:\n    br0:\n      interfaces:\n      - eth0\n      dhcp4: true\n"
        );
    }

    #[test]
    fn shared_block_renderer_stays_on_block() {
        let parser = load(
            "network:\n  ethernets:\n    renderer: NetworkManager\n    eth0: {}\n    eth1: {renderer: networkd}\n",
        );
        let text = definitions_to_yaml(parser.devices(), parser.globals(), &[]).expect("yaml");
        assert_eq!(
            text,
            "network:\n  ethernets:\n    renderer: NetworkManager\n    eth0: {}\n    eth1:\n      renderer: networkd\n"
        );
    }

    #[test]
    fn always_serialize_paths_become_null() {
        let parser = load("network:\n  ethernets:\n    eth0: {dhcp4: true}\n");
        let always = vec![
            "network.ethernets.eth0.mtu".to_string(),
            "network.ethernets.eth0.dhcp4".to_string(),
            "network.bonds.bond9".to_string(),
        ];
        let text =
            definitions_to_yaml(parser.devices(), &GlobalSettings::default(), &always).expect("yaml");
        assert_eq!(
            text,
            "network:\n  ethernets:\n    eth0:\n      dhcp4: true\n      mtu: null\n  bonds:\n    bond9: null\n"
        );
    }

    #[test]
    fn ovs_ports_are_written_as_global_pairs() {
        let ctx = EngineContext::default();
        let state = load(
            "network:\n  openvswitch:\n    ports: [[p0, p1]]\n  bridges:\n    ovs0: {interfaces: [p0], openvswitch: {}}\n    ovs1: {interfaces: [p1], openvswitch: {}}\n",
        )
        .freeze(&ctx)
        .expect("freeze");
        let text = state_to_yaml(&state, &ctx).expect("yaml");
        assert!(text.contains("  openvswitch:\n    ports:\n    - - p0\n      - p1\n"), "{text}");
        assert!(!text.contains("p0:"));
    }
}
