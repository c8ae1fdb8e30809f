//! Import of NetworkManager keyfile profiles into definitions.
//!
//! A profile becomes one definition with ID `NM-<uuid>` and renderer
//! NetworkManager. Settings the model can express are mapped onto it;
//! every other key stays in `networkmanager.passthrough` as `section.key`
//! in file order, so rendering the definition again writes it back
//! unchanged. A profile whose mapped form would not validate, or whose type
//! has no block, is kept whole as an `nm-devices` entry.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use netdecl_doc::{parse_keyfile, Keyfile};
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::error::{Error, Location, Result};
use crate::model::params::{BondMode, HashPolicy, LacpRate};
use crate::model::tunnel::{PeerKeys, TunnelKeys};
use crate::model::wifi::Band;
use crate::model::{
    AccessPoint, Address, AuthSettings, Backend, BondParams, BridgeParams, DeviceDefinition,
    DeviceKind, DhcpIdentifier, DhcpOverrides, EapMethod, Family, GlobalSettings, KeyManagement,
    KindPayload, LinkLocal, Match, ModemSettings, Nameservers, NmSettings, Route,
    RoutingPolicyRule, TunnelMode, TunnelSettings, WifiMode, WireguardPeer,
};
use crate::resolve::resolve;
use crate::serialize::definitions_to_yaml;
use crate::validate::validate;

/// Read and import one keyfile.
pub fn import_file(path: &Path) -> Result<DeviceDefinition> {
    let text = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
    let kf = parse_keyfile(&text).map_err(|err| Error::from_keyfile(err, Some(path)))?;
    import_keyfile(&kf, Some(path))
}

/// `<root>/etc/<ns>/90-<id>.yaml`.
pub fn document_path(ctx: &EngineContext, def: &DeviceDefinition) -> PathBuf {
    ctx.tier_dir("etc").join(format!("90-{}.yaml", def.id))
}

/// Import a keyfile and write it as a document of the etc tier.
pub fn import_to_hierarchy(ctx: &EngineContext, keyfile: &Path) -> Result<PathBuf> {
    let def = import_file(keyfile)?;
    let globals = GlobalSettings {
        version: Some(2),
        ..GlobalSettings::default()
    };
    let text = definitions_to_yaml([&def], &globals, &[])?;
    let path = document_path(ctx, &def);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;
    }
    fs::write(&path, text).map_err(|err| Error::io(&path, err))?;
    info!(
        keyfile = %keyfile.display(),
        document = %path.display(),
        kind = def.kind().block_name(),
        "imported profile"
    );
    Ok(path)
}

/// Map a parsed keyfile onto a definition.
pub fn import_keyfile(kf: &Keyfile, file: Option<&Path>) -> Result<DeviceDefinition> {
    let missing = |key: &str| {
        Error::semantic(
            format!("keyfile lacks {key}"),
            file.map(|f| Location {
                file: Some(f.to_path_buf()),
                line: 1,
                column: 1,
            }),
        )
    };
    let uuid = kf.get("connection", "uuid").ok_or_else(|| missing("connection.uuid"))?;
    let kind_name = kf.get("connection", "type").ok_or_else(|| missing("connection.type"))?;
    let id = format!("NM-{uuid}");

    let Some(kind) = block_kind(kind_name, kf) else {
        debug!(id = %id, kind = kind_name, "no block for profile type");
        return Ok(opaque(&id, kf));
    };
    if kind == DeviceKind::Wifi && kf.get("wifi", "ssid").is_none() {
        return Err(missing("wifi.ssid"));
    }

    let mut profile = Profile::new(kf);
    let def = map_profile(&mut profile, &id, kind);
    if representable(&def, kind_name) {
        debug!(id = %id, kind = kind.block_name(), "mapped profile");
        Ok(def)
    } else {
        warn!(id = %id, kind = kind_name, "profile kept as nm-device");
        Ok(opaque(&id, kf))
    }
}

fn block_kind(kind: &str, kf: &Keyfile) -> Option<DeviceKind> {
    Some(match kind {
        "ethernet" | "802-3-ethernet" => DeviceKind::Ethernet,
        "wifi" | "802-11-wireless" => DeviceKind::Wifi,
        "gsm" | "cdma" => DeviceKind::Modem,
        "bridge" => DeviceKind::Bridge,
        "bond" => DeviceKind::Bond,
        "vlan" => DeviceKind::Vlan,
        "vrf" => DeviceKind::Vrf,
        "dummy" => DeviceKind::Dummy,
        "veth" => DeviceKind::Veth,
        "wireguard" | "vxlan" => DeviceKind::Tunnel,
        "ip-tunnel" => {
            let mode = kf.get("ip-tunnel", "mode")?.parse::<u8>().ok()?;
            TunnelMode::from_nm_mode(mode)?;
            DeviceKind::Tunnel
        }
        _ => return None,
    })
}

/// Whole profile as passthrough, minus the keys the definition carries.
fn opaque(id: &str, kf: &Keyfile) -> DeviceDefinition {
    let mut def = DeviceDefinition::new(id, DeviceKind::NmDevice);
    def.renderer = Some(Backend::NetworkManager);
    let mut profile = Profile::new(kf);
    let name = profile.take("connection", "id").map(str::to_string);
    let uuid = profile.take("connection", "uuid").map(str::to_string);
    def.networkmanager = Some(NmSettings {
        name,
        uuid,
        passthrough: Some(profile.leftovers()),
        ..NmSettings::default()
    });
    def
}

/// Check the mapped definition on its own.
fn representable(def: &DeviceDefinition, kind_name: &str) -> bool {
    if def.kind().is_physical() && !def.has_match() {
        return false;
    }
    if let KindPayload::Modem(modem) = &def.payload {
        // The rendered type follows the settings present.
        if modem.is_gsm() != (kind_name == "gsm") {
            return false;
        }
    }
    let ctx = EngineContext::default();
    let mut devices = IndexMap::new();
    devices.insert(def.id.clone(), def.clone());
    match resolve(devices, GlobalSettings::default(), &ctx).and_then(|state| validate(&state, &ctx)) {
        Ok(()) => true,
        Err(err) => {
            debug!(id = %def.id, error = %err.message(), "mapped profile does not validate");
            false
        }
    }
}

/// Keyfile reader that remembers which keys were mapped.
struct Profile<'a> {
    kf: &'a Keyfile,
    used: HashSet<(String, String)>,
}

impl<'a> Profile<'a> {
    fn new(kf: &'a Keyfile) -> Self {
        Self {
            kf,
            used: HashSet::new(),
        }
    }

    fn get(&self, section: &str, key: &str) -> Option<&'a str> {
        self.kf.get(section, key)
    }

    fn consume(&mut self, section: &str, key: &str) {
        self.used.insert((section.to_string(), key.to_string()));
    }

    fn take(&mut self, section: &str, key: &str) -> Option<&'a str> {
        let value = self.get(section, key)?;
        self.consume(section, key);
        Some(value)
    }

    fn take_string(&mut self, section: &str, key: &str) -> Option<String> {
        self.take(section, key).map(str::to_string)
    }

    /// Take a key only when it parses; otherwise it stays for passthrough.
    fn take_parsed<T: FromStr>(&mut self, section: &str, key: &str) -> Option<T> {
        let value = self.get(section, key)?.parse().ok()?;
        self.consume(section, key);
        Some(value)
    }

    /// Keys of a section in file order.
    fn keys(&self, section: &str) -> Vec<(&'a str, &'a str)> {
        self.kf
            .section(section)
            .map(|s| s.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect())
            .unwrap_or_default()
    }

    fn section_names(&self) -> Vec<&'a str> {
        self.kf.sections().map(|(name, _)| name).collect()
    }

    fn leftovers(&self) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        for (section, entries) in self.kf.sections() {
            for (key, value) in entries {
                if !self.used.contains(&(section.to_string(), key.clone())) {
                    out.insert(format!("{section}.{key}"), value.clone());
                }
            }
        }
        out
    }
}

/// NetworkManager writes lists as `a;b;`.
fn split_list(value: &str) -> Vec<String> {
    value
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn map_profile(p: &mut Profile<'_>, id: &str, kind: DeviceKind) -> DeviceDefinition {
    let mut def = DeviceDefinition::new(id, kind);
    def.renderer = Some(Backend::NetworkManager);
    p.consume("connection", "type");

    let mut nm = NmSettings {
        name: p.take_string("connection", "id"),
        uuid: p.take_string("connection", "uuid"),
        stable_id: p.take_string("connection", "stable-id"),
        ..NmSettings::default()
    };

    let iface = p.take_string("connection", "interface-name");
    if kind.is_physical() {
        let mac_section = if kind == DeviceKind::Wifi { "wifi" } else { "ethernet" };
        let matching = Match {
            name: iface,
            macaddress: p.take_string(mac_section, "mac-address"),
            driver: None,
        };
        if !matching.is_empty() {
            def.matching = Some(matching);
        }
    } else {
        nm.device = iface;
    }

    let mut ap_mode = false;
    match kind {
        DeviceKind::Ethernet => {
            link(p, &mut def, "ethernet");
            if p.get("ethernet", "wake-on-lan") == Some("64") {
                p.consume("ethernet", "wake-on-lan");
                def.wakeonlan = Some(true);
            }
            if let Some(auth) = eap(p) {
                def.payload = KindPayload::Ethernet(crate::model::EthernetSettings {
                    auth: Some(AuthSettings {
                        key_management: Some(KeyManagement::Ieee8021x),
                        ..auth
                    }),
                });
            }
        }
        DeviceKind::Wifi => {
            link(p, &mut def, "wifi");
            let (ssid, ap) = access_point(p);
            ap_mode = ap.mode == Some(WifiMode::Ap);
            let mut aps = IndexMap::new();
            aps.insert(ssid, ap);
            def.payload = KindPayload::Wifi(crate::model::WifiSettings {
                access_points: Some(aps),
            });
        }
        DeviceKind::Modem => {
            let section = p.get("connection", "type").unwrap_or("gsm");
            def.payload = KindPayload::Modem(modem(p, section));
        }
        DeviceKind::Bridge => {
            virtual_mtu(p, &mut def);
            def.payload = KindPayload::Bridge(bridge(p));
        }
        DeviceKind::Bond => {
            virtual_mtu(p, &mut def);
            def.payload = KindPayload::Bond(bond(p));
        }
        DeviceKind::Vlan => {
            virtual_mtu(p, &mut def);
            def.payload = KindPayload::Vlan(crate::model::VlanSettings {
                id: p.take_parsed("vlan", "id"),
            });
        }
        DeviceKind::Vrf => {
            def.payload = KindPayload::Vrf(crate::model::VrfSettings {
                table: p.take_parsed("vrf", "table"),
            });
        }
        DeviceKind::Dummy | DeviceKind::Veth => virtual_mtu(p, &mut def),
        DeviceKind::Tunnel => def.payload = KindPayload::Tunnel(tunnel(p)),
        DeviceKind::OvsPort | DeviceKind::NmDevice => {}
    }

    let enslaved = p.get("connection", "master").is_some();
    if !enslaved {
        ip(p, &mut def, Family::V4, ap_mode);
        ip(p, &mut def, Family::V6, ap_mode);
    }

    let passthrough = p.leftovers();
    if !passthrough.is_empty() {
        nm.passthrough = Some(passthrough);
    }
    match &mut def.payload {
        // Profile identity belongs to the access point it was written for.
        KindPayload::Wifi(wifi) => {
            if let Some(ap) = wifi.access_points.iter_mut().flatten().map(|(_, ap)| ap).next() {
                ap.networkmanager = Some(nm);
            }
        }
        _ => def.networkmanager = Some(nm),
    }
    def
}

fn link(p: &mut Profile<'_>, def: &mut DeviceDefinition, section: &str) {
    def.macaddress = p.take_string(section, "cloned-mac-address");
    def.mtu = p.take_parsed(section, "mtu");
}

fn virtual_mtu(p: &mut Profile<'_>, def: &mut DeviceDefinition) {
    def.mtu = p.take_parsed("ethernet", "mtu");
}

fn access_point(p: &mut Profile<'_>) -> (String, AccessPoint) {
    let ssid = p.take_string("wifi", "ssid").unwrap_or_default();
    let mut ap = AccessPoint {
        mode: p.take_parsed("wifi", "mode"),
        bssid: p.take_string("wifi", "bssid"),
        channel: p.take_parsed("wifi", "channel"),
        ..AccessPoint::default()
    };
    ap.band = match p.get("wifi", "band") {
        Some("a") => Some(Band::A),
        Some("bg") => Some(Band::Bg),
        _ => None,
    };
    if ap.band.is_some() {
        p.consume("wifi", "band");
    }
    if p.get("wifi", "hidden") == Some("true") {
        p.consume("wifi", "hidden");
        ap.hidden = Some(true);
    }

    match p.get("wifi-security", "key-mgmt") {
        Some("wpa-psk") => {
            p.consume("wifi-security", "key-mgmt");
            ap.password = p.take_string("wifi-security", "psk");
        }
        Some("sae") => {
            p.consume("wifi-security", "key-mgmt");
            ap.auth = Some(AuthSettings {
                key_management: Some(KeyManagement::Sae),
                password: p.take_string("wifi-security", "psk"),
                ..AuthSettings::default()
            });
        }
        Some(mgmt @ ("wpa-eap" | "ieee8021x")) => {
            p.consume("wifi-security", "key-mgmt");
            let key_management = if mgmt == "wpa-eap" {
                KeyManagement::Eap
            } else {
                KeyManagement::Ieee8021x
            };
            ap.auth = Some(AuthSettings {
                key_management: Some(key_management),
                ..eap(p).unwrap_or_default()
            });
        }
        _ => {}
    }
    (ssid, ap)
}

/// `[802-1x]` settings. A list of several EAP methods is left alone.
fn eap(p: &mut Profile<'_>) -> Option<AuthSettings> {
    const SECTION: &str = "802-1x";
    p.kf.section(SECTION)?;
    let mut auth = AuthSettings::default();
    if let Some(methods) = p.get(SECTION, "eap") {
        if let [one] = split_list(methods).as_slice() {
            if let Ok(method) = EapMethod::from_str(one) {
                auth.method = Some(method);
                p.consume(SECTION, "eap");
            }
        }
    }
    auth.identity = p.take_string(SECTION, "identity");
    auth.anonymous_identity = p.take_string(SECTION, "anonymous-identity");
    auth.password = p.take_string(SECTION, "password");
    auth.ca_certificate = p.take_string(SECTION, "ca-cert");
    auth.client_certificate = p.take_string(SECTION, "client-cert");
    auth.client_key = p.take_string(SECTION, "private-key");
    auth.client_key_password = p.take_string(SECTION, "private-key-password");
    auth.phase2_auth = p.take_string(SECTION, "phase2-auth");
    Some(auth)
}

fn modem(p: &mut Profile<'_>, section: &str) -> ModemSettings {
    ModemSettings {
        apn: p.take_string(section, "apn"),
        auto_config: p.take_parsed(section, "auto-config"),
        device_id: p.take_string(section, "device-id"),
        network_id: p.take_string(section, "network-id"),
        number: p.take_string(section, "number"),
        password: p.take_string(section, "password"),
        pin: p.take_string(section, "pin"),
        sim_id: p.take_string(section, "sim-id"),
        sim_operator_id: p.take_string(section, "sim-operator-id"),
        username: p.take_string(section, "username"),
    }
}

/// Timer values are kept as written; both sides count whole seconds.
fn bridge(p: &mut Profile<'_>) -> Option<BridgeParams> {
    let params = BridgeParams {
        ageing_time: p.take_string("bridge", "ageing-time"),
        priority: p.take_parsed("bridge", "priority"),
        forward_delay: p.take_string("bridge", "forward-delay"),
        hello_time: p.take_string("bridge", "hello-time"),
        max_age: p.take_string("bridge", "max-age"),
        stp: p.take_parsed("bridge", "stp"),
        ..BridgeParams::default()
    };
    (params != BridgeParams::default()).then_some(params)
}

/// Bond options. `primary` stays in passthrough: it names an interface the
/// definition has no member for.
fn bond(p: &mut Profile<'_>) -> Option<BondParams> {
    const S: &str = "bond";
    fn millis(p: &mut Profile<'_>, key: &str) -> Option<String> {
        let value = p.get(S, key)?;
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        p.consume(S, key);
        Some(value.to_string())
    }
    let params = BondParams {
        mode: p.take_parsed::<BondMode>(S, "mode"),
        lacp_rate: p.take_parsed::<LacpRate>(S, "lacp_rate"),
        mii_monitor_interval: millis(p, "miimon"),
        min_links: p.take_parsed(S, "min_links"),
        transmit_hash_policy: p.take_parsed::<HashPolicy>(S, "xmit_hash_policy"),
        ad_select: p.take_parsed(S, "ad_select"),
        all_members_active: match p.get(S, "all_slaves_active") {
            Some(v @ ("0" | "1")) => {
                p.consume(S, "all_slaves_active");
                Some(v == "1")
            }
            _ => None,
        },
        arp_interval: millis(p, "arp_interval"),
        arp_ip_targets: p.take(S, "arp_ip_target").map(split_list),
        arp_validate: p.take_parsed(S, "arp_validate"),
        arp_all_targets: p.take_parsed(S, "arp_all_targets"),
        up_delay: millis(p, "updelay"),
        down_delay: millis(p, "downdelay"),
        fail_over_mac_policy: p.take_parsed(S, "fail_over_mac"),
        gratuitous_arp: p.take_parsed(S, "num_grat_arp"),
        packets_per_member: p.take_parsed(S, "packets_per_slave"),
        primary_reselect_policy: p.take_parsed(S, "primary_reselect"),
        resend_igmp: p.take_parsed(S, "resend_igmp"),
        learn_packet_interval: millis(p, "lp_interval"),
        primary: None,
    };
    (params != BondParams::default()).then_some(params)
}

fn tunnel(p: &mut Profile<'_>) -> TunnelSettings {
    let mut t = TunnelSettings::default();
    match p.get("connection", "type") {
        Some("wireguard") => {
            t.mode = Some(TunnelMode::Wireguard);
            let private = p.take_string("wireguard", "private-key");
            if private.is_some() {
                t.keys = Some(TunnelKeys {
                    private,
                    ..TunnelKeys::default()
                });
            }
            t.port = p.take_parsed("wireguard", "listen-port");
            t.mark = p.take_parsed("wireguard", "fwmark");
            let peers: Vec<WireguardPeer> = p
                .section_names()
                .into_iter()
                .filter_map(|section| {
                    let public = section.strip_prefix("wireguard-peer.")?;
                    Some(wireguard_peer(p, section, public))
                })
                .collect();
            if !peers.is_empty() {
                t.peers = Some(peers);
            }
        }
        Some("vxlan") => {
            t.mode = Some(TunnelMode::Vxlan);
            t.vni = p.take_parsed("vxlan", "id");
            t.local = p.take_string("vxlan", "local");
            t.remote = p.take_string("vxlan", "remote");
            t.port = p.take_parsed("vxlan", "destination-port");
            t.ttl = p.take_parsed("vxlan", "ttl");
        }
        _ => {
            t.mode = p
                .take_parsed::<u8>("ip-tunnel", "mode")
                .and_then(TunnelMode::from_nm_mode);
            t.local = p.take_string("ip-tunnel", "local");
            t.remote = p.take_string("ip-tunnel", "remote");
            t.ttl = p.take_parsed("ip-tunnel", "ttl");
            let input = p.take_string("ip-tunnel", "input-key");
            let output = p.take_string("ip-tunnel", "output-key");
            if input.is_some() || output.is_some() {
                t.keys = Some(TunnelKeys {
                    input,
                    output,
                    private: None,
                });
            }
        }
    }
    t
}

fn wireguard_peer(p: &mut Profile<'_>, section: &str, public: &str) -> WireguardPeer {
    let shared = p.take_string(section, "preshared-key");
    if shared.is_some() && p.get(section, "preshared-key-flags") == Some("0") {
        p.consume(section, "preshared-key-flags");
    }
    WireguardPeer {
        keys: PeerKeys {
            public: Some(public.to_string()),
            shared,
        },
        allowed_ips: p.take(section, "allowed-ips").map(split_list),
        endpoint: p.take_string(section, "endpoint"),
        keepalive: p.take_parsed(section, "persistent-keepalive"),
    }
}

fn ip(p: &mut Profile<'_>, def: &mut DeviceDefinition, family: Family, ap_mode: bool) {
    let section = match family {
        Family::V4 => "ipv4",
        Family::V6 => "ipv6",
    };
    if p.kf.section(section).is_none() {
        return;
    }

    let mut dhcp = false;
    match (family, p.get(section, "method")) {
        (_, Some("auto")) | (Family::V6, Some("dhcp")) => {
            dhcp = true;
            p.consume(section, "method");
        }
        (_, Some("manual" | "disabled")) | (Family::V6, Some("ignore")) => {
            p.consume(section, "method");
        }
        (_, Some("link-local")) => {
            p.consume(section, "method");
            let ll = match family {
                Family::V4 => LinkLocal::Ipv4,
                Family::V6 => LinkLocal::Ipv6,
            };
            def.link_local.get_or_insert_with(Vec::new).push(ll);
        }
        (Family::V4, Some("shared")) if ap_mode => p.consume(section, "method"),
        _ => {}
    }
    if dhcp {
        match family {
            Family::V4 => def.dhcp4 = Some(true),
            Family::V6 => def.dhcp6 = Some(true),
        }
    }

    addresses_and_routes(p, def, section, family);

    if let Some(servers) = p.take(section, "dns") {
        let ns = def.nameservers.get_or_insert_with(Nameservers::default);
        ns.addresses
            .get_or_insert_with(Vec::new)
            .extend(split_list(servers));
    }
    if let Some(search) = p.take(section, "dns-search") {
        let ns = def.nameservers.get_or_insert_with(Nameservers::default);
        let known = ns.search.get_or_insert_with(Vec::new);
        for domain in split_list(search) {
            if !known.contains(&domain) {
                known.push(domain);
            }
        }
    }

    if family == Family::V6 && p.get(section, "ip6-privacy") == Some("2") {
        p.consume(section, "ip6-privacy");
        def.ipv6_privacy = Some(true);
    }

    if dhcp {
        let overrides = dhcp_overrides(p, section);
        if overrides != DhcpOverrides::default() {
            match family {
                Family::V4 => def.dhcp4_overrides = Some(overrides),
                Family::V6 => def.dhcp6_overrides = Some(overrides),
            }
        }
        if family == Family::V4 && p.get(section, "dhcp-client-id") == Some("mac") {
            p.consume(section, "dhcp-client-id");
            def.dhcp_identifier = Some(DhcpIdentifier::Mac);
        }
    }
}

/// Addresses, gateway, routes and rules of one family. When any of them
/// does not parse, all of them stay in passthrough.
fn addresses_and_routes(p: &mut Profile<'_>, def: &mut DeviceDefinition, section: &str, family: Family) {
    let mut addresses = Vec::new();
    let mut routes = Vec::new();
    let mut rules = Vec::new();
    let mut keys = Vec::new();
    let mut gateway = p.get(section, "gateway").map(str::to_string);
    if gateway.is_some() {
        keys.push("gateway".to_string());
    }

    for (key, value) in p.keys(section) {
        if indexed(key, "address").is_some() {
            let (cidr, gw) = match value.split_once(',') {
                Some((cidr, gw)) => (cidr, Some(gw)),
                None => (value, None),
            };
            if crate::model::ip::parse_cidr(cidr).is_none() || Family::of_prefix(cidr) != Some(family) {
                return;
            }
            if let Some(gw) = gw {
                gateway.get_or_insert_with(|| gw.to_string());
            }
            addresses.push(Address::new(cidr));
        } else if indexed(key, "route").is_some() {
            let options = p.get(section, &format!("{key}_options"));
            let Some(route) = parse_route(value, options, family) else {
                return;
            };
            if options.is_some() {
                keys.push(format!("{key}_options"));
            }
            routes.push(route);
        } else if indexed(key, "routing-rule").is_some() {
            let Some(rule) = parse_rule(value) else {
                return;
            };
            rules.push(rule);
        } else {
            continue;
        }
        keys.push(key.to_string());
    }

    if let Some(gw) = gateway {
        if Family::of_prefix(&gw) != Some(family) {
            return;
        }
        routes.insert(
            0,
            Route {
                to: Some("default".to_string()),
                via: Some(gw),
                ..Route::default()
            },
        );
    }
    for key in keys {
        p.consume(section, &key);
    }
    if !addresses.is_empty() {
        def.addresses.get_or_insert_with(Vec::new).extend(addresses);
    }
    if !routes.is_empty() {
        def.routes.get_or_insert_with(Vec::new).extend(routes);
    }
    if !rules.is_empty() {
        def.routing_policy.get_or_insert_with(Vec::new).extend(rules);
    }
}

/// `prefix<N>` with a positive index.
fn indexed(key: &str, prefix: &str) -> Option<u32> {
    key.strip_prefix(prefix)?.parse().ok().filter(|n| *n > 0)
}

fn parse_route(value: &str, options: Option<&str>, family: Family) -> Option<Route> {
    let mut parts = value.split(',');
    let dest = parts.next()?;
    crate::model::ip::parse_cidr(dest)?;
    if Family::of_prefix(dest) != Some(family) {
        return None;
    }
    let mut route = Route {
        to: Some(dest.to_string()),
        ..Route::default()
    };
    if let Some(via) = parts.next().filter(|v| !v.is_empty()) {
        if Family::of_prefix(via) != Some(family) {
            return None;
        }
        if !matches!(via, "0.0.0.0" | "::") {
            route.via = Some(via.to_string());
        }
    }
    if let Some(metric) = parts.next() {
        route.metric = Some(metric.parse().ok()?);
    }
    if parts.next().is_some() {
        return None;
    }
    for option in options.map(split_list).unwrap_or_default() {
        let (key, value) = option.split_once('=')?;
        match key {
            "table" => route.table = Some(value.parse().ok()?),
            "onlink" => route.on_link = Some(value.parse().ok()?),
            "src" => route.from = Some(value.to_string()),
            "type" => route.route_type = Some(value.parse().ok()?),
            "mtu" => route.mtu = Some(value.parse().ok()?),
            "initcwnd" => route.congestion_window = Some(value.parse().ok()?),
            "initrwnd" => route.advertised_receive_window = Some(value.parse().ok()?),
            _ => return None,
        }
    }
    Some(route)
}

fn parse_rule(value: &str) -> Option<RoutingPolicyRule> {
    let mut rule = RoutingPolicyRule::default();
    let tokens: Vec<&str> = value.split_whitespace().collect();
    for pair in tokens.chunks(2) {
        let [key, value] = pair else {
            return None;
        };
        match *key {
            "priority" => rule.priority = Some(value.parse().ok()?),
            "from" => rule.from = Some(value.to_string()),
            "to" => rule.to = Some(value.to_string()),
            "tos" => {
                let hex = value.strip_prefix("0x").unwrap_or(value);
                rule.type_of_service = Some(u8::from_str_radix(hex, 16).ok()?);
            }
            "fwmark" => rule.mark = Some(value.parse().ok()?),
            "iif" => rule.input_interface = Some(value.to_string()),
            "table" => rule.table = Some(value.parse().ok()?),
            _ => return None,
        }
    }
    Some(rule)
}

fn dhcp_overrides(p: &mut Profile<'_>, section: &str) -> DhcpOverrides {
    let mut o = DhcpOverrides::default();
    if p.get(section, "ignore-auto-dns") == Some("true") {
        p.consume(section, "ignore-auto-dns");
        o.use_dns = Some(false);
    }
    if p.get(section, "ignore-auto-routes") == Some("true")
        && p.get(section, "never-default") == Some("true")
    {
        p.consume(section, "ignore-auto-routes");
        p.consume(section, "never-default");
        o.use_routes = Some(false);
    }
    o.route_metric = p.take_parsed(section, "route-metric");
    o.send_hostname = p.take_parsed(section, "dhcp-send-hostname");
    o.hostname = p.take_string(section, "dhcp-hostname");
    o
}
