//! NetworkManager backend: one keyfile connection profile per device, or
//! per access point for wifi.
//!
//! Model fields are written first; the `networkmanager.passthrough` map
//! then fills keys the model left unset and appends sections it does not
//! know, in insertion order.

pub mod ip;
pub mod kinds;

use indexmap::IndexMap;
use netdecl_doc::Keyfile;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::Result;
use crate::model::params::split_passthrough_key;
use crate::model::{AccessPoint, Backend, DeviceKind, KindPayload, NmSettings};
use crate::render::output::{OutputTree, MODE_PUBLIC, MODE_SECRET};
use crate::state::{ResolvedDevice, State};
use crate::validate::capability;

pub const CONNECTION_DIR: &str = "run/NetworkManager/system-connections";
pub const CONF_DIR: &str = "run/NetworkManager/conf.d";

/// Namespace of the name-based connection UUIDs.
const UUID_NAMESPACE: Uuid = Uuid::from_u128(0x3f1c_9a52_7d04_4e8b_b6a1_52c9_0e7f_d318);

/// Deterministic connection UUID for a device, or one of its access points.
pub fn connection_uuid(id: &str, ssid: Option<&str>) -> Uuid {
    let name = match ssid {
        Some(ssid) => format!("{id}\0{ssid}"),
        None => id.to_string(),
    };
    Uuid::new_v5(&UUID_NAMESPACE, name.as_bytes())
}

/// File name stem of a profile. `/` cannot appear in a file name.
pub fn profile_name(ns: &str, id: &str, ssid: Option<&str>) -> String {
    match ssid {
        Some(ssid) => format!("{ns}-{id}-{}", ssid.replace('/', "_")),
        None => format!("{ns}-{id}"),
    }
}

pub fn profile_path(ns: &str, id: &str, ssid: Option<&str>) -> String {
    format!("{CONNECTION_DIR}/{}.nmconnection", profile_name(ns, id, ssid))
}

/// Build the keyfile of one connection.
pub fn profile(
    state: &State,
    dev: &ResolvedDevice,
    ctx: &EngineContext,
    ap: Option<(&str, &AccessPoint)>,
) -> Keyfile {
    let def = &dev.def;
    let ns = &ctx.namespace;
    let ssid = ap.map(|(ssid, _)| ssid);
    let ap_nm = ap.and_then(|(_, ap)| ap.networkmanager.as_ref());
    let nm = def.networkmanager.as_ref();

    let mut kf = Keyfile::new();
    let id = ap_nm
        .and_then(|n| n.name.clone())
        .or_else(|| nm.and_then(|n| n.name.clone()))
        .unwrap_or_else(|| profile_name(ns, dev.id(), ssid));
    kf.set("connection", "id", id);
    let uuid = ap_nm
        .and_then(|n| n.uuid.clone())
        .or_else(|| nm.and_then(|n| n.uuid.clone()))
        .unwrap_or_else(|| connection_uuid(dev.id(), ssid).to_string());
    kf.set("connection", "uuid", uuid);
    if let Some(kind) = kinds::connection_type(dev) {
        kf.set("connection", "type", kind);
    }
    let iface = nm
        .and_then(|n| n.device.as_deref())
        .or_else(|| state.interface_name(dev));
    if let Some(iface) = iface.filter(|_| def.kind() != DeviceKind::NmDevice) {
        kf.set("connection", "interface-name", iface);
    }
    if let Some(stable) = nm.and_then(|n| n.stable_id.as_deref()) {
        kf.set("connection", "stable-id", stable);
    }
    if let Some(agg) = state.aggregator_of(dev) {
        let slave_type = match agg.kind() {
            DeviceKind::Bridge => "bridge",
            DeviceKind::Bond => "bond",
            _ => "vrf",
        };
        kf.set("connection", "master", state.interface_name(agg).unwrap_or(agg.id()));
        kf.set("connection", "slave-type", slave_type);
    }

    let mut wifi_mode = None;
    if let Some((ssid, ap)) = ap {
        kinds::wifi_sections(&mut kf, dev, ssid, ap);
        wifi_mode = Some(ap.mode());
    } else {
        kinds::kind_sections(&mut kf, state, dev);
    }
    if def.kind() != DeviceKind::NmDevice {
        ip::ip_sections(&mut kf, state, dev, ctx, wifi_mode);
    }

    for settings in [ap_nm, nm].into_iter().flatten() {
        apply_passthrough(&mut kf, settings);
    }
    kf
}

/// Fill keys from passthrough that the model did not set.
pub fn apply_passthrough(kf: &mut Keyfile, nm: &NmSettings) {
    let Some(passthrough) = &nm.passthrough else { return };
    for (full, value) in passthrough {
        let Some((section, key)) = split_passthrough_key(full) else {
            warn!(key = %full, "ignoring passthrough key without section");
            continue;
        };
        if kf.contains(section, key) {
            debug!(key = %full, "model value wins over passthrough");
            continue;
        }
        kf.set(section, key, value.as_str());
    }
}

/// Every profile of one device, keyed by output path.
pub fn device_profiles(
    state: &State,
    dev: &ResolvedDevice,
    ctx: &EngineContext,
) -> IndexMap<String, Keyfile> {
    let ns = &ctx.namespace;
    let mut out = IndexMap::new();
    match &dev.def.payload {
        KindPayload::Wifi(wifi) => {
            for (ssid, ap) in wifi.access_points.iter().flatten() {
                out.insert(
                    profile_path(ns, dev.id(), Some(ssid)),
                    profile(state, dev, ctx, Some((ssid.as_str(), ap))),
                );
            }
        }
        KindPayload::OvsPort => {}
        _ => {
            out.insert(profile_path(ns, dev.id(), None), profile(state, dev, ctx, None));
        }
    }
    out
}

pub fn render(state: &State, ctx: &EngineContext) -> Result<OutputTree> {
    let mut tree = OutputTree::new();
    for dev in state
        .devices()
        .filter(|dev| dev.backend == Backend::NetworkManager)
    {
        capability::check(state, dev, ctx)?;
        for (path, kf) in device_profiles(state, dev, ctx) {
            tree.add_file(path, kf.to_string(), MODE_SECRET);
        }
        debug!(id = dev.id(), "rendered for NetworkManager");
    }
    if state.globals().renderer == Some(Backend::NetworkManager) {
        tree.add_file(
            format!("{CONF_DIR}/10-globally-managed-devices.conf"),
            "[keyfile]\nunmanaged-devices=none\n",
            MODE_PUBLIC,
        );
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{connection_uuid, render};
    use crate::context::EngineContext;
    use crate::parse::Parser;
    use crate::render::output::OutputTree;

    fn render_yaml(yaml: &str) -> crate::error::Result<OutputTree> {
        let mut parser = Parser::new();
        parser.load_str(yaml, None)?;
        let ctx = EngineContext::default();
        render(&parser.freeze(&ctx)?, &ctx)
    }

    #[test]
    fn dhcp_ethernet_profile() {
        let tree = render_yaml(
            "network:\n  renderer: NetworkManager\n  ethernets:\n    eth0: {dhcp4: true}\n",
        )
        .expect("render");
        let uuid = connection_uuid("eth0", None);
        assert_eq!(
            tree.contents("run/NetworkManager/system-connections/netdecl-eth0.nmconnection"),
            Some(
                format!(
                    "[connection]\nid=netdecl-eth0\nuuid={uuid}\ntype=ethernet\ninterface-name=eth0\n\n[ethernet]\n\n[ipv4]\nmethod=auto\n\n[ipv6]\nmethod=ignore\n"
                )
                .as_str()
            )
        );
        assert!(tree
            .contents("run/NetworkManager/conf.d/10-globally-managed-devices.conf")
            .is_some());
    }

    #[test]
    fn one_profile_per_access_point() {
        let tree = render_yaml(
            "network:\n  wifis:\n    wlan0:\n      renderer: NetworkManager\n      access-points:\n        home: {password: \"longenough\"}\n        office: {}\n",
        )
        .expect("render");
        assert!(tree
            .contents("run/NetworkManager/system-connections/netdecl-wlan0-home.nmconnection")
            .is_some());
        assert!(tree
            .contents("run/NetworkManager/system-connections/netdecl-wlan0-office.nmconnection")
            .is_some());
        assert_ne!(
            connection_uuid("wlan0", Some("home")),
            connection_uuid("wlan0", Some("office"))
        );
    }

    #[test]
    fn model_fields_win_over_passthrough() {
        let tree = render_yaml(
            "network:\n  renderer: NetworkManager\n  ethernets:\n    eth0:\n      dhcp4: true\n      networkmanager:\n        passthrough:\n          ipv4.method: disabled\n          ipv4.dns-priority: \"10\"\n          proxy.method: none\n",
        )
        .expect("render");
        let text = tree
            .contents("run/NetworkManager/system-connections/netdecl-eth0.nmconnection")
            .expect("profile");
        assert!(text.contains("[ipv4]\nmethod=auto\ndns-priority=10\n"));
        assert!(text.ends_with("[proxy]\nmethod=none\n"));
    }

    #[test]
    fn driver_match_without_rename_is_rejected() {
        let err = render_yaml(
            "network:\n  renderer: NetworkManager\n  ethernets:\n    lan:\n      match: {driver: ixgbe}\n",
        )
        .expect_err("must fail");
        assert!(err.message().contains("set-name"));
    }
}
