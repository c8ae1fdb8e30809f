//! networkd backend: `.netdev`, `.network` units, supplicant and Open
//! vSwitch services for every device assigned to networkd.

pub mod link;
pub mod netdev;
pub mod network;
pub mod ovs;
pub mod wpa;

use tracing::debug;

use crate::context::EngineContext;
use crate::error::Result;
use crate::model::{Backend, DeviceKind, KindPayload, TunnelMode};
use crate::render::output::{OutputTree, MODE_GROUP_SECRET, MODE_PUBLIC};
use crate::state::{ResolvedDevice, State};
use crate::validate::capability;

pub const UNIT_DIR: &str = "run/systemd/network";

pub fn unit_path(ns: &str, id: &str, ext: &str) -> String {
    format!("{UNIT_DIR}/10-{ns}-{id}.{ext}")
}

/// Render every networkd device. A device the backend cannot express fails
/// the whole render.
pub fn render(state: &State, ctx: &EngineContext) -> Result<OutputTree> {
    let ns = &ctx.namespace;
    let mut tree = OutputTree::new();
    for dev in state.devices().filter(|dev| dev.backend == Backend::Networkd) {
        capability::check(state, dev, ctx)?;

        if let Some(unit) = netdev::netdev_unit(state, dev) {
            let mode = if is_wireguard(dev) {
                MODE_GROUP_SECRET
            } else {
                MODE_PUBLIC
            };
            tree.add_file(unit_path(ns, dev.id(), "netdev"), unit.to_string(), mode);
        }

        if needs_network_unit(state, dev) {
            let unit = network::network_unit(state, dev, ctx);
            tree.add_file(unit_path(ns, dev.id(), "network"), unit.to_string(), MODE_PUBLIC);
        }

        if let Some(iface) = state.interface_name(dev) {
            if wpa::render(&mut tree, ctx, iface, &dev.def.payload) {
                debug!(id = dev.id(), iface, "supplicant configured");
            }
        }
        debug!(id = dev.id(), "rendered for networkd");
    }
    tree.extend(ovs::render(state, ctx));
    Ok(tree)
}

fn is_wireguard(dev: &ResolvedDevice) -> bool {
    matches!(&dev.def.payload, KindPayload::Tunnel(t) if t.mode == Some(TunnelMode::Wireguard))
}

/// OVS patch ports and bonds are not kernel links networkd can match.
fn needs_network_unit(state: &State, dev: &ResolvedDevice) -> bool {
    match dev.kind() {
        DeviceKind::OvsPort | DeviceKind::NmDevice => false,
        DeviceKind::Bond => !state.is_ovs(dev),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::render;
    use crate::context::EngineContext;
    use crate::parse::Parser;

    fn render_yaml(yaml: &str) -> crate::error::Result<crate::render::output::OutputTree> {
        let mut parser = Parser::new();
        parser.load_str(yaml, None)?;
        let ctx = EngineContext::default();
        render(&parser.freeze(&ctx)?, &ctx)
    }

    #[test]
    fn vlan_on_ethernet() {
        let tree = render_yaml(
            "network:\n  ethernets:\n    eth0: {}\n  vlans:\n    vlan10: {id: 10, link: eth0, addresses: [10.0.10.2/24]}\n",
        )
        .expect("render");
        let parent = tree
            .contents("run/systemd/network/10-netdecl-eth0.network")
            .expect("parent");
        assert!(parent.contains("VLAN=vlan10\n"));
        let netdev = tree
            .contents("run/systemd/network/10-netdecl-vlan10.netdev")
            .expect("netdev");
        assert!(netdev.contains("[VLAN]\nId=10\n"));
        assert!(tree
            .contents("run/systemd/network/10-netdecl-vlan10.network")
            .expect("network")
            .contains("Address=10.0.10.2/24\n"));
    }

    #[test]
    fn modem_fails_the_render() {
        let err = render_yaml("network:\n  modems:\n    wwan0: {renderer: networkd, apn: internet}\n")
            .expect_err("must fail");
        assert!(err.message().contains("modems"));
    }

    #[test]
    fn nm_devices_are_left_alone() {
        let tree = render_yaml(
            "network:\n  renderer: NetworkManager\n  ethernets:\n    eth0: {dhcp4: true}\n",
        )
        .expect("render");
        assert!(tree.is_empty());
    }
}
