//! Open vSwitch setup as oneshot services running `ovs-vsctl`.
//!
//! Every object the services create is tagged with
//! `external-ids:<namespace>=true`, which is how the cleanup service finds
//! what an earlier generation left behind.

use indexmap::IndexMap;

use crate::context::EngineContext;
use crate::model::{DeviceKind, GlobalOvs, OvsSettings};
use crate::render::output::{OutputTree, MODE_PUBLIC};
use crate::render::units::UnitFile;
use crate::state::{ResolvedDevice, State};

const VSCTL: &str = "/usr/bin/ovs-vsctl";

pub fn service_name(ns: &str, id: &str) -> String {
    format!("{ns}-ovs-{id}.service")
}

pub fn cleanup_service_name(ns: &str) -> String {
    format!("{ns}-ovs-cleanup.service")
}

/// Commands configuring one OVS device, in execution order.
pub fn commands(state: &State, dev: &ResolvedDevice, ns: &str) -> Vec<String> {
    let id = dev.id();
    let mut cmds = Vec::new();
    let tag = format!("external-ids:{ns}=true");
    match dev.kind() {
        DeviceKind::Bridge => {
            cmds.push(format!("{VSCTL} --may-exist add-br {id}"));
            for member in state.members_of(dev) {
                let name = state.interface_name(member).unwrap_or(member.id());
                if member.kind() == DeviceKind::Bond {
                    let ports: Vec<&str> = state
                        .members_of(member)
                        .map(|m| state.interface_name(m).unwrap_or(m.id()))
                        .collect();
                    cmds.push(format!(
                        "{VSCTL} --may-exist add-bond {id} {name} {}",
                        ports.join(" ")
                    ));
                } else {
                    cmds.push(format!("{VSCTL} --may-exist add-port {id} {name}"));
                }
            }
            let protocols = dev
                .def
                .openvswitch
                .as_ref()
                .and_then(|o| o.protocols.clone())
                .or_else(|| state.globals().openvswitch.as_ref().and_then(|g| g.protocols.clone()));
            if let Some(ovs) = &dev.def.openvswitch {
                bridge_settings(&mut cmds, id, ovs);
            }
            if let Some(protocols) = protocols.filter(|p| !p.is_empty()) {
                cmds.push(format!("{VSCTL} set Bridge {id} protocols={}", protocols.join(",")));
            }
            cmds.push(format!("{VSCTL} set Bridge {id} {tag}"));
        }
        DeviceKind::Bond => {
            if let Some(ovs) = &dev.def.openvswitch {
                if let Some(lacp) = ovs.lacp {
                    cmds.push(format!("{VSCTL} set Port {id} lacp={lacp}"));
                }
                ids(&mut cmds, "Port", id, ovs.external_ids.as_ref(), ovs.other_config.as_ref());
            }
            cmds.push(format!("{VSCTL} set Port {id} {tag}"));
        }
        DeviceKind::OvsPort => {
            if let Some(peer) = state.peer_of(dev) {
                cmds.push(format!(
                    "{VSCTL} set Interface {id} type=patch options:peer={}",
                    peer.id()
                ));
            }
            cmds.push(format!("{VSCTL} set Port {id} {tag}"));
        }
        _ => {}
    }
    cmds
}

fn bridge_settings(cmds: &mut Vec<String>, id: &str, ovs: &OvsSettings) {
    if let Some(mode) = ovs.fail_mode {
        cmds.push(format!("{VSCTL} set-fail-mode {id} {mode}"));
    }
    if let Some(on) = ovs.mcast_snooping {
        cmds.push(format!("{VSCTL} set Bridge {id} mcast_snooping_enable={on}"));
    }
    if let Some(on) = ovs.rstp {
        cmds.push(format!("{VSCTL} set Bridge {id} rstp_enable={on}"));
    }
    if let Some(controller) = &ovs.controller {
        if let Some(addresses) = controller.addresses.as_ref().filter(|a| !a.is_empty()) {
            cmds.push(format!("{VSCTL} set-controller {id} {}", addresses.join(" ")));
        }
        if let Some(mode) = controller.connection_mode {
            cmds.push(format!("{VSCTL} set Controller {id} connection-mode={mode}"));
        }
    }
    ids(cmds, "Bridge", id, ovs.external_ids.as_ref(), ovs.other_config.as_ref());
}

fn ids(
    cmds: &mut Vec<String>,
    table: &str,
    id: &str,
    external: Option<&IndexMap<String, String>>,
    other: Option<&IndexMap<String, String>>,
) {
    for (key, value) in external.into_iter().flatten() {
        cmds.push(format!("{VSCTL} set {table} {id} external-ids:{key}={value}"));
    }
    for (key, value) in other.into_iter().flatten() {
        cmds.push(format!("{VSCTL} set {table} {id} other-config:{key}={value}"));
    }
}

fn device_unit(state: &State, dev: &ResolvedDevice, ns: &str) -> UnitFile {
    let mut unit = UnitFile::new();
    let section = unit.section("Unit");
    section
        .set("Description", format!("OpenVSwitch configuration for {}", dev.id()))
        .set("DefaultDependencies", "no")
        .set("Wants", "ovsdb-server.service")
        .set("After", "ovsdb-server.service")
        .set("After", cleanup_service_name(ns));
    if let Some(bridge) = state.aggregator_of(dev) {
        let name = service_name(ns, bridge.id());
        section.set("Requires", &name).set("After", &name);
    }
    section
        .set("Before", "network.target")
        .set("Wants", "network.target");

    let section = unit.section("Service");
    section.set("Type", "oneshot").set("TimeoutStartSec", "10s");
    for cmd in commands(state, dev, ns) {
        section.set("ExecStart", cmd);
    }
    unit
}

fn cleanup_unit(ns: &str, global: Option<&GlobalOvs>) -> UnitFile {
    let mut unit = UnitFile::new();
    unit.section("Unit")
        .set("Description", "OpenVSwitch configuration cleanup")
        .set("ConditionFileIsExecutable", VSCTL)
        .set("DefaultDependencies", "no")
        .set("Wants", "ovsdb-server.service")
        .set("After", "ovsdb-server.service")
        .set("Before", "network.target");
    let section = unit.section("Service");
    section.set("Type", "oneshot").set("TimeoutStartSec", "10s");
    for (table, verb) in [("Port", "del-port"), ("Bridge", "del-br")] {
        section.set(
            "ExecStart",
            format!(
                "/bin/sh -c 'for o in $$({VSCTL} --bare --columns=name find {table} external-ids:{ns}=true); do {VSCTL} --if-exists {verb} $$o; done'"
            ),
        );
    }
    if let Some(global) = global {
        for (key, value) in global.external_ids.iter().flatten() {
            section.set(
                "ExecStart",
                format!("{VSCTL} set open_vswitch . external-ids:{key}={value}"),
            );
        }
        for (key, value) in global.other_config.iter().flatten() {
            section.set(
                "ExecStart",
                format!("{VSCTL} set open_vswitch . other-config:{key}={value}"),
            );
        }
    }
    unit
}

/// Services for every OVS device, plus the cleanup service whenever OVS
/// is in use at all.
pub fn render(state: &State, ctx: &EngineContext) -> OutputTree {
    let ns = &ctx.namespace;
    let mut tree = OutputTree::new();
    let global = state.globals().openvswitch.as_ref().filter(|g| !g.is_empty());
    let mut any = global.is_some();
    for dev in state.devices().filter(|dev| state.is_ovs(dev)) {
        any = true;
        let name = service_name(ns, dev.id());
        tree.add_file(
            format!("run/systemd/system/{name}"),
            device_unit(state, dev, ns).to_string(),
            MODE_PUBLIC,
        );
        tree.add_symlink(
            format!("run/systemd/system/systemd-networkd.service.wants/{name}"),
            format!("/run/systemd/system/{name}"),
        );
    }
    if any {
        let name = cleanup_service_name(ns);
        tree.add_file(
            format!("run/systemd/system/{name}"),
            cleanup_unit(ns, global).to_string(),
            MODE_PUBLIC,
        );
        tree.add_symlink(
            format!("run/systemd/system/systemd-networkd.service.wants/{name}"),
            format!("/run/systemd/system/{name}"),
        );
    }
    tree
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{commands, render};
    use crate::context::EngineContext;
    use crate::parse::Parser;

    #[test]
    fn bridge_with_patch_ports_and_bond() {
        let mut parser = Parser::new();
        parser
            .load_str(
                "network:\n  openvswitch:\n    ports: [[patch0-1, patch1-0]]\n  ethernets:\n    eth0: {}\n    eth1: {}\n  bonds:\n    bond0:\n      interfaces: [eth0, eth1]\n      openvswitch: {lacp: active}\n  bridges:\n    ovs0:\n      interfaces: [bond0, patch0-1]\n      openvswitch: {fail-mode: secure}\n    ovs1:\n      interfaces: [patch1-0]\n      openvswitch: {}\n",
                None,
            )
            .expect("load");
        let ctx = EngineContext::default();
        let state = parser.freeze(&ctx).expect("freeze");

        assert_eq!(
            commands(&state, state.get("ovs0").expect("ovs0"), "netdecl"),
            vec![
                "/usr/bin/ovs-vsctl --may-exist add-br ovs0",
                "/usr/bin/ovs-vsctl --may-exist add-bond ovs0 bond0 eth0 eth1",
                "/usr/bin/ovs-vsctl --may-exist add-port ovs0 patch0-1",
                "/usr/bin/ovs-vsctl set-fail-mode ovs0 secure",
                "/usr/bin/ovs-vsctl set Bridge ovs0 external-ids:netdecl=true",
            ]
        );
        assert_eq!(
            commands(&state, state.get("patch0-1").expect("port"), "netdecl")[0],
            "/usr/bin/ovs-vsctl set Interface patch0-1 type=patch options:peer=patch1-0"
        );

        let tree = render(&state, &ctx);
        let bond = tree
            .contents("run/systemd/system/netdecl-ovs-bond0.service")
            .expect("bond service");
        assert!(bond.contains("Requires=netdecl-ovs-ovs0.service\n"));
        assert!(bond.contains("ExecStart=/usr/bin/ovs-vsctl set Port bond0 lacp=active\n"));
        assert!(tree
            .contents("run/systemd/system/netdecl-ovs-cleanup.service")
            .is_some());
        assert!(tree.get("run/systemd/system/netdecl-ovs-eth0.service").is_none());
    }
}
