//! Device-manager rules shared by both backends: renames, and which
//! devices NetworkManager must leave alone.

use crate::context::{EngineContext, NmManagement};
use crate::model::{Backend, DeviceKind};
use crate::render::output::{OutputTree, MODE_PUBLIC};
use crate::state::{ResolvedDevice, State};

pub const RULES_DIR: &str = "run/udev/rules.d";

/// Rename rule for a matched physical device with `set-name`.
pub fn rename_rule(dev: &ResolvedDevice) -> Option<String> {
    let def = &dev.def;
    let name = def.set_name.as_deref()?;
    let matching = def.matching.as_ref().filter(|m| !m.is_empty())?;
    let mut rule = String::from("SUBSYSTEM==\"net\", ACTION==\"add\"");
    if let Some(drivers) = matching.driver.as_ref().filter(|d| !d.is_empty()) {
        rule.push_str(&format!(", DRIVERS==\"{}\"", drivers.join("|")));
    }
    if let Some(mac) = &matching.macaddress {
        rule.push_str(&format!(", ATTR{{address}}==\"{}\"", mac.to_lowercase()));
    }
    if let Some(original) = &matching.name {
        rule.push_str(&format!(", KERNEL==\"{original}\""));
    }
    rule.push_str(&format!(", NAME=\"{name}\"\n"));
    Some(rule)
}

/// Devices that exist as kernel links.
fn is_link(state: &State, dev: &ResolvedDevice) -> bool {
    match dev.kind() {
        DeviceKind::OvsPort | DeviceKind::NmDevice => false,
        DeviceKind::Bond => !state.is_ovs(dev),
        _ => true,
    }
}

/// NetworkManager `unmanaged-devices` specs for one device.
fn device_specs(state: &State, dev: &ResolvedDevice) -> Vec<String> {
    let def = &dev.def;
    let mut specs = Vec::new();
    if let Some(name) = def.set_name.as_deref() {
        specs.push(format!("interface-name:{name}"));
    } else if let Some(matching) = def.matching.as_ref().filter(|m| !m.is_empty()) {
        if let Some(name) = &matching.name {
            specs.push(format!("interface-name:{name}"));
        }
        if let Some(mac) = &matching.macaddress {
            specs.push(format!("mac:{}", mac.to_lowercase()));
        }
    } else if let Some(name) = state.interface_name(dev) {
        specs.push(format!("interface-name:{name}"));
    }
    specs
}

pub fn render(state: &State, ctx: &EngineContext) -> OutputTree {
    let ns = &ctx.namespace;
    let mut tree = OutputTree::new();

    for dev in state.devices() {
        if let Some(rule) = rename_rule(dev) {
            tree.add_file(format!("{RULES_DIR}/99-{ns}-{}.rules", dev.id()), rule, MODE_PUBLIC);
        }
    }

    let networkd: Vec<&ResolvedDevice> = state
        .devices()
        .filter(|dev| dev.backend == Backend::Networkd && is_link(state, dev))
        .collect();
    if !networkd.is_empty() {
        let mut specs = String::new();
        let mut rules = String::new();
        for dev in &networkd {
            for spec in device_specs(state, dev) {
                specs.push_str(&format!("{spec};"));
            }
            let drivers = dev.def.matching.as_ref().and_then(|m| m.driver.as_ref());
            for driver in drivers.into_iter().flatten() {
                rules.push_str(&format!(
                    "ACTION==\"add|change\", SUBSYSTEM==\"net\", ENV{{ID_NET_DRIVER}}==\"{driver}\", ENV{{NM_UNMANAGED}}=\"1\"\n"
                ));
            }
        }
        if !specs.is_empty() {
            tree.add_file(
                format!("run/NetworkManager/conf.d/{ns}.conf"),
                format!("[keyfile]\nunmanaged-devices+={specs}\n"),
                MODE_PUBLIC,
            );
        }
        if !rules.is_empty() {
            tree.add_file(format!("{RULES_DIR}/90-{ns}.rules"), rules, MODE_PUBLIC);
        }
    }

    if ctx.nm_management == NmManagement::OnlyListed {
        let mut rules = String::new();
        for dev in state
            .devices()
            .filter(|dev| dev.backend == Backend::NetworkManager && is_link(state, dev))
        {
            let def = &dev.def;
            let selector = match (
                state.interface_name(dev),
                def.matching.as_ref().and_then(|m| m.macaddress.as_deref()),
            ) {
                (Some(name), _) => format!("ENV{{INTERFACE}}==\"{name}\""),
                (None, Some(mac)) => format!("ATTR{{address}}==\"{}\"", mac.to_lowercase()),
                (None, None) => continue,
            };
            rules.push_str(&format!(
                "ACTION==\"add|change\", SUBSYSTEM==\"net\", {selector}, ENV{{NM_UNMANAGED}}=\"0\"\n"
            ));
        }
        if !rules.is_empty() {
            tree.add_file(format!("{RULES_DIR}/90-{ns}-nm.rules"), rules, MODE_PUBLIC);
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::render;
    use crate::context::{EngineContext, NmManagement};
    use crate::parse::Parser;
    use crate::state::State;

    fn state(yaml: &str, ctx: &EngineContext) -> State {
        let mut parser = Parser::new();
        parser.load_str(yaml, None).expect("load");
        parser.freeze(ctx).expect("freeze")
    }

    #[test]
    fn rename_rule_for_driver_match() {
        let ctx = EngineContext::default();
        let state = state(
            "network:\n  renderer: NetworkManager\n  ethernets:\n    lan:\n      match: {driver: ixgbe, macaddress: \"00:AA:BB:CC:DD:EE\"}\n      set-name: lan0\n",
            &ctx,
        );
        let tree = render(&state, &ctx);
        assert_eq!(
            tree.contents("run/udev/rules.d/99-netdecl-lan.rules"),
            Some("SUBSYSTEM==\"net\", ACTION==\"add\", DRIVERS==\"ixgbe\", ATTR{address}==\"00:aa:bb:cc:dd:ee\", NAME=\"lan0\"\n")
        );
        assert!(tree.get("run/NetworkManager/conf.d/netdecl.conf").is_none());
    }

    #[test]
    fn networkd_devices_are_unmanaged_by_nm() {
        let ctx = EngineContext::default();
        let state = state(
            "network:\n  ethernets:\n    eth0: {}\n    nic:\n      match: {driver: e1000}\n",
            &ctx,
        );
        let tree = render(&state, &ctx);
        assert_eq!(
            tree.contents("run/NetworkManager/conf.d/netdecl.conf"),
            Some("[keyfile]\nunmanaged-devices+=interface-name:eth0;\n")
        );
        assert_eq!(
            tree.contents("run/udev/rules.d/90-netdecl.rules"),
            Some("ACTION==\"add|change\", SUBSYSTEM==\"net\", ENV{ID_NET_DRIVER}==\"e1000\", ENV{NM_UNMANAGED}=\"1\"\n")
        );
    }

    #[test]
    fn only_listed_marks_nm_devices_managed() {
        let ctx = EngineContext {
            nm_management: NmManagement::OnlyListed,
            ..EngineContext::default()
        };
        let state = state(
            "network:\n  renderer: NetworkManager\n  ethernets:\n    eth0: {dhcp4: true}\n",
            &ctx,
        );
        let tree = render(&state, &ctx);
        assert_eq!(
            tree.contents("run/udev/rules.d/90-netdecl-nm.rules"),
            Some("ACTION==\"add|change\", SUBSYSTEM==\"net\", ENV{INTERFACE}==\"eth0\", ENV{NM_UNMANAGED}=\"0\"\n")
        );
    }
}
