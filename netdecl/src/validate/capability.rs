//! What each backend can express.
//!
//! Renderers call [`check`] again for the devices they emit, so a state that
//! skipped validation still cannot produce partial output.

use super::fail;
use crate::context::EngineContext;
use crate::error::Result;
use crate::model::params::is_glob;
use crate::model::{Backend, DeviceKind, KindPayload};
use crate::state::{ResolvedDevice, State};

pub fn check(state: &State, dev: &ResolvedDevice, _ctx: &EngineContext) -> Result<()> {
    match dev.backend {
        Backend::Networkd => check_networkd(state, dev),
        Backend::NetworkManager => check_nm(state, dev),
    }
}

fn check_networkd(state: &State, dev: &ResolvedDevice) -> Result<()> {
    let def = &dev.def;
    match &def.payload {
        KindPayload::Modem(_) => {
            return Err(fail(dev, "renderer", "networkd cannot configure modems"));
        }
        KindPayload::NmDevice => {
            return Err(fail(
                dev,
                "renderer",
                "nm-devices can only be rendered by NetworkManager",
            ));
        }
        KindPayload::Bridge(Some(params)) if params.uses_vlans() => {
            return Err(fail(
                dev,
                "parameters.vlan-filtering",
                "networkd does not support bridge vlan filtering",
            ));
        }
        KindPayload::Wifi(_) => {
            let concrete = state.interface_name(dev).is_some_and(|name| !is_glob(name));
            if !concrete {
                return Err(fail(
                    dev,
                    "match",
                    "networkd requires a concrete interface name for wifi",
                ));
            }
        }
        KindPayload::Ethernet(eth) if eth.auth.is_some() => {
            if state.interface_name(dev).is_none() {
                return Err(fail(
                    dev,
                    "auth",
                    "networkd requires a concrete interface name for 802.1x authentication",
                ));
            }
        }
        _ => {}
    }

    if def.dhcp4() && def.dhcp6() {
        let (v4, v6) = (
            def.dhcp4_overrides.clone().unwrap_or_default(),
            def.dhcp6_overrides.clone().unwrap_or_default(),
        );
        if v4 != v6 {
            return Err(fail(
                dev,
                "dhcp6-overrides",
                "networkd requires dhcp4-overrides and dhcp6-overrides to agree",
            ));
        }
    }
    Ok(())
}

fn check_nm(state: &State, dev: &ResolvedDevice) -> Result<()> {
    let def = &dev.def;
    if let Some(matching) = &def.matching {
        if matching.has_driver() && def.set_name.is_none() {
            return Err(fail(
                dev,
                "match",
                "NetworkManager cannot match by driver without set-name",
            ));
        }
        if matching.name.as_deref().is_some_and(is_glob) {
            return Err(fail(
                dev,
                "match",
                "NetworkManager cannot match by interface name glob",
            ));
        }
    }
    if def.openvswitch.is_some() || state.is_ovs(dev) {
        return Err(fail(
            dev,
            "openvswitch",
            "NetworkManager cannot configure Open vSwitch",
        ));
    }
    if dev.kind() == DeviceKind::Vrf && def.link.is_some() {
        return Err(fail(dev, "link", "NetworkManager vrfs do not take link"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::context::EngineContext;
    use crate::parse::Parser;
    use crate::validate::validate;

    fn check(yaml: &str) -> crate::error::Result<()> {
        let mut parser = Parser::new();
        parser.load_str(yaml, None)?;
        let ctx = EngineContext::default();
        validate(&parser.freeze(&ctx)?, &ctx)
    }

    #[test]
    fn nm_rejects_driver_match_without_set_name() {
        let err = check(
            "network:\n  renderer: NetworkManager\n  ethernets:\n    lan:\n      match: {driver: ixgbe}\n",
        )
        .expect_err("must fail");
        assert!(err.message().contains("driver"));

        assert!(check(
            "network:\n  renderer: NetworkManager\n  ethernets:\n    lan:\n      match: {driver: ixgbe}\n      set-name: lan0\n",
        )
        .is_ok());
    }

    #[test]
    fn networkd_rejects_modems_and_vlan_filtering() {
        let err = check("network:\n  modems:\n    wwan0: {renderer: networkd, apn: internet}\n")
            .expect_err("must fail");
        assert!(err.message().contains("modems"));

        let err = check("network:\n  bridges:\n    br0:\n      parameters: {vlan-filtering: true}\n")
            .expect_err("must fail");
        assert!(err.message().contains("vlan filtering"));
    }

    #[test]
    fn networkd_wifi_needs_concrete_name() {
        let err = check(
            "network:\n  wifis:\n    wl:\n      match: {name: \"wl*\"}\n      access-points: {home: {password: \"longenough\"}}\n",
        )
        .expect_err("must fail");
        assert!(err.message().contains("concrete interface name"));
    }

    #[test]
    fn networkd_dhcp_overrides_must_agree() {
        let err = check(
            "network:\n  ethernets:\n    eth0:\n      dhcp4: true\n      dhcp6: true\n      dhcp4-overrides: {use-dns: false}\n",
        )
        .expect_err("must fail");
        assert!(err.message().contains("agree"));
    }
}
