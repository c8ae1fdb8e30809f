//! `.link` units: renaming and link settings applied by udev.

use crate::render::units::UnitFile;
use crate::state::ResolvedDevice;

/// The `.link` unit for a matched physical device, if it needs one.
pub fn link_unit(dev: &ResolvedDevice) -> Option<UnitFile> {
    let def = &dev.def;
    if !dev.kind().is_physical() || !def.has_match() {
        return None;
    }
    if def.set_name.is_none() && def.wakeonlan.is_none() && def.mtu.is_none() && def.macaddress.is_none() {
        return None;
    }
    let matching = def.matching.as_ref()?;

    let mut unit = UnitFile::new();
    let section = unit.section("Match");
    section.set_opt("PermanentMACAddress", matching.macaddress.as_deref());
    section.set_opt("OriginalName", matching.name.as_deref());
    if let Some(drivers) = &matching.driver {
        section.set("Driver", drivers.join(" "));
    }

    let section = unit.section("Link");
    section.set_opt("Name", def.set_name.as_deref());
    section.set_opt(
        "WakeOnLan",
        def.wakeonlan.map(|on| if on { "magic" } else { "off" }),
    );
    section.set_opt("MACAddress", def.macaddress.as_deref());
    section.set_opt("MTUBytes", def.mtu);
    Some(unit)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::link_unit;
    use crate::context::EngineContext;
    use crate::parse::Parser;

    #[test]
    fn rename_by_mac_and_driver() {
        let mut parser = Parser::new();
        parser
            .load_str(
                "network:\n  ethernets:\n    lan:\n      match: {macaddress: \"00:11:22:33:44:55\", driver: [ixgbe, e1000]}\n      set-name: lan0\n      wakeonlan: true\n",
                None,
            )
            .expect("load");
        let state = parser.freeze(&EngineContext::default()).expect("freeze");
        let unit = link_unit(state.get("lan").expect("lan")).expect("link unit");
        assert_eq!(
            unit.to_string(),
            "[Match]\nPermanentMACAddress=00:11:22:33:44:55\nDriver=ixgbe e1000\n\n[Link]\nName=lan0\nWakeOnLan=magic\n"
        );
    }

    #[test]
    fn unmatched_devices_need_no_link_unit() {
        let mut parser = Parser::new();
        parser
            .load_str("network:\n  ethernets:\n    eth0: {mtu: 9000}\n", None)
            .expect("load");
        let state = parser.freeze(&EngineContext::default()).expect("freeze");
        assert!(link_unit(state.get("eth0").expect("eth0")).is_none());
    }
}
