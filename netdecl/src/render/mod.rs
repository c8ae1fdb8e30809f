//! Renderers: pure functions from a frozen [`State`] to an [`OutputTree`].
//!
//! - [`networkd`] — `.link`, `.netdev`, `.network` units, supplicant and
//!   Open vSwitch services
//! - [`nm`] — NetworkManager keyfile profiles
//! - [`udev`] — rename and management rules shared by both backends
//! - [`output`] — the in-memory tree and writing it to disk

pub mod networkd;
pub mod nm;
pub mod output;
pub mod udev;
pub mod units;

use std::path::Path;

use tracing::info;

use crate::context::EngineContext;
use crate::error::Result;
use crate::model::{Backend, KindPayload};
use crate::state::{ResolvedDevice, State};

pub use output::{Entry, OutputTree};

/// Render every backend into one tree.
pub fn render(state: &State, ctx: &EngineContext) -> Result<OutputTree> {
    let ns = &ctx.namespace;
    let mut tree = OutputTree::new();

    // udev applies .link files whichever backend owns the device.
    for dev in state.devices() {
        if let Some(unit) = networkd::link::link_unit(dev) {
            tree.add_file(
                networkd::unit_path(ns, dev.id(), "link"),
                unit.to_string(),
                output::MODE_PUBLIC,
            );
        }
    }
    tree.extend(networkd::render(state, ctx)?);
    tree.extend(nm::render(state, ctx)?);
    tree.extend(udev::render(state, ctx));

    let networkd = state
        .devices()
        .filter(|dev| dev.backend == Backend::Networkd)
        .count();
    info!(
        devices = state.len(),
        networkd,
        network_manager = state.len() - networkd,
        files = tree.len(),
        "rendered"
    );
    Ok(tree)
}

/// Render, remove the previous generation below `out`, then write.
pub fn generate(state: &State, ctx: &EngineContext, out: &Path) -> Result<usize> {
    let tree = render(state, ctx)?;
    output::clean_generated(out, &ctx.namespace)?;
    tree.write(out)
}

/// Routing table of a route or rule, falling back to the table of the vrf
/// the device is, or belongs to.
pub fn effective_table(state: &State, dev: &ResolvedDevice, table: Option<u32>) -> Option<u32> {
    table.or_else(|| {
        let vrf = match &dev.def.payload {
            KindPayload::Vrf(vrf) => Some(vrf),
            _ => match state.aggregator_of(dev).map(|agg| &agg.def.payload) {
                Some(KindPayload::Vrf(vrf)) => Some(vrf),
                _ => None,
            },
        };
        vrf.and_then(|vrf| vrf.table)
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{generate, render};
    use crate::context::EngineContext;
    use crate::parse::Parser;
    use crate::state::State;

    fn state(yaml: &str) -> State {
        let mut parser = Parser::new();
        parser.load_str(yaml, None).expect("load");
        parser.freeze(&EngineContext::default()).expect("freeze")
    }

    #[test]
    fn link_units_are_written_for_nm_devices_too() {
        let state = state(
            "network:\n  renderer: NetworkManager\n  ethernets:\n    lan:\n      match: {driver: ixgbe}\n      set-name: lan0\n",
        );
        let tree = render(&state, &EngineContext::default()).expect("render");
        assert!(tree.contents("run/systemd/network/10-netdecl-lan.link").is_some());
        assert!(tree.contents("run/udev/rules.d/99-netdecl-lan.rules").is_some());
        assert!(tree
            .contents("run/NetworkManager/system-connections/netdecl-lan.nmconnection")
            .expect("profile")
            .contains("interface-name=lan0\n"));
    }

    #[test]
    fn generate_replaces_stale_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = EngineContext::new(dir.path());
        let stale = dir.path().join("run/systemd/network/10-netdecl-old.network");
        std::fs::create_dir_all(stale.parent().expect("parent")).expect("mkdir");
        std::fs::write(&stale, "[Match]\nName=old\n").expect("write");

        let state = state("network:\n  ethernets:\n    eth0: {dhcp4: true}\n");
        let written = generate(&state, &ctx, dir.path()).expect("generate");
        assert!(written >= 1);
        assert!(!stale.exists());

        let first = std::fs::read_to_string(dir.path().join("run/systemd/network/10-netdecl-eth0.network"))
            .expect("read");
        generate(&state, &ctx, dir.path()).expect("second generate");
        let second = std::fs::read_to_string(dir.path().join("run/systemd/network/10-netdecl-eth0.network"))
            .expect("read");
        assert_eq!(first, second);
    }
}
