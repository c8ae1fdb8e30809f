//! Reference resolution: turns the merged definitions into a [`State`].
//!
//! Checks that every `link`, `peer` and `interfaces` entry names a known
//! definition, that no interface has two aggregators, and that references
//! are acyclic. Devices are then ordered so that every device comes after
//! the members and parents it needs.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::context::EngineContext;
use crate::error::{Error, Result};
use crate::model::{Backend, DeviceDefinition, DeviceKind, GlobalSettings};
use crate::state::{ResolvedDevice, State};

pub fn resolve(
    mut devices: IndexMap<String, DeviceDefinition>,
    globals: GlobalSettings,
    ctx: &EngineContext,
) -> Result<State> {
    add_ovs_ports(&mut devices, &globals)?;
    let defs: Vec<DeviceDefinition> = devices.into_values().collect();
    let by_id: HashMap<&str, usize> = defs
        .iter()
        .enumerate()
        .map(|(idx, def)| (def.id.as_str(), idx))
        .collect();

    // Every reference must resolve, forward references included.
    for def in &defs {
        for (field, target) in def.references() {
            if !by_id.contains_key(target) {
                return Err(Error::semantic(
                    format!("{}: {field} refers to undefined interface '{target}'", def.id),
                    def.provenance.location(&field),
                ));
            }
            if target == def.id {
                return Err(Error::semantic(
                    format!("{}: {field} refers to itself", def.id),
                    def.provenance.location(&field),
                ));
            }
        }
    }

    let aggregator = aggregator_index(&defs, &by_id)?;
    let order = dependency_order(&defs, &by_id)?;

    let mut position = vec![0usize; defs.len()];
    for (pos, &load_idx) in order.iter().enumerate() {
        position[load_idx] = pos;
    }
    let lookup = |id: &str| by_id.get(id).map(|&idx| position[idx]);

    let mut resolved: Vec<Option<ResolvedDevice>> = vec![None; defs.len()];
    for (load_index, def) in defs.iter().enumerate() {
        let backend = select_backend(def, &globals, ctx);
        let device = ResolvedDevice {
            backend,
            load_index,
            parent: def.link.as_deref().and_then(lookup),
            peer: def.peer.as_deref().and_then(lookup),
            members: def.interfaces().iter().filter_map(|m| lookup(m)).collect(),
            aggregator: aggregator[load_index].map(|agg| position[agg]),
            def: def.clone(),
        };
        resolved[position[load_index]] = Some(device);
    }
    let devices: Vec<ResolvedDevice> = resolved.into_iter().flatten().collect();
    debug!(devices = devices.len(), "resolved definitions");
    Ok(State::new(devices, globals))
}

/// Backend cascade: definition, kind block, document, context, capability.
pub fn select_backend(def: &DeviceDefinition, globals: &GlobalSettings, ctx: &EngineContext) -> Backend {
    if def.kind() == DeviceKind::OvsPort {
        return Backend::Networkd;
    }
    def.renderer
        .or(def.block_renderer)
        .or(globals.renderer)
        .or(ctx.default_renderer)
        .unwrap_or(match def.kind() {
            DeviceKind::Modem | DeviceKind::NmDevice => Backend::NetworkManager,
            _ => Backend::Networkd,
        })
}

/// Create patch-port definitions for the global `openvswitch.ports` pairs.
fn add_ovs_ports(
    devices: &mut IndexMap<String, DeviceDefinition>,
    globals: &GlobalSettings,
) -> Result<()> {
    let Some(pairs) = globals.openvswitch.as_ref().and_then(|o| o.ports.as_ref()) else {
        return Ok(());
    };
    for (a, b) in pairs {
        for (port, peer) in [(a, b), (b, a)] {
            match devices.get(port) {
                Some(existing) if existing.kind() != DeviceKind::OvsPort => {
                    return Err(Error::semantic(
                        format!(
                            "{port}: openvswitch port clashes with a definition in {}",
                            existing.kind().block_name()
                        ),
                        existing.provenance.origin.clone(),
                    ));
                }
                Some(_) => {}
                None => {
                    let mut def = DeviceDefinition::new(port.clone(), DeviceKind::OvsPort);
                    def.peer = Some(peer.clone());
                    devices.insert(port.clone(), def);
                }
            }
        }
    }
    Ok(())
}

/// Map every member to the aggregator that claims it.
fn aggregator_index(
    defs: &[DeviceDefinition],
    by_id: &HashMap<&str, usize>,
) -> Result<Vec<Option<usize>>> {
    let mut owner: Vec<Option<usize>> = vec![None; defs.len()];
    for (agg_idx, def) in defs.iter().enumerate() {
        if !def.kind().is_aggregator() {
            continue;
        }
        for (pos, member) in def.interfaces().iter().enumerate() {
            let member_idx = by_id[member.as_str()];
            if let Some(previous) = owner[member_idx] {
                if previous == agg_idx {
                    continue;
                }
                return Err(Error::semantic(
                    format!(
                        "{member}: interface is claimed by both {} and {}",
                        defs[previous].id, def.id
                    ),
                    def.provenance.location(&format!("interfaces.{pos}")),
                ));
            }
            owner[member_idx] = Some(agg_idx);
        }
    }
    Ok(owner)
}

/// Depth-first post-order over dependencies, rejecting cycles.
fn dependency_order(defs: &[DeviceDefinition], by_id: &HashMap<&str, usize>) -> Result<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn deps(def: &DeviceDefinition, by_id: &HashMap<&str, usize>) -> Vec<usize> {
        def.interfaces()
            .iter()
            .map(String::as_str)
            .chain(def.link.as_deref())
            .filter_map(|id| by_id.get(id).copied())
            .collect()
    }

    fn visit(
        idx: usize,
        defs: &[DeviceDefinition],
        by_id: &HashMap<&str, usize>,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<()> {
        match marks[idx] {
            Mark::Done => return Ok(()),
            Mark::Active => {
                let start = stack.iter().position(|&i| i == idx).unwrap_or(0);
                let mut path: Vec<&str> = stack[start..].iter().map(|&i| defs[i].id.as_str()).collect();
                path.push(&defs[idx].id);
                return Err(Error::semantic(
                    format!(
                        "{}: reference cycle {}",
                        defs[idx].id,
                        path.join(" -> ")
                    ),
                    defs[idx].provenance.origin.clone(),
                ));
            }
            Mark::New => {}
        }
        marks[idx] = Mark::Active;
        stack.push(idx);
        for dep in deps(&defs[idx], by_id) {
            visit(dep, defs, by_id, marks, stack, order)?;
        }
        stack.pop();
        marks[idx] = Mark::Done;
        order.push(idx);
        Ok(())
    }

    let mut marks = vec![Mark::New; defs.len()];
    let mut order = Vec::with_capacity(defs.len());
    let mut stack = Vec::new();
    for idx in 0..defs.len() {
        visit(idx, defs, by_id, &mut marks, &mut stack, &mut order)?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use crate::context::EngineContext;
    use crate::error::ErrorKind;
    use crate::model::Backend;
    use crate::parse::Parser;
    use crate::state::State;

    fn freeze(docs: &[&str]) -> crate::error::Result<State> {
        let mut parser = Parser::new();
        for doc in docs {
            parser.load_str(doc, None)?;
        }
        parser.freeze(&EngineContext::default())
    }

    #[test]
    fn members_come_before_aggregators() {
        let state = freeze(&[
            "network:\n  bridges:\n    br0: {interfaces: [bond0]}\n  bonds:\n    bond0: {interfaces: [eth0]}\n  ethernets:\n    eth0: {}\n",
        ])
        .expect("freeze");
        let ids: Vec<_> = state.devices().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, ["eth0", "bond0", "br0"]);
        let eth0 = state.get("eth0").expect("eth0");
        assert_eq!(state.aggregator_of(eth0).map(|a| a.id()), Some("bond0"));
    }

    #[test]
    fn double_membership_names_both_aggregators() {
        for docs in [
            [
                "network:\n  ethernets: {eth0: {}}\n  bonds: {bond0: {interfaces: [eth0]}}\n",
                "network:\n  bridges: {bridge0: {interfaces: [eth0]}}\n",
            ],
            [
                "network:\n  ethernets: {eth0: {}}\n  bridges: {bridge0: {interfaces: [eth0]}}\n",
                "network:\n  bonds: {bond0: {interfaces: [eth0]}}\n",
            ],
        ] {
            let err = freeze(&docs).expect_err("must fail");
            let msg = err.message();
            assert!(msg.contains("eth0") && msg.contains("bond0") && msg.contains("bridge0"), "{msg}");
        }
    }

    #[test]
    fn undefined_reference_is_reported() {
        let err = freeze(&["network:\n  vlans:\n    vlan10: {id: 10, link: eth9}\n"])
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Semantic);
        assert!(err.message().contains("eth9"));
        assert_eq!(err.location().map(|l| l.line), Some(3));
    }

    #[test]
    fn reference_cycles_are_rejected() {
        let err = freeze(&[
            "network:\n  bonds:\n    bond0: {interfaces: [br0]}\n  bridges:\n    br0: {interfaces: [bond0]}\n",
        ])
        .expect_err("must fail");
        assert!(err.message().contains("cycle"));
    }

    #[test]
    fn backend_cascade_prefers_device_then_block_then_global() {
        let state = freeze(&[
            "network:\n  renderer: NetworkManager\n  ethernets:\n    renderer: networkd\n    eth0: {}\n    eth1: {renderer: NetworkManager}\n  bridges:\n    br0: {}\n  modems:\n    wwan0: {}\n",
        ])
        .expect("freeze");
        assert_eq!(state.get("eth0").expect("eth0").backend, Backend::Networkd);
        assert_eq!(state.get("eth1").expect("eth1").backend, Backend::NetworkManager);
        assert_eq!(state.get("br0").expect("br0").backend, Backend::NetworkManager);
        assert_eq!(state.get("wwan0").expect("wwan0").backend, Backend::NetworkManager);
    }

    #[test]
    fn ovs_ports_become_peered_definitions() {
        let state = freeze(&[
            "network:\n  openvswitch:\n    ports: [[patch0-1, patch1-0]]\n  bridges:\n    ovs0: {interfaces: [patch0-1], openvswitch: {}}\n    ovs1: {interfaces: [patch1-0], openvswitch: {}}\n",
        ])
        .expect("freeze");
        let port = state.get("patch0-1").expect("port");
        assert_eq!(state.peer_of(port).map(|p| p.id()), Some("patch1-0"));
        assert!(state.is_ovs(state.get("ovs0").expect("ovs0")));
    }
}
