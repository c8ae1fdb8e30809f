//! The frozen, resolved configuration consumed by renderers and the
//! serializer.

use std::collections::HashMap;

use crate::model::{Backend, DeviceDefinition, DeviceKind, GlobalSettings};

/// A definition with its references resolved to indices into [`State`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub def: DeviceDefinition,
    pub backend: Backend,
    /// Position in load order, for callers that need document order back.
    pub load_index: usize,
    pub parent: Option<usize>,
    pub peer: Option<usize>,
    pub members: Vec<usize>,
    /// The bond, bridge or vrf this device is a member of.
    pub aggregator: Option<usize>,
}

impl ResolvedDevice {
    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.def.kind()
    }
}

/// Immutable result of loading, merging and resolving the hierarchy.
///
/// Devices are stored in dependency order: members and parents come before
/// the devices that need them; otherwise load order is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    devices: Vec<ResolvedDevice>,
    index: HashMap<String, usize>,
    globals: GlobalSettings,
}

impl State {
    pub(crate) fn new(devices: Vec<ResolvedDevice>, globals: GlobalSettings) -> Self {
        let index = devices
            .iter()
            .enumerate()
            .map(|(idx, dev)| (dev.def.id.clone(), idx))
            .collect();
        Self {
            devices,
            index,
            globals,
        }
    }

    /// Devices in dependency order.
    pub fn devices(&self) -> impl Iterator<Item = &ResolvedDevice> {
        self.devices.iter()
    }

    /// Devices in the order they were first loaded.
    pub fn in_load_order(&self) -> Vec<&ResolvedDevice> {
        let mut devices: Vec<_> = self.devices.iter().collect();
        devices.sort_by_key(|dev| dev.load_index);
        devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ResolvedDevice> {
        self.index.get(id).map(|&idx| &self.devices[idx])
    }

    pub fn at(&self, idx: usize) -> &ResolvedDevice {
        &self.devices[idx]
    }

    pub fn globals(&self) -> &GlobalSettings {
        &self.globals
    }

    pub fn aggregator_of(&self, dev: &ResolvedDevice) -> Option<&ResolvedDevice> {
        dev.aggregator.map(|idx| &self.devices[idx])
    }

    pub fn parent_of(&self, dev: &ResolvedDevice) -> Option<&ResolvedDevice> {
        dev.parent.map(|idx| &self.devices[idx])
    }

    pub fn peer_of(&self, dev: &ResolvedDevice) -> Option<&ResolvedDevice> {
        dev.peer.map(|idx| &self.devices[idx])
    }

    pub fn members_of<'a>(&'a self, dev: &'a ResolvedDevice) -> impl Iterator<Item = &'a ResolvedDevice> {
        dev.members.iter().map(|&idx| &self.devices[idx])
    }

    /// Devices that name `dev` as their `link` parent, in dependency order.
    pub fn children_of<'a>(
        &'a self,
        dev: &'a ResolvedDevice,
    ) -> impl Iterator<Item = &'a ResolvedDevice> {
        let idx = self.index.get(dev.id()).copied();
        self.devices
            .iter()
            .filter(move |child| child.parent.is_some() && child.parent == idx)
    }

    /// Name of the kernel interface a definition configures.
    ///
    /// The rename target wins, then a literal `match.name`, then the ID.
    /// Physical devices matched only by MAC or driver have no stable name.
    pub fn interface_name<'a>(&self, dev: &'a ResolvedDevice) -> Option<&'a str> {
        if let Some(name) = dev.def.set_name.as_deref() {
            return Some(name);
        }
        if dev.kind().is_physical() && dev.def.has_match() {
            return dev.def.matching.as_ref().and_then(|m| m.literal_name());
        }
        Some(dev.id())
    }

    /// True for devices handled by Open vSwitch.
    pub fn is_ovs(&self, dev: &ResolvedDevice) -> bool {
        match dev.kind() {
            DeviceKind::OvsPort => true,
            DeviceKind::Bridge => {
                dev.def.openvswitch.is_some()
                    || self
                        .members_of(dev)
                        .any(|m| m.kind() == DeviceKind::OvsPort)
            }
            DeviceKind::Bond => {
                dev.def.openvswitch.is_some()
                    || self
                        .aggregator_of(dev)
                        .is_some_and(|agg| agg.kind() == DeviceKind::Bridge && self.is_ovs(agg))
            }
            _ => false,
        }
    }

    /// True for bond and bridge members, whose addressing is owned by the
    /// aggregator.
    pub fn is_aggregation_member(&self, dev: &ResolvedDevice) -> bool {
        self.aggregator_of(dev)
            .is_some_and(|agg| matches!(agg.kind(), DeviceKind::Bond | DeviceKind::Bridge))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &DeviceDefinition> {
        self.devices.iter().map(|dev| &dev.def)
    }
}
