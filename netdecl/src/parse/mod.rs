//! Accumulating parser: folds documents into one set of definitions.
//!
//! A [`Parser`] owns the mutable accumulation. Documents are loaded in
//! precedence order; each one merges into what is already there. Patch
//! fragments load the same way on top. [`Parser::freeze`] resolves
//! references and hands back an immutable [`State`].

pub(crate) mod decode;
pub mod device;
mod payload;

use std::path::Path;

use indexmap::IndexMap;
use netdecl_doc::{parse, DocNode};
use tracing::debug;

use crate::context::EngineContext;
use crate::error::{Error, Result};
use crate::loader::{self, Document};
use crate::model::{
    is_glob, Backend, DeviceDefinition, DeviceKind, GlobalOvs, GlobalSettings, Merge,
};
use crate::resolve;
use crate::state::State;

use decode::Decoder;
pub use device::{allowed_keys, DeviceFragment};

/// Mutable accumulation of definitions, keyed by ID in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    devices: IndexMap<String, DeviceDefinition>,
    globals: GlobalSettings,
    documents: usize,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every document of the hierarchy described by `ctx`.
    pub fn load_hierarchy(&mut self, ctx: &EngineContext) -> Result<()> {
        let docs = loader::load_hierarchy(ctx)?;
        self.load_documents(&docs)
    }

    pub fn load_documents(&mut self, docs: &[Document]) -> Result<()> {
        for doc in docs {
            self.load_document(&doc.root, Some(&doc.path))?;
        }
        Ok(())
    }

    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let doc = loader::read_document(path)?;
        self.load_document(&doc.root, Some(&doc.path))
    }

    /// Load a document given as text; `file` only labels diagnostics.
    pub fn load_str(&mut self, text: &str, file: Option<&Path>) -> Result<()> {
        let root = parse(text).map_err(|err| Error::from_parse(err, file))?;
        self.load_document(&root, file)
    }

    /// Merge one parsed document into the accumulation.
    pub fn load_document(&mut self, root: &DocNode, file: Option<&Path>) -> Result<()> {
        let d = Decoder::new(file);
        self.documents += 1;
        for entry in d.mapping(root, "document")? {
            if entry.key != "network" {
                return Err(d.unknown_key(entry, "document"));
            }
        }
        let Some(network) = root.get("network") else {
            debug!(file = ?file, "document without network key");
            return Ok(());
        };

        let mut globals = GlobalSettings::default();
        for entry in d.mapping(network, "network")? {
            let v = &entry.value;
            match entry.key.as_str() {
                "version" => {
                    if let Some(version) = d.opt_uint(v, "version")? {
                        if version != 2 {
                            return Err(d.semantic(
                                v,
                                format!("unsupported version {version}, only 2 is accepted"),
                            ));
                        }
                        globals.version = Some(version);
                    }
                }
                "renderer" => globals.renderer = d.opt_enum(v, "renderer")?,
                "openvswitch" => globals.openvswitch = decode_global_ovs(&d, v)?,
                block => match DeviceKind::from_block(block) {
                    Some(kind) => self.load_block(kind, v, file)?,
                    None => return Err(d.unknown_key(entry, "network")),
                },
            }
        }
        self.globals.merge(globals);
        Ok(())
    }

    fn load_block(&mut self, kind: DeviceKind, block: &DocNode, file: Option<&Path>) -> Result<()> {
        let d = Decoder::new(file);
        let entries = d.mapping(block, kind.block_name())?;
        let block_renderer: Option<Backend> = match block.get("renderer") {
            Some(v) if v.as_scalar().is_some() => Some(d.enumerated(v, "renderer")?),
            _ => None,
        };

        for entry in entries {
            let id = entry.key.as_str();
            if id == "renderer" && entry.value.as_scalar().is_some() {
                continue;
            }
            if is_glob(id) {
                return Err(Error::semantic(
                    format!("{id}: device ids must not contain glob characters"),
                    Some(d.loc(entry.key_mark)),
                ));
            }
            if let Some(existing) = self.devices.get(id) {
                if existing.kind() != kind {
                    return Err(Error::semantic(
                        format!(
                            "{id}: redefined as {} but already defined in {}",
                            kind.block_name(),
                            existing.kind().block_name()
                        ),
                        Some(d.loc(entry.key_mark)),
                    ));
                }
            }
            if entry.value.is_null() {
                debug!(id, "definition removed");
                self.devices.shift_remove(id);
                continue;
            }

            let mut dev_decoder = Decoder::new(file);
            let DeviceFragment {
                mut definition,
                cleared,
            } = device::decode_device(&mut dev_decoder, id, kind, &entry.value)?;
            if definition.renderer.is_none() {
                definition.block_renderer = block_renderer;
            }
            definition.provenance.origin_file = file.map(Path::to_path_buf);
            definition.provenance.origin = Some(d.loc(entry.key_mark));
            definition.provenance.marks = dev_decoder.marks;

            match self.devices.get_mut(id) {
                Some(existing) => {
                    for path in &cleared {
                        existing.clear_path(path);
                    }
                    existing.merge(definition);
                }
                None => {
                    self.devices.insert(id.to_string(), definition);
                }
            }
            debug!(id, kind = kind.block_name(), "merged definition");
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DeviceDefinition> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceDefinition> {
        self.devices.values()
    }

    pub fn globals(&self) -> &GlobalSettings {
        &self.globals
    }

    pub fn documents_loaded(&self) -> usize {
        self.documents
    }

    /// Resolve references and freeze the accumulation.
    pub fn freeze(self, ctx: &EngineContext) -> Result<State> {
        resolve::resolve(self.devices, self.globals, ctx)
    }
}

fn decode_global_ovs(d: &Decoder<'_>, node: &DocNode) -> Result<Option<GlobalOvs>> {
    if node.is_null() {
        return Ok(None);
    }
    let mut ovs = GlobalOvs::default();
    for entry in d.mapping(node, "openvswitch")? {
        let v = &entry.value;
        let key = entry.key.as_str();
        match key {
            "ports" if v.is_null() => {}
            "ports" => {
                let mut pairs = Vec::new();
                for pair in d.sequence(v, "openvswitch.ports")? {
                    let ends = d.strings(pair, "openvswitch.ports")?;
                    let [a, b] = <[String; 2]>::try_from(ends).map_err(|_| {
                        d.schema(pair, "each openvswitch port entry must list exactly two ports")
                    })?;
                    pairs.push((a, b));
                }
                ovs.ports = Some(pairs);
            }
            "external-ids" => ovs.external_ids = d.opt_string_map(v, key)?,
            "other-config" => ovs.other_config = d.opt_string_map(v, key)?,
            "protocols" => ovs.protocols = d.opt_strings(v, key)?,
            _ => return Err(d.unknown_key(entry, "openvswitch")),
        }
    }
    Ok(Some(ovs))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::Parser;
    use crate::error::ErrorKind;
    use crate::model::DeviceKind;

    #[test]
    fn later_document_overrides_field_by_field() {
        let mut parser = Parser::new();
        parser
            .load_str(
                "network:\n  version: 2\n  ethernets:\n    eth0:\n      dhcp4: true\n      mtu: 1500\n",
                Some(Path::new("a.yaml")),
            )
            .expect("first");
        parser
            .load_str(
                "network:\n  ethernets:\n    eth0:\n      mtu: 9000\n",
                Some(Path::new("b.yaml")),
            )
            .expect("second");

        let eth0 = parser.get("eth0").expect("eth0");
        assert_eq!(eth0.dhcp4, Some(true));
        assert_eq!(eth0.mtu, Some(9000));
        assert_eq!(
            eth0.provenance.origin_file.as_deref(),
            Some(Path::new("b.yaml"))
        );
    }

    #[test]
    fn nested_null_unsets_value_from_earlier_document() {
        let mut parser = Parser::new();
        parser
            .load_str(
                concat!(
                    "network:\n  ethernets:\n    eth0:\n",
                    "      dhcp4-overrides: {use-dns: false, use-ntp: false}\n",
                    "      networkmanager:\n",
                    "        passthrough: {ethernet.wake-on-lan: '0', ipv4.dns-priority: '10'}\n",
                    "  bridges:\n    br0:\n",
                    "      parameters: {stp: false, port-priority: {eth0: 8, eth1: 4}}\n",
                ),
                Some(Path::new("a.yaml")),
            )
            .expect("first");
        parser
            .load_str(
                concat!(
                    "network:\n  ethernets:\n    eth0:\n",
                    "      dhcp4-overrides: {use-dns: null}\n",
                    "      networkmanager: {passthrough: {ethernet.wake-on-lan: null}}\n",
                    "  bridges:\n    br0:\n",
                    "      parameters: {port-priority: {eth0: null}}\n",
                ),
                Some(Path::new("b.yaml")),
            )
            .expect("second");

        let eth0 = parser.get("eth0").expect("eth0");
        let overrides = eth0.dhcp4_overrides.as_ref().expect("overrides");
        assert_eq!(overrides.use_dns, None);
        assert_eq!(overrides.use_ntp, Some(false));
        let passthrough = eth0.passthrough().expect("passthrough");
        assert_eq!(passthrough.keys().collect::<Vec<_>>(), ["ipv4.dns-priority"]);

        let br0 = parser.get("br0").expect("br0");
        let crate::model::KindPayload::Bridge(Some(params)) = &br0.payload else {
            panic!("bridge parameters");
        };
        assert_eq!(params.stp, Some(false));
        let priorities = params.port_priority.as_ref().expect("port-priority");
        assert_eq!(priorities.keys().collect::<Vec<_>>(), ["eth1"]);
    }

    #[test]
    fn kind_redefinition_is_rejected() {
        let mut parser = Parser::new();
        parser
            .load_str("network:\n  ethernets:\n    x0: {}\n", None)
            .expect("first");
        let err = parser
            .load_str("network:\n  bridges:\n    x0: {}\n", None)
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Semantic);
        assert!(err.message().starts_with("x0:"));
    }

    #[test]
    fn null_removes_fields_and_devices() {
        let mut parser = Parser::new();
        parser
            .load_str(
                "network:\n  ethernets:\n    eth0: {mtu: 1500, dhcp4: true}\n    eth1: {}\n",
                None,
            )
            .expect("base");
        parser
            .load_str("network:\n  ethernets:\n    eth0: {mtu: null}\n    eth1: null\n", None)
            .expect("patch");
        let eth0 = parser.get("eth0").expect("eth0");
        assert_eq!(eth0.mtu, None);
        assert_eq!(eth0.dhcp4, Some(true));
        assert!(parser.get("eth1").is_none());
    }

    #[test]
    fn block_renderer_applies_to_definitions_without_their_own() {
        let mut parser = Parser::new();
        parser
            .load_str(
                "network:\n  ethernets:\n    renderer: NetworkManager\n    eth0: {}\n    eth1: {renderer: networkd}\n",
                None,
            )
            .expect("load");
        let eth0 = parser.get("eth0").expect("eth0");
        assert_eq!(eth0.kind(), DeviceKind::Ethernet);
        assert_eq!(
            eth0.block_renderer.map(|b| b.to_string()).as_deref(),
            Some("NetworkManager")
        );
        assert_eq!(parser.get("eth1").expect("eth1").block_renderer, None);
    }

    #[test]
    fn glob_ids_and_wrong_version_fail() {
        let mut parser = Parser::new();
        let err = parser
            .load_str("network:\n  ethernets:\n    \"en*\": {}\n", None)
            .expect_err("glob");
        assert!(err.message().contains("glob"));
        let err = parser
            .load_str("network:\n  version: 3\n", None)
            .expect_err("version");
        assert_eq!(err.location().map(|l| l.line), Some(2));
    }
}
