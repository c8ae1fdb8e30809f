//! `path=value` patch expressions.
//!
//! A path is `network` followed by `.`-separated segments; `\.` stands for
//! a literal dot inside a segment, so passthrough keys such as
//! `ethernet\.wake-on-lan` can be addressed. The value is a YAML flow value
//! and `null` deletes.
//!
//! A patch is applied in two ways: [`Parser::apply_patch`] layers it over
//! loaded documents, and [`apply_to_documents`] edits the documents on disk
//! after checking that the whole hierarchy still validates.

use std::fs;
use std::path::{Path, PathBuf};

use netdecl_doc::{parse, write, DocNode, NodeValue};
use tracing::{debug, info};

use crate::context::EngineContext;
use crate::error::{Error, Result};
use crate::loader::{self, Document, Tier};
use crate::model::DeviceKind;
use crate::parse::Parser;
use crate::validate::validate;

/// Document that receives patches for keys no etc document defines yet.
pub const SET_FILE: &str = "70-netdecl-set.yaml";

/// One parsed `path=value` expression.
#[derive(Debug, Clone)]
pub struct Patch {
    pub path: Vec<String>,
    pub value: DocNode,
}

impl Patch {
    /// Parse `path=value`. The first unescaped `=` separates the two.
    pub fn parse(expr: &str) -> Result<Self> {
        let Some(split) = find_unescaped(expr, '=') else {
            return Err(Error::semantic(
                format!("invalid patch {expr:?}: expected PATH=VALUE"),
                None,
            ));
        };
        let (raw_path, raw_value) = (&expr[..split], &expr[split + 1..]);
        let path = split_path(raw_path);
        if path.len() < 2 || path.iter().any(String::is_empty) {
            return Err(Error::semantic(
                format!("invalid patch path {raw_path:?}"),
                None,
            ));
        }
        let value = parse(raw_value).map_err(|err| Error::from_parse(err, None))?;
        Ok(Self { path, value })
    }

    pub fn is_delete(&self) -> bool {
        self.value.is_null()
    }

    /// The patch as a document: nested mappings down to the value.
    pub fn fragment(&self) -> DocNode {
        self.path
            .iter()
            .rev()
            .fold(self.value.clone(), |inner, segment| {
                DocNode::mapping().with(segment.clone(), inner)
            })
    }

    /// Device ID the patch addresses, if it reaches into a kind block.
    pub fn device(&self) -> Option<&str> {
        match self.path.as_slice() {
            [_, block, id, ..] if DeviceKind::from_block(block).is_some() && id != "renderer" => {
                Some(id)
            }
            _ => None,
        }
    }

    pub fn display_path(&self) -> String {
        self.path
            .iter()
            .map(|s| s.replace('.', "\\."))
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn find_unescaped(text: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in text.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            c if c == needle && !escaped => return Some(idx),
            _ => escaped = false,
        }
    }
    None
}

/// Split a patch path into segments, unescaping `\.` and prefixing
/// `network` when the path does not start with it.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('.') | Some('=') | Some('\\')) => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '.' => segments.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    segments.push(current);
    if segments.first().map(String::as_str) != Some("network") {
        segments.insert(0, "network".to_string());
    }
    segments
}

impl Parser {
    /// Layer a patch over everything loaded so far.
    pub fn apply_patch(&mut self, patch: &Patch) -> Result<()> {
        debug!(path = %patch.display_path(), "applying patch");
        self.load_document(&patch.fragment(), None)
    }
}

/// Write patches into the documents that define the patched keys.
///
/// A patch of a device goes to the last etc document that defines the
/// device; anything else goes to [`SET_FILE`] in the etc tier. The edited
/// hierarchy is reloaded and validated before any file is written, and must
/// merge to the same result as the patches layered on top. A later document
/// that overrides a patched key is an error. Returns the documents written.
pub fn apply_to_documents(ctx: &EngineContext, patches: &[Patch]) -> Result<Vec<PathBuf>> {
    let refs = loader::discover(ctx)?;
    let mut layers: Vec<(Tier, Document)> = refs
        .iter()
        .map(|r| Ok((r.tier, loader::read_document(&r.path)?)))
        .collect::<Result<_>>()?;

    let mut layered = Parser::new();
    for (_, doc) in &layers {
        layered.load_document(&doc.root, Some(&doc.path))?;
    }
    for patch in patches {
        layered.apply_patch(patch)?;
    }
    validate(&layered.clone().freeze(ctx)?, ctx)?;

    let etc = ctx.tier_dir(Tier::Etc.dir_name());
    let mut targets: Vec<PathBuf> = Vec::with_capacity(patches.len());
    let mut touched: Vec<PathBuf> = Vec::new();
    for patch in patches {
        let target = target_document(&layers, patch, &etc);
        targets.push(target.clone());
        let idx = match layers.iter().position(|(_, doc)| doc.path == target) {
            Some(idx) => idx,
            None => insert_layer(&mut layers, target.clone())?,
        };
        let others: Vec<DocNode> = layers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, (_, doc))| doc.root.clone())
            .collect();
        edit(&mut layers[idx].1.root, patch, &others)?;
        if !touched.contains(&target) {
            touched.push(target);
        }
    }

    let mut parser = Parser::new();
    for (_, doc) in &layers {
        parser.load_document(&doc.root, Some(&doc.path))?;
    }
    for (patch, target) in patches.iter().zip(&targets) {
        if !takes_effect(&parser, &layered, patch) {
            return Err(masked(ctx, &layers, patch, target));
        }
    }
    validate(&parser.freeze(ctx)?, ctx)?;

    for path in &touched {
        let Some((_, doc)) = layers.iter().find(|(_, doc)| &doc.path == path) else {
            continue;
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;
        }
        let text = write(&doc.root).map_err(|err| {
            Error::semantic(format!("cannot serialize {}: {err}", path.display()), None)
        })?;
        fs::write(path, text).map_err(|err| Error::io(path, err))?;
        info!(path = %path.display(), "updated document");
    }
    Ok(touched)
}

fn target_document(layers: &[(Tier, Document)], patch: &Patch, etc: &Path) -> PathBuf {
    let definition: Vec<&str> = patch.path.iter().take(3).map(String::as_str).collect();
    patch
        .device()
        .and_then(|_| {
            layers.iter().rev().find(|(tier, doc)| {
                *tier == Tier::Etc && doc.root.get_path(&definition).is_some()
            })
        })
        .map(|(_, doc)| doc.path.clone())
        .unwrap_or_else(|| etc.join(SET_FILE))
}

/// Whether the rewritten hierarchy merges to what the layered patch produced.
fn takes_effect(written: &Parser, layered: &Parser, patch: &Patch) -> bool {
    let Some(id) = patch.device() else {
        return written.globals() == layered.globals();
    };
    // Member lists accumulate across documents; a rewritten list replaces.
    let members = patch.path.get(3).is_some_and(|key| key == "interfaces");
    let comparable = |parser: &Parser| {
        parser.get(id).cloned().map(|mut def| {
            if members {
                def.interfaces = None;
            }
            def
        })
    };
    comparable(written) == comparable(layered)
}

/// Error for a patch that a later document undoes, naming that document.
fn masked(
    ctx: &EngineContext,
    layers: &[(Tier, Document)],
    patch: &Patch,
    target: &Path,
) -> Error {
    let segments: Vec<&str> = patch.path.iter().map(String::as_str).collect();
    let relative = |path: &Path| {
        path.strip_prefix(&ctx.root)
            .unwrap_or(path)
            .display()
            .to_string()
    };
    let later = layers
        .iter()
        .skip_while(|(_, doc)| doc.path.as_path() != target)
        .skip(1)
        .filter(|(_, doc)| doc.root.get_path(&segments).is_some())
        .last();
    let message = match later {
        Some((_, doc)) => format!("{} overrides {}", relative(&doc.path), patch.display_path()),
        None => format!(
            "{} does not take effect when written to {}",
            patch.display_path(),
            relative(target)
        ),
    };
    Error::semantic(message, None)
}

/// Add an empty etc document in processing order and return its index.
fn insert_layer(layers: &mut Vec<(Tier, Document)>, path: PathBuf) -> Result<usize> {
    let name = file_name(&path);
    if let Some((_, run)) = layers
        .iter()
        .find(|(tier, doc)| *tier == Tier::Run && file_name(&doc.path) == name)
    {
        return Err(Error::semantic(
            format!(
                "{} would be shadowed by {}",
                path.display(),
                run.path.display()
            ),
            None,
        ));
    }
    layers.retain(|(tier, doc)| !(*tier == Tier::Lib && file_name(&doc.path) == name));
    let idx = layers
        .iter()
        .position(|(tier, doc)| (*tier, file_name(&doc.path)) > (Tier::Etc, name.clone()))
        .unwrap_or(layers.len());
    layers.insert(
        idx,
        (
            Tier::Etc,
            Document {
                path,
                root: DocNode::mapping().with(
                    "network",
                    DocNode::mapping().with("version", DocNode::plain("2")),
                ),
            },
        ),
    );
    Ok(idx)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Apply one patch to a document tree. A deleted key is dropped from the
/// tree, or kept as an explicit `null` when another document still sets it.
fn edit(root: &mut DocNode, patch: &Patch, others: &[DocNode]) -> Result<()> {
    let Some((last, parents)) = patch.path.split_last() else {
        return Ok(());
    };
    let mut path: Vec<String> = parents.to_vec();
    let node = walk_mut(root, parents)?;
    path.push(last.clone());
    set_key(node, last, patch.value.clone(), &mut path, others);
    prune(root, &patch.path);
    Ok(())
}

fn walk_mut<'a>(root: &'a mut DocNode, segments: &[String]) -> Result<&'a mut DocNode> {
    let mut node = root;
    for segment in segments {
        if node.get(segment).map_or(true, DocNode::is_null)
            && !node.insert(segment.clone(), DocNode::mapping())
        {
            return Err(Error::semantic(
                format!("cannot patch below {segment:?}: not a mapping"),
                None,
            ));
        }
        let Some(next) = node.get_mut(segment) else {
            return Err(Error::semantic(format!("cannot patch below {segment:?}"), None));
        };
        node = next;
    }
    if node.is_null() {
        *node = DocNode::mapping();
    }
    Ok(node)
}

fn set_key(node: &mut DocNode, key: &str, value: DocNode, path: &mut Vec<String>, others: &[DocNode]) {
    if value.is_null() {
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        if others.iter().any(|doc| doc.get_path(&segments).is_some()) {
            node.insert(key, DocNode::null());
        } else {
            node.remove(key);
        }
        return;
    }
    let nested = node.get(key).is_some_and(|existing| existing.as_mapping().is_some());
    match value.value {
        NodeValue::Mapping(entries) if nested => {
            let Some(existing) = node.get_mut(key) else {
                return;
            };
            for entry in entries {
                path.push(entry.key.clone());
                set_key(existing, &entry.key, entry.value, path, others);
                path.pop();
            }
        }
        other => {
            node.insert(key, DocNode::new(other, value.mark));
        }
    }
}

/// Drop mappings left empty by a deletion, keeping the device itself.
fn prune(root: &mut DocNode, path: &[String]) {
    for depth in (4..path.len()).rev() {
        let segments: Vec<&str> = path[..depth].iter().map(String::as_str).collect();
        let empty = root
            .get_path(&segments)
            .and_then(DocNode::as_mapping)
            .is_some_and(|m| m.is_empty());
        if !empty {
            return;
        }
        let (leaf, parents) = match segments.split_last() {
            Some(split) => split,
            None => return,
        };
        let mut node = &mut *root;
        for segment in parents {
            match node.get_mut(segment) {
                Some(next) => node = next,
                None => return,
            }
        }
        node.remove(leaf);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::{apply_to_documents, split_path, Patch, SET_FILE};
    use crate::context::EngineContext;
    use crate::parse::Parser;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, body).expect("write");
    }

    #[test]
    fn paths_split_on_unescaped_dots() {
        assert_eq!(
            split_path("ethernets.eth0.networkmanager.passthrough.ethernet\\.wake-on-lan"),
            vec![
                "network",
                "ethernets",
                "eth0",
                "networkmanager",
                "passthrough",
                "ethernet.wake-on-lan"
            ]
        );
        assert_eq!(split_path("network.renderer"), vec!["network", "renderer"]);
    }

    #[test]
    fn parse_reads_flow_values() {
        let patch = Patch::parse("network.ethernets.eth0.addresses=[10.0.0.1/24]").expect("patch");
        assert_eq!(patch.device(), Some("eth0"));
        assert_eq!(patch.value.as_sequence().map(<[_]>::len), Some(1));
        assert!(Patch::parse("network.ethernets.eth0.mtu=null")
            .expect("null")
            .is_delete());
        assert!(Patch::parse("no-equals-sign").is_err());
    }

    #[test]
    fn patch_layers_over_loaded_documents() {
        let mut parser = Parser::new();
        parser
            .load_str("network:\n  ethernets:\n    eth0: {dhcp4: true, mtu: 1500}\n", None)
            .expect("load");
        parser
            .apply_patch(&Patch::parse("ethernets.eth0.mtu=null").expect("patch"))
            .expect("apply");
        parser
            .apply_patch(&Patch::parse("ethernets.eth1={dhcp6: true}").expect("patch"))
            .expect("apply");
        assert_eq!(parser.get("eth0").expect("eth0").mtu, None);
        assert_eq!(parser.get("eth1").expect("eth1").dhcp6, Some(true));
    }

    #[test]
    fn unknown_keys_are_rejected_before_merge() {
        let mut parser = Parser::new();
        let err = parser
            .apply_patch(&Patch::parse("ethernets.eth0.bogus=1").expect("patch"))
            .expect_err("must fail");
        assert!(err.message().contains("bogus"));
    }

    #[test]
    fn writes_into_the_defining_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = EngineContext::new(dir.path());
        write(
            dir.path(),
            "etc/netdecl/01-lan.yaml",
            "network:\n  version: 2\n  ethernets:\n    eth0:\n      dhcp4: true\n      mtu: 1500\n",
        );

        let written = apply_to_documents(
            &ctx,
            &[
                Patch::parse("ethernets.eth0.mtu=9000").expect("patch"),
                Patch::parse("ethernets.eth0.dhcp4=null").expect("patch"),
            ],
        )
        .expect("apply");
        let target = dir.path().join("etc/netdecl/01-lan.yaml");
        assert_eq!(written, vec![target.clone()]);
        assert_eq!(
            fs::read_to_string(target).expect("read"),
            "network:\n  version: 2\n  ethernets:\n    eth0:\n      mtu: 9000\n"
        );
    }

    #[test]
    fn new_keys_go_to_the_set_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = EngineContext::new(dir.path());
        write(
            dir.path(),
            "lib/netdecl/10-base.yaml",
            "network:\n  ethernets:\n    eth0: {mtu: 1500}\n",
        );

        apply_to_documents(&ctx, &[Patch::parse("ethernets.eth0.mtu=null").expect("patch")])
            .expect("apply");
        let set = dir.path().join("etc/netdecl").join(SET_FILE);
        assert_eq!(
            fs::read_to_string(&set).expect("read"),
            "network:\n  version: 2\n  ethernets:\n    eth0:\n      mtu: null\n"
        );

        let mut parser = Parser::new();
        parser.load_hierarchy(&ctx).expect("reload");
        assert_eq!(parser.get("eth0").expect("eth0").mtu, None);
    }

    #[test]
    fn invalid_result_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = EngineContext::new(dir.path());
        let original = "network:\n  ethernets:\n    eth0: {dhcp4: true}\n";
        write(dir.path(), "etc/netdecl/01-lan.yaml", original);

        let err = apply_to_documents(
            &ctx,
            &[Patch::parse("ethernets.eth0.set-name=lan0").expect("patch")],
        )
        .expect_err("set-name needs match");
        assert!(err.message().contains("match"));
        assert_eq!(
            fs::read_to_string(dir.path().join("etc/netdecl/01-lan.yaml")).expect("read"),
            original
        );
        assert!(!dir.path().join("etc/netdecl").join(SET_FILE).exists());
    }

    #[test]
    fn nested_delete_overrides_lower_tier() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = EngineContext::new(dir.path());
        write(
            dir.path(),
            "lib/netdecl/10-base.yaml",
            "network:\n  ethernets:\n    eth0:\n      dhcp4-overrides: {use-dns: false, use-ntp: false}\n",
        );

        apply_to_documents(
            &ctx,
            &[Patch::parse("ethernets.eth0.dhcp4-overrides.use-dns=null").expect("patch")],
        )
        .expect("apply");
        let set = fs::read_to_string(dir.path().join("etc/netdecl").join(SET_FILE)).expect("read");
        assert!(set.contains("use-dns: null"), "{set}");

        let mut parser = Parser::new();
        parser.load_hierarchy(&ctx).expect("reload");
        let overrides = parser
            .get("eth0")
            .and_then(|eth0| eth0.dhcp4_overrides.clone())
            .expect("overrides");
        assert_eq!(overrides.use_dns, None);
        assert_eq!(overrides.use_ntp, Some(false));
    }

    #[test]
    fn passthrough_key_delete_overrides_lower_tier() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = EngineContext::new(dir.path());
        write(
            dir.path(),
            "lib/netdecl/10-base.yaml",
            concat!(
                "network:\n  renderer: NetworkManager\n  ethernets:\n    eth0:\n",
                "      networkmanager:\n",
                "        passthrough: {ethernet.wake-on-lan: '0', ipv4.dns-priority: '10'}\n",
            ),
        );

        apply_to_documents(
            &ctx,
            &[Patch::parse(
                "ethernets.eth0.networkmanager.passthrough.ethernet\\.wake-on-lan=null",
            )
            .expect("patch")],
        )
        .expect("apply");

        let mut parser = Parser::new();
        parser.load_hierarchy(&ctx).expect("reload");
        let eth0 = parser.get("eth0").expect("eth0");
        let keys: Vec<_> = eth0.passthrough().expect("passthrough").keys().cloned().collect();
        assert_eq!(keys, ["ipv4.dns-priority"]);
    }

    #[test]
    fn run_document_masking_the_write_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = EngineContext::new(dir.path());
        let lan = "network:\n  ethernets:\n    eth0: {dhcp4: true}\n";
        write(dir.path(), "etc/netdecl/01-lan.yaml", lan);
        write(
            dir.path(),
            "run/netdecl/50-rt.yaml",
            "network:\n  ethernets:\n    eth0: {mtu: 1500}\n",
        );

        let patch = Patch::parse("ethernets.eth0.mtu=9000").expect("patch");
        let err = apply_to_documents(&ctx, &[patch]).expect_err("masked by run");
        assert_eq!(
            err.message(),
            "run/netdecl/50-rt.yaml overrides network.ethernets.eth0.mtu"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("etc/netdecl/01-lan.yaml")).expect("read"),
            lan
        );
        assert!(!dir.path().join("etc/netdecl").join(SET_FILE).exists());
    }

    #[test]
    fn device_redefined_in_run_still_targets_its_etc_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = EngineContext::new(dir.path());
        write(
            dir.path(),
            "etc/netdecl/01-lan.yaml",
            "network:\n  ethernets:\n    eth0: {dhcp4: true}\n",
        );
        write(
            dir.path(),
            "run/netdecl/50-rt.yaml",
            "network:\n  ethernets:\n    eth0: {optional: true}\n",
        );

        let written =
            apply_to_documents(&ctx, &[Patch::parse("ethernets.eth0.mtu=9000").expect("patch")])
                .expect("apply");
        assert_eq!(written, vec![dir.path().join("etc/netdecl/01-lan.yaml")]);

        let mut parser = Parser::new();
        parser.load_hierarchy(&ctx).expect("reload");
        let eth0 = parser.get("eth0").expect("eth0");
        assert_eq!(eth0.mtu, Some(9000));
        assert_eq!(eth0.optional, Some(true));
    }
}
