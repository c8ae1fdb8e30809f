use std::fs;
use std::path::{Path, PathBuf};

use netdecl::context::EngineContext;
use netdecl::import::import_to_hierarchy;
use netdecl::parse::Parser;
use netdecl::patch::{apply_to_documents, Patch};
use netdecl::render::render;
use pretty_assertions::assert_eq;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn write_doc(root: &Path, tier: &str, name: &str, text: &str) -> PathBuf {
    let dir = root.join(tier).join("netdecl");
    fs::create_dir_all(&dir).expect("mkdir");
    let path = dir.join(name);
    fs::write(&path, text).expect("write");
    path
}

fn load(ctx: &EngineContext) -> netdecl::state::State {
    let mut parser = Parser::new();
    parser.load_hierarchy(ctx).expect("load");
    parser.freeze(ctx).expect("freeze")
}

#[test]
fn later_tiers_override_earlier_ones() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = EngineContext::new(dir.path());
    write_doc(dir.path(), "lib", "10-base.yaml", "network:\n  ethernets:\n    eth0:\n      mtu: 1500\n      dhcp4: true\n");
    write_doc(dir.path(), "run", "20-local.yaml", "network:\n  ethernets:\n    eth0:\n      mtu: 9000\n");

    let state = load(&ctx);
    let eth0 = state.get("eth0").expect("eth0");
    assert_eq!(eth0.def.mtu, Some(9000));
    assert_eq!(eth0.def.dhcp4, Some(true));
}

#[test]
fn same_file_name_in_a_later_tier_shadows_the_earlier_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = EngineContext::new(dir.path());
    write_doc(dir.path(), "lib", "10-base.yaml", "network:\n  ethernets:\n    old: {}\n");
    write_doc(dir.path(), "etc", "10-base.yaml", "network:\n  ethernets:\n    new: {}\n");

    let state = load(&ctx);
    assert!(state.get("old").is_none());
    assert!(state.get("new").is_some());
}

#[test]
fn set_then_reload_sees_the_change() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = EngineContext::new(dir.path());
    let base = write_doc(dir.path(), "etc", "10-base.yaml", "network:\n  ethernets:\n    eth0:\n      dhcp4: true\n");

    let patch = Patch::parse("ethernets.eth0.mtu=9000").expect("patch");
    let written = apply_to_documents(&ctx, &[patch]).expect("apply");
    assert_eq!(written, vec![base]);
    assert_eq!(load(&ctx).get("eth0").expect("eth0").def.mtu, Some(9000));
}

#[test]
fn imported_unknown_section_renders_back_unchanged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = EngineContext::new(dir.path());
    let keyfile = fixture("fixtures/keyfiles/unknown-section.nmconnection");
    let original = fs::read_to_string(&keyfile).expect("fixture");

    let doc = import_to_hierarchy(&ctx, &keyfile).expect("import");
    assert!(doc.starts_with(dir.path().join("etc/netdecl")));

    let state = load(&ctx);
    let tree = render(&state, &ctx).expect("render");
    let profile = tree
        .iter()
        .find(|(path, _)| path.extension().is_some_and(|ext| ext == "nmconnection"))
        .map(|(path, _)| tree.contents(path).expect("contents").to_string())
        .expect("profile rendered");
    assert_eq!(profile, original);
    assert!(profile.contains("[ethtool]\nfeature-rx=true\nfeature-tso=false\n"));
}
