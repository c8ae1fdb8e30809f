use std::fs;
use std::path::Path;

use netdecl::context::EngineContext;
use netdecl::parse::Parser;
use netdecl::render::{generate, render};
use netdecl::serialize::state_to_yaml;
use netdecl::state::State;
use netdecl::validate::validate;
use pretty_assertions::assert_eq;

const MIXED: &str = "network:
  version: 2
  renderer: networkd
  ethernets:
    eth0:
      dhcp4: true
      mtu: 1500
    eth1:
      match:
        macaddress: \"00:11:22:33:44:55\"
      set-name: lan1
    eth2: {}
  bridges:
    br0:
      interfaces: [eth1, eth2]
      parameters:
        stp: false
      addresses: [192.168.10.1/24]
  vlans:
    vlan10:
      id: 10
      link: eth0
      addresses: [10.0.10.2/24]
      routes:
        - to: 10.20.0.0/16
          via: 10.0.10.1
      nameservers:
        addresses: [10.0.10.53]
        search: [lab.example]
";

fn freeze_all(docs: &[&str]) -> netdecl::Result<State> {
    let mut parser = Parser::new();
    for doc in docs {
        parser.load_str(doc, None)?;
    }
    parser.freeze(&EngineContext::default())
}

fn checked(docs: &[&str]) -> netdecl::Result<State> {
    let state = freeze_all(docs)?;
    validate(&state, &EngineContext::default())?;
    Ok(state)
}

fn files_under(root: &Path) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).expect("read_dir") {
            let path = entry.expect("entry").path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).expect("prefix").display().to_string();
                out.push((rel, fs::read_to_string(&path).expect("read")));
            }
        }
    }
    out.sort();
    out
}

#[test]
fn serialized_state_reloads_to_the_same_model() {
    let ctx = EngineContext::default();
    let state = checked(&[MIXED]).expect("state");
    let first = state_to_yaml(&state, &ctx).expect("serialize");

    let again = checked(&[&first]).expect("reload");
    assert_eq!(state_to_yaml(&again, &ctx).expect("serialize again"), first);
    assert_eq!(again.len(), state.len());
    for def in state.definitions() {
        let reloaded = again.get(&def.id).expect("device survives");
        assert_eq!(&reloaded.def, def);
    }
}

#[test]
fn rendering_is_idempotent() {
    let ctx = EngineContext::default();
    let state = checked(&[MIXED]).expect("state");
    assert_eq!(
        render(&state, &ctx).expect("first"),
        render(&state, &ctx).expect("second")
    );

    let one = tempfile::tempdir().expect("tempdir");
    let two = tempfile::tempdir().expect("tempdir");
    generate(&state, &EngineContext::new(one.path()), one.path()).expect("generate one");
    generate(&state, &EngineContext::new(two.path()), two.path()).expect("generate two");
    generate(&state, &EngineContext::new(two.path()), two.path()).expect("generate again");
    let written = files_under(one.path());
    assert!(!written.is_empty());
    assert_eq!(written, files_under(two.path()));
}

#[test]
fn disjoint_fields_merge_the_same_in_either_order() {
    let ctx = EngineContext::default();
    let a = "network:\n  ethernets:\n    eth0:\n      mtu: 9000\n";
    let b = "network:\n  ethernets:\n    eth0:\n      dhcp4: true\n      addresses: [10.1.1.1/24]\n";
    let ab = state_to_yaml(&checked(&[a, b]).expect("ab"), &ctx).expect("yaml");
    let ba = state_to_yaml(&checked(&[b, a]).expect("ba"), &ctx).expect("yaml");
    assert_eq!(ab, ba);
    assert!(ab.contains("mtu: 9000"));
    assert!(ab.contains("dhcp4: true"));
}

#[test]
fn double_membership_fails_in_either_order() {
    let eth = "network:\n  ethernets:\n    eth0: {}\n";
    let bond = "network:\n  bonds:\n    bond0:\n      interfaces: [eth0]\n";
    let bridge = "network:\n  bridges:\n    bridge0:\n      interfaces: [eth0]\n";
    for docs in [[eth, bond, bridge], [eth, bridge, bond]] {
        let err = freeze_all(&docs).expect_err("must fail");
        let message = err.message();
        assert!(message.contains("eth0"), "{message}");
        assert!(message.contains("bond0"), "{message}");
        assert!(message.contains("bridge0"), "{message}");
    }
}

#[test]
fn references_may_point_forward() {
    let same_file = "network:\n  vlans:\n    vlan5:\n      id: 5\n      link: uplink\n  ethernets:\n    uplink: {}\n";
    let state = checked(&[same_file]).expect("same file");
    let vlan = state.get("vlan5").expect("vlan");
    assert_eq!(state.parent_of(vlan).map(|dev| dev.id()), Some("uplink"));

    let first = "network:\n  bridges:\n    br0:\n      interfaces: [eth0]\n";
    let second = "network:\n  ethernets:\n    eth0: {}\n";
    let state = checked(&[first, second]).expect("across files");
    let br0 = state.get("br0").expect("bridge");
    assert_eq!(
        state.members_of(br0).map(|dev| dev.id()).collect::<Vec<_>>(),
        vec!["eth0"]
    );
}

#[test]
fn dhcp4_enables_ipv4_client_and_dhcp_section() {
    let state = checked(&["network:\n  ethernets:\n    eth0:\n      dhcp4: true\n"]).expect("state");
    let tree = render(&state, &EngineContext::default()).expect("render");
    let unit = tree
        .contents("run/systemd/network/10-netdecl-eth0.network")
        .expect("network unit");
    assert!(unit.contains("[Network]\nDHCP=ipv4\n"));
    assert!(unit.contains("\n[DHCP]\n"));
}

#[test]
fn set_name_without_match_is_rejected() {
    let err = checked(&["network:\n  ethernets:\n    eth0:\n      set-name: lan0\n"])
        .expect_err("must fail");
    assert_eq!(err.kind(), netdecl::error::ErrorKind::Semantic);
    assert!(err.message().contains("requires match"));
    assert!(err.message().contains("eth0"));
}

#[test]
fn networkmanager_driver_match_needs_a_rename() {
    let bare = "network:\n  renderer: NetworkManager\n  ethernets:\n    lan:\n      match: {driver: ixgbe}\n";
    assert!(checked(&[bare]).is_err());

    let renamed = "network:\n  renderer: NetworkManager\n  ethernets:\n    lan:\n      match: {driver: ixgbe}\n      set-name: lan0\n";
    let state = checked(&[renamed]).expect("state");
    let tree = render(&state, &EngineContext::default()).expect("render");
    let rule = tree
        .contents("run/udev/rules.d/99-netdecl-lan.rules")
        .expect("rename rule");
    assert!(rule.contains("DRIVERS==\"ixgbe\""));
    assert!(rule.contains("NAME=\"lan0\""));
    let profile = tree
        .contents("run/NetworkManager/system-connections/netdecl-lan.nmconnection")
        .expect("profile");
    assert!(profile.contains("interface-name=lan0\n"));
}
