use std::path::PathBuf;

use netdecl_doc::{parse, parse_file, Mark, ParseError};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn parse_file_reads_nested_structure() {
    let root = parse_file(&fixture("fixtures/docs/simple.yaml")).expect("parse should succeed");

    let eth0 = root
        .get_path(&["network", "ethernets", "eth0"])
        .expect("eth0 present");
    assert_eq!(eth0.get("dhcp4").and_then(|n| n.as_scalar()), Some("true"));

    let addresses = eth0
        .get("addresses")
        .and_then(|n| n.as_sequence())
        .expect("addresses sequence");
    assert_eq!(addresses.len(), 2);
    assert_eq!(addresses[1].as_scalar(), Some("2001:db8::10/64"));
    assert_eq!(addresses[0].mark, Mark::new(8, 11));
}

#[test]
fn malformed_markup_reports_position() {
    let err = parse("network:\n  ethernets: [eth0\n").expect_err("should fail");
    match err {
        ParseError::Syntax { mark, .. } => assert!(mark.line >= 2),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn flow_and_block_mappings_parse_alike() {
    let block = parse("a:\n  b: 1\n").expect("block");
    let flow = parse("{a: {b: 1}}").expect("flow");
    assert_eq!(
        block.get_path(&["a", "b"]).and_then(|n| n.as_scalar()),
        flow.get_path(&["a", "b"]).and_then(|n| n.as_scalar())
    );
}
