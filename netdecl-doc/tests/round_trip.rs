use std::path::PathBuf;

use netdecl_doc::{
    parse, parse_file, parse_keyfile, parse_keyfile_file, write, write_file, write_keyfile,
    DocNode,
};
use pretty_assertions::assert_eq;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

/// Drop positions so trees read from different texts can be compared.
fn strip_marks(node: &DocNode) -> DocNode {
    use netdecl_doc::NodeValue;
    let value = match &node.value {
        NodeValue::Sequence(items) => NodeValue::Sequence(items.iter().map(strip_marks).collect()),
        NodeValue::Mapping(entries) => NodeValue::Mapping(
            entries
                .iter()
                .map(|e| netdecl_doc::MapEntry {
                    key: e.key.clone(),
                    key_mark: Default::default(),
                    value: strip_marks(&e.value),
                })
                .collect(),
        ),
        other => other.clone(),
    };
    DocNode::new(value, Default::default())
}

#[test]
fn parse_write_parse_round_trip_preserves_tree_shape() {
    let first = parse_file(&fixture("fixtures/docs/simple.yaml")).expect("initial parse");
    let written = write(&first).expect("write should succeed");
    let second = parse(&written).expect("re-parse should succeed");

    assert_eq!(strip_marks(&first), strip_marks(&second));
}

#[test]
fn write_file_then_parse_file_round_trip() {
    let node = parse_file(&fixture("fixtures/docs/simple.yaml")).expect("parse");
    let out_dir = tempfile::tempdir().expect("tempdir should be created");
    let out_path = out_dir.path().join("roundtrip.yaml");

    write_file(&node, &out_path).expect("write_file should succeed");
    let reparsed = parse_file(&out_path).expect("parse_file should succeed");
    assert_eq!(strip_marks(&node), strip_marks(&reparsed));
}

#[test]
fn keyfile_write_reproduces_input_layout() {
    let path = fixture("fixtures/keyfiles/unknown-section.nmconnection");
    let original = std::fs::read_to_string(&path).expect("read fixture");
    let parsed = parse_keyfile_file(&path).expect("parse keyfile");

    assert_eq!(write_keyfile(&parsed), original);
    assert_eq!(parse_keyfile(&write_keyfile(&parsed)).expect("reparse"), parsed);
}
