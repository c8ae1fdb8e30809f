use std::fs;
use std::path::Path;

use serde_yaml::{Mapping, Number, Value};
use thiserror::Error;

use crate::tree::{DocNode, NodeValue};

/// Errors that can occur while writing YAML from a [`DocNode`] tree.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to serialize YAML text.
    #[error("failed to write YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Failed to write output file.
    #[error("failed to write YAML file: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize a [`DocNode`] tree into YAML text.
///
/// Mapping keys keep their order. Plain scalars that read as booleans or
/// integers are emitted unquoted; every other scalar is emitted as a string.
pub fn write(node: &DocNode) -> Result<String, WriteError> {
    Ok(serde_yaml::to_string(&to_value(node))?)
}

/// Serialize a [`DocNode`] tree and write it to `path`.
pub fn write_file(node: &DocNode, path: &Path) -> Result<(), WriteError> {
    let text = write(node)?;
    fs::write(path, text)?;
    Ok(())
}

/// Convert a tree into a `serde_yaml` value.
pub fn to_value(node: &DocNode) -> Value {
    match &node.value {
        NodeValue::Null => Value::Null,
        NodeValue::Scalar(scalar) if scalar.plain => plain_value(&scalar.text),
        NodeValue::Scalar(scalar) => Value::String(scalar.text.clone()),
        NodeValue::Sequence(items) => Value::Sequence(items.iter().map(to_value).collect()),
        NodeValue::Mapping(entries) => {
            let mut mapping = Mapping::new();
            for entry in entries {
                mapping.insert(Value::String(entry.key.clone()), to_value(&entry.value));
            }
            Value::Mapping(mapping)
        }
    }
}

fn plain_value(text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    let digits = text.strip_prefix('-').unwrap_or(text);
    let canonical_int = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'));
    if canonical_int {
        if let Ok(n) = text.parse::<u64>() {
            return Value::Number(Number::from(n));
        }
        if let Ok(n) = text.parse::<i64>() {
            return Value::Number(Number::from(n));
        }
    }
    Value::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::write;
    use crate::tree::DocNode;

    #[test]
    fn keeps_key_order_and_scalar_types() {
        let root = DocNode::mapping().with(
            "network",
            DocNode::mapping()
                .with("version", DocNode::plain("2"))
                .with("renderer", DocNode::plain("networkd"))
                .with("flag", DocNode::plain("true"))
                .with("label", DocNode::string("true")),
        );
        let text = write(&root).expect("write");
        assert_eq!(
            text,
            "network:\n  version: 2\n  renderer: networkd\n  flag: true\n  label: 'true'\n"
        );
    }

    #[test]
    fn leading_zero_stays_a_string() {
        let text = write(&DocNode::mapping().with("pin", DocNode::plain("0123"))).expect("write");
        assert!(text.contains("'0123'"));
    }
}
