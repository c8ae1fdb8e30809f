//! Typed reads from a marked document tree.
//!
//! Every helper reports wrong value kinds as schema errors and invalid
//! enumerated values as semantic errors, both pointing at the value.

use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use netdecl_doc::{DocNode, MapEntry, Mark, NodeValue};

use crate::error::{Error, Location, Result};

pub(crate) struct Decoder<'a> {
    pub file: Option<&'a Path>,
    /// Value positions keyed by dotted field path.
    pub marks: IndexMap<String, Location>,
}

impl<'a> Decoder<'a> {
    pub fn new(file: Option<&'a Path>) -> Self {
        Self {
            file,
            marks: IndexMap::new(),
        }
    }

    pub fn loc(&self, mark: Mark) -> Location {
        Location::new(self.file, mark)
    }

    pub fn mark(&mut self, path: impl Into<String>, node: &DocNode) {
        let loc = self.loc(node.mark);
        self.marks.insert(path.into(), loc);
    }

    pub fn schema(&self, node: &DocNode, message: impl Into<String>) -> Error {
        Error::schema(message, self.loc(node.mark))
    }

    pub fn semantic(&self, node: &DocNode, message: impl Into<String>) -> Error {
        Error::semantic(message, Some(self.loc(node.mark)))
    }

    pub fn unknown_key(&self, entry: &MapEntry, what: &str) -> Error {
        Error::schema(
            format!("unknown key '{}' in {what}", entry.key),
            self.loc(entry.key_mark),
        )
    }

    pub fn mapping<'n>(&self, node: &'n DocNode, what: &str) -> Result<&'n [MapEntry]> {
        match &node.value {
            NodeValue::Mapping(entries) => Ok(entries),
            NodeValue::Null => Ok(&[]),
            _ => Err(self.schema(
                node,
                format!("expected a mapping for {what}, found {}", node.type_name()),
            )),
        }
    }

    pub fn sequence<'n>(&self, node: &'n DocNode, what: &str) -> Result<&'n [DocNode]> {
        match &node.value {
            NodeValue::Sequence(items) => Ok(items),
            _ => Err(self.schema(
                node,
                format!("expected a sequence for {what}, found {}", node.type_name()),
            )),
        }
    }

    pub fn string(&self, node: &DocNode, what: &str) -> Result<String> {
        node.as_scalar().map(str::to_string).ok_or_else(|| {
            self.schema(
                node,
                format!("expected a scalar for {what}, found {}", node.type_name()),
            )
        })
    }

    pub fn boolean(&self, node: &DocNode, what: &str) -> Result<bool> {
        let text = self.string(node, what)?;
        match text.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(true),
            "false" | "no" | "off" => Ok(false),
            _ => Err(self.schema(node, format!("expected a boolean for {what}, found '{text}'"))),
        }
    }

    pub fn uint(&self, node: &DocNode, what: &str) -> Result<u32> {
        let text = self.string(node, what)?;
        text.parse::<u32>().map_err(|_| {
            self.schema(
                node,
                format!("expected an unsigned integer for {what}, found '{text}'"),
            )
        })
    }

    pub fn enumerated<T: FromStr>(&self, node: &DocNode, what: &str) -> Result<T> {
        let text = self.string(node, what)?;
        text.parse::<T>()
            .map_err(|_| self.semantic(node, format!("invalid value '{text}' for {what}")))
    }

    /// A sequence of scalars.
    pub fn strings(&self, node: &DocNode, what: &str) -> Result<Vec<String>> {
        self.sequence(node, what)?
            .iter()
            .map(|item| self.string(item, what))
            .collect()
    }

    /// A single scalar or a sequence of scalars.
    pub fn one_or_many(&self, node: &DocNode, what: &str) -> Result<Vec<String>> {
        match &node.value {
            NodeValue::Scalar(_) => Ok(vec![self.string(node, what)?]),
            _ => self.strings(node, what),
        }
    }

    /// Keyed scalars. Null entries are skipped; they unset a key set by an
    /// earlier document.
    pub fn string_map(&self, node: &DocNode, what: &str) -> Result<IndexMap<String, String>> {
        self.mapping(node, what)?
            .iter()
            .filter(|entry| !entry.value.is_null())
            .map(|entry| Ok((entry.key.clone(), self.string(&entry.value, what)?)))
            .collect()
    }

    pub fn uint_map(&self, node: &DocNode, what: &str) -> Result<IndexMap<String, u32>> {
        self.mapping(node, what)?
            .iter()
            .filter(|entry| !entry.value.is_null())
            .map(|entry| Ok((entry.key.clone(), self.uint(&entry.value, what)?)))
            .collect()
    }

    pub fn opt_string(&self, node: &DocNode, what: &str) -> Result<Option<String>> {
        opt(node, |n| self.string(n, what))
    }

    pub fn opt_bool(&self, node: &DocNode, what: &str) -> Result<Option<bool>> {
        opt(node, |n| self.boolean(n, what))
    }

    pub fn opt_uint(&self, node: &DocNode, what: &str) -> Result<Option<u32>> {
        opt(node, |n| self.uint(n, what))
    }

    pub fn opt_enum<T: FromStr>(&self, node: &DocNode, what: &str) -> Result<Option<T>> {
        opt(node, |n| self.enumerated(n, what))
    }

    pub fn opt_strings(&self, node: &DocNode, what: &str) -> Result<Option<Vec<String>>> {
        opt(node, |n| self.strings(n, what))
    }

    pub fn opt_string_map(
        &self,
        node: &DocNode,
        what: &str,
    ) -> Result<Option<IndexMap<String, String>>> {
        opt(node, |n| self.string_map(n, what))
    }
}

/// `None` for a null node, the decoded value otherwise.
pub(crate) fn opt<T>(node: &DocNode, f: impl FnOnce(&DocNode) -> Result<T>) -> Result<Option<T>> {
    if node.is_null() {
        Ok(None)
    } else {
        f(node).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use netdecl_doc::parse;

    use super::Decoder;
    use crate::error::ErrorKind;
    use crate::model::params::BondMode;

    #[test]
    fn wrong_value_kind_is_schema_error_with_position() {
        let doc = parse("mtu: [1500]\n").expect("parse");
        let d = Decoder::new(None);
        let err = d.uint(doc.get("mtu").expect("mtu"), "mtu").expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(err.location().map(|l| (l.line, l.column)), Some((1, 6)));
    }

    #[test]
    fn bad_enum_is_semantic_error() {
        let doc = parse("mode: sideways\n").expect("parse");
        let d = Decoder::new(None);
        let err = d
            .enumerated::<BondMode>(doc.get("mode").expect("mode"), "bond mode")
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Semantic);
        assert!(err.message().contains("sideways"));
    }

    #[test]
    fn driver_accepts_scalar_or_list() {
        let doc = parse("a: ixgbe\nb: [ixgbe, e1000]\n").expect("parse");
        let d = Decoder::new(None);
        assert_eq!(
            d.one_or_many(doc.get("a").expect("a"), "driver").expect("a"),
            ["ixgbe"]
        );
        assert_eq!(
            d.one_or_many(doc.get("b").expect("b"), "driver").expect("b"),
            ["ixgbe", "e1000"]
        );
    }

    #[test]
    fn null_map_entries_are_skipped() {
        let doc = parse("m: {ethernet.mtu: '1500', ethernet.wake-on-lan: null}\n").expect("parse");
        let d = Decoder::new(None);
        let map = d.string_map(doc.get("m").expect("m"), "passthrough").expect("map");
        assert_eq!(map.keys().collect::<Vec<_>>(), ["ethernet.mtu"]);
    }
}
