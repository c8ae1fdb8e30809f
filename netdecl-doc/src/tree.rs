use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// A 1-based source position inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Mark {
    pub line: usize,
    pub column: usize,
}

impl Mark {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Mark {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A scalar as written in the document.
///
/// `plain` is false for quoted and block scalars; writers use it to decide
/// whether `true` or `10` is a boolean/number or a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    pub text: String,
    pub plain: bool,
}

/// One `key: value` pair of a mapping, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub key: String,
    pub key_mark: Mark,
    pub value: DocNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValue {
    Null,
    Scalar(Scalar),
    Sequence(Vec<DocNode>),
    Mapping(Vec<MapEntry>),
}

/// A generic YAML tree node carrying the position it was read from.
///
/// Nodes built in memory (for writing) carry [`Mark::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocNode {
    pub value: NodeValue,
    pub mark: Mark,
}

impl DocNode {
    pub fn new(value: NodeValue, mark: Mark) -> Self {
        Self { value, mark }
    }

    pub fn null() -> Self {
        Self::new(NodeValue::Null, Mark::default())
    }

    /// A plain scalar: `true`, `42` and `null`-like text keep their YAML type.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(
            NodeValue::Scalar(Scalar {
                text: text.into(),
                plain: true,
            }),
            Mark::default(),
        )
    }

    /// A scalar that is always a string, whatever its text looks like.
    pub fn string(text: impl Into<String>) -> Self {
        Self::new(
            NodeValue::Scalar(Scalar {
                text: text.into(),
                plain: false,
            }),
            Mark::default(),
        )
    }

    pub fn sequence(items: Vec<DocNode>) -> Self {
        Self::new(NodeValue::Sequence(items), Mark::default())
    }

    pub fn mapping() -> Self {
        Self::new(NodeValue::Mapping(Vec::new()), Mark::default())
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, NodeValue::Null)
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match &self.value {
            NodeValue::Scalar(scalar) => Some(scalar.text.as_str()),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[DocNode]> {
        match &self.value {
            NodeValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&[MapEntry]> {
        match &self.value {
            NodeValue::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    /// Return the value stored under `key` if this node is a mapping.
    pub fn get(&self, key: &str) -> Option<&DocNode> {
        self.as_mapping()?
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut DocNode> {
        match &mut self.value {
            NodeValue::Mapping(entries) => entries
                .iter_mut()
                .find(|entry| entry.key == key)
                .map(|entry| &mut entry.value),
            _ => None,
        }
    }

    /// Walk a nested key path.
    pub fn get_path<'a>(&'a self, path: &[&str]) -> Option<&'a DocNode> {
        let mut current = self;
        for segment in path {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Insert or replace `key`, keeping the position of an existing entry.
    ///
    /// Turns a null node into an empty mapping first. Returns `false` when
    /// the node is a scalar or sequence.
    pub fn insert(&mut self, key: impl Into<String>, value: DocNode) -> bool {
        if self.is_null() {
            self.value = NodeValue::Mapping(Vec::new());
        }
        let NodeValue::Mapping(entries) = &mut self.value else {
            return false;
        };
        let key = key.into();
        if let Some(entry) = entries.iter_mut().find(|entry| entry.key == key) {
            entry.value = value;
        } else {
            entries.push(MapEntry {
                key,
                key_mark: Mark::default(),
                value,
            });
        }
        true
    }

    /// Remove `key` from a mapping and return its value.
    pub fn remove(&mut self, key: &str) -> Option<DocNode> {
        let NodeValue::Mapping(entries) = &mut self.value else {
            return None;
        };
        let idx = entries.iter().position(|entry| entry.key == key)?;
        Some(entries.remove(idx).value)
    }

    /// Builder-style insert for constructing trees in memory.
    pub fn with(mut self, key: impl Into<String>, value: DocNode) -> Self {
        self.insert(key, value);
        self
    }

    /// Short name of the node type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self.value {
            NodeValue::Null => "null",
            NodeValue::Scalar(_) => "scalar",
            NodeValue::Sequence(_) => "sequence",
            NodeValue::Mapping(_) => "mapping",
        }
    }
}
