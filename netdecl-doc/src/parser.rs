use std::fs;
use std::path::Path;

use thiserror::Error;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use crate::tree::{DocNode, MapEntry, Mark, NodeValue, Scalar};

/// Errors that can occur while parsing YAML into a [`DocNode`] tree.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed markup or a construct the format does not allow.
    #[error("{mark}: {message}")]
    Syntax { mark: Mark, message: String },
    /// Failed to read input file.
    #[error("failed to read YAML file: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    fn syntax(mark: Mark, message: impl Into<String>) -> Self {
        Self::Syntax {
            mark,
            message: message.into(),
        }
    }

    /// Position of a syntax error, if any.
    pub fn mark(&self) -> Option<Mark> {
        match self {
            Self::Syntax { mark, .. } => Some(*mark),
            Self::Io(_) => None,
        }
    }
}

/// Parse YAML text into a [`DocNode`] tree.
///
/// Only the first document of a stream is read. An empty document yields a
/// null node. Tab indentation, aliases and duplicate mapping keys are
/// rejected with the position of the offending token.
pub fn parse(source: &str) -> Result<DocNode, ParseError> {
    reject_tab_indentation(source)?;

    let mut builder = TreeBuilder::default();
    let mut parser = Parser::new(source.chars());
    parser.load(&mut builder, false).map_err(|err| {
        let marker = err.marker();
        ParseError::syntax(to_mark(marker), err.info().to_string())
    })?;

    if let Some(err) = builder.error {
        return Err(err);
    }
    if !builder.stack.is_empty() {
        return Err(ParseError::syntax(
            Mark::new(1, 1),
            "unterminated collection at end of document",
        ));
    }
    Ok(builder
        .root
        .unwrap_or_else(|| DocNode::new(NodeValue::Null, Mark::new(1, 1))))
}

/// Parse a YAML file into a [`DocNode`] tree.
pub fn parse_file(path: &Path) -> Result<DocNode, ParseError> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}

fn reject_tab_indentation(source: &str) -> Result<(), ParseError> {
    for (idx, line) in source.lines().enumerate() {
        let indent: &str = &line[..line.len() - line.trim_start().len()];
        if let Some(col) = indent.find('\t') {
            if line.trim().is_empty() {
                continue;
            }
            return Err(ParseError::syntax(
                Mark::new(idx + 1, col + 1),
                "tabs are not allowed for indentation",
            ));
        }
    }
    Ok(())
}

fn to_mark(marker: &Marker) -> Mark {
    Mark::new(marker.line(), marker.col() + 1)
}

enum Frame {
    Sequence {
        mark: Mark,
        items: Vec<DocNode>,
    },
    Mapping {
        mark: Mark,
        entries: Vec<MapEntry>,
        pending_key: Option<(String, Mark)>,
    },
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Frame>,
    root: Option<DocNode>,
    error: Option<ParseError>,
}

impl TreeBuilder {
    fn fail(&mut self, mark: Mark, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(ParseError::syntax(mark, message));
        }
    }

    fn push_node(&mut self, node: DocNode) {
        let mark = node.mark;
        match self.stack.last_mut() {
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping {
                entries,
                pending_key,
                ..
            }) => match pending_key.take() {
                Some((key, key_mark)) => entries.push(MapEntry {
                    key,
                    key_mark,
                    value: node,
                }),
                None => {
                    let key = match node.value {
                        NodeValue::Scalar(scalar) => scalar.text,
                        NodeValue::Null => String::new(),
                        _ => {
                            self.fail(mark, "mapping keys must be scalars");
                            return;
                        }
                    };
                    if entries.iter().any(|entry| entry.key == key) {
                        self.fail(mark, format!("duplicate key '{key}'"));
                        return;
                    }
                    *pending_key = Some((key, mark));
                }
            },
        }
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, ev: Event, marker: Marker) {
        if self.error.is_some() {
            return;
        }
        let mark = to_mark(&marker);
        match ev {
            Event::Alias(_) => self.fail(mark, "aliases are not supported"),
            Event::Scalar(text, style, ..) => {
                let plain = matches!(style, TScalarStyle::Plain);
                let value = if plain && is_null_text(&text) {
                    NodeValue::Null
                } else {
                    NodeValue::Scalar(Scalar { text, plain })
                };
                self.push_node(DocNode::new(value, mark));
            }
            Event::SequenceStart(..) => self.stack.push(Frame::Sequence {
                mark,
                items: Vec::new(),
            }),
            Event::MappingStart(..) => self.stack.push(Frame::Mapping {
                mark,
                entries: Vec::new(),
                pending_key: None,
            }),
            Event::SequenceEnd | Event::MappingEnd => match self.stack.pop() {
                Some(Frame::Sequence { mark, items }) => {
                    self.push_node(DocNode::new(NodeValue::Sequence(items), mark));
                }
                Some(Frame::Mapping {
                    mark,
                    entries,
                    pending_key,
                }) => {
                    if let Some((key, key_mark)) = pending_key {
                        self.fail(key_mark, format!("key '{key}' has no value"));
                        return;
                    }
                    self.push_node(DocNode::new(NodeValue::Mapping(entries), mark));
                }
                None => self.fail(mark, "collection end without start"),
            },
            _ => {}
        }
    }
}

fn is_null_text(text: &str) -> bool {
    matches!(text, "" | "~" | "null" | "Null" | "NULL")
}

#[cfg(test)]
mod tests {
    use super::{parse, ParseError};
    use crate::tree::Mark;

    #[test]
    fn records_one_based_positions() {
        let root = parse("network:\n  version: 2\n").expect("parse");
        let version = root.get_path(&["network", "version"]).expect("version");
        assert_eq!(version.mark, Mark::new(2, 12));
    }

    #[test]
    fn rejects_tab_indentation() {
        let err = parse("network:\n\tversion: 2\n").expect_err("tab");
        assert_eq!(err.mark(), Some(Mark::new(2, 1)));
    }

    #[test]
    fn rejects_aliases() {
        let err = parse("a: &x 1\nb: *x\n").expect_err("alias");
        assert!(err.to_string().contains("aliases"));
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = parse("a: 1\na: 2\n").expect_err("dup");
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert!(err.to_string().contains("duplicate key 'a'"));
    }

    #[test]
    fn quoted_null_stays_a_string() {
        let root = parse("a: 'null'\nb: null\nc:\n").expect("parse");
        assert_eq!(root.get("a").and_then(|n| n.as_scalar()), Some("null"));
        assert!(root.get("b").expect("b").is_null());
        assert!(root.get("c").expect("c").is_null());
    }

    #[test]
    fn empty_document_is_null() {
        let root = parse("# nothing here\n").expect("parse");
        assert!(root.is_null());
    }
}
