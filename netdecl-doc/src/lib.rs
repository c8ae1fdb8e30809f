//! Generic document primitives used by configuration compilers.
//!
//! - [`tree`] — a YAML tree whose nodes remember their source position
//! - [`parser`] / [`writer`] — YAML text to tree and back
//! - [`keyfile`] — ordered INI keyfiles

pub mod keyfile;
pub mod parser;
pub mod tree;
pub mod writer;

pub use keyfile::{parse_keyfile, parse_keyfile_file, write_keyfile, Keyfile, KeyfileError};
pub use parser::{parse, parse_file, ParseError};
pub use tree::{DocNode, MapEntry, Mark, NodeValue, Scalar};
pub use writer::{to_value, write, write_file, WriteError};
