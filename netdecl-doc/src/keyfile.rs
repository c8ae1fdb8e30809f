//! Ordered INI keyfiles, as used by NetworkManager connection profiles.
//!
//! Sections and keys keep insertion order so that a parsed file can be
//! written back with the same layout. Comments and blank lines are dropped.

use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;

/// Keys of one section, in file order.
pub type Section = IndexMap<String, String>;

/// Errors produced while reading a keyfile.
#[derive(Debug, Error)]
pub enum KeyfileError {
    /// A line that is neither a section header, a comment nor `key=value`.
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    /// Failed to read input file.
    #[error("failed to read keyfile: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyfile {
    sections: IndexMap<String, Section>,
}

impl Keyfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Return the section, creating it empty at the end if absent.
    pub fn section_mut(&mut self, name: &str) -> &mut Section {
        self.sections.entry(name.to_string()).or_default()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    pub fn contains(&self, section: &str, key: &str) -> bool {
        self.get(section, key).is_some()
    }

    /// Set a key, keeping the position of an existing key.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.section_mut(section)
            .insert(key.to_string(), value.into());
    }

    /// Remove a key and return its value. Empty sections stay in place.
    pub fn remove(&mut self, section: &str, key: &str) -> Option<String> {
        self.sections.get_mut(section)?.shift_remove(key)
    }

    pub fn remove_section(&mut self, name: &str) -> Option<Section> {
        self.sections.shift_remove(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(name, keys)| (name.as_str(), keys))
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl Display for Keyfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (idx, (name, keys)) in self.sections.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{name}]")?;
            for (key, value) in keys {
                writeln!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

/// Parse keyfile text.
///
/// A repeated section header continues the earlier section; a repeated key
/// keeps its first position and the last value.
pub fn parse_keyfile(text: &str) -> Result<Keyfile, KeyfileError> {
    let mut keyfile = Keyfile::new();
    let mut current: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(rest) = line.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| KeyfileError::Syntax {
                line: idx + 1,
                message: format!("unterminated section header '{line}'"),
            })?;
            if name.is_empty() {
                return Err(KeyfileError::Syntax {
                    line: idx + 1,
                    message: "empty section name".to_string(),
                });
            }
            keyfile.section_mut(name);
            current = Some(name.to_string());
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(KeyfileError::Syntax {
                line: idx + 1,
                message: format!("expected key=value, found '{line}'"),
            });
        };
        let Some(section) = current.as_deref() else {
            return Err(KeyfileError::Syntax {
                line: idx + 1,
                message: "key outside of any section".to_string(),
            });
        };
        keyfile.set(section, key.trim_end(), value.trim_start());
    }

    Ok(keyfile)
}

/// Parse a keyfile from disk.
pub fn parse_keyfile_file(path: &Path) -> Result<Keyfile, KeyfileError> {
    let text = fs::read_to_string(path)?;
    parse_keyfile(&text)
}

/// Render keyfile text.
pub fn write_keyfile(keyfile: &Keyfile) -> String {
    keyfile.to_string()
}

#[cfg(test)]
mod tests {
    use super::{parse_keyfile, write_keyfile, Keyfile};

    #[test]
    fn parse_keeps_order_and_skips_comments() {
        let kf = parse_keyfile("# header\n[b]\nz=1\na=2\n\n[a]\nk = v\n").expect("parse");
        let names: Vec<_> = kf.sections().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
        let keys: Vec<_> = kf.section("b").expect("b").keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(kf.get("a", "k"), Some("v"));
    }

    #[test]
    fn values_may_contain_equals() {
        let kf = parse_keyfile("[ipv4]\nroute1_options=table=100,onlink=true\n").expect("parse");
        assert_eq!(kf.get("ipv4", "route1_options"), Some("table=100,onlink=true"));
    }

    #[test]
    fn rejects_key_outside_section() {
        assert!(parse_keyfile("key=value\n").is_err());
    }

    #[test]
    fn writes_blank_line_between_sections() {
        let mut kf = Keyfile::new();
        kf.set("connection", "id", "x");
        kf.set("ipv4", "method", "auto");
        assert_eq!(
            write_keyfile(&kf),
            "[connection]\nid=x\n\n[ipv4]\nmethod=auto\n"
        );
    }
}
