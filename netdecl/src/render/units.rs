//! systemd unit files, whose sections may repeat (`[Route]`, `[Address]`).

use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSection {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl UnitSection {
    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.entries.push((key.to_string(), value.to_string()));
        self
    }

    pub fn set_opt<T: ToString>(&mut self, key: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    pub fn set_bool(&mut self, key: &str, value: Option<bool>) -> &mut Self {
        self.set_opt(key, value.map(yes_no))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A unit file built section by section, emitted in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFile {
    sections: Vec<UnitSection>,
}

impl UnitFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new section, even if one with that name exists.
    pub fn section(&mut self, name: &str) -> &mut UnitSection {
        self.sections.push(UnitSection {
            name: name.to_string(),
            entries: Vec::new(),
        });
        let last = self.sections.len() - 1;
        &mut self.sections[last]
    }

    /// The last section called `name`, created if missing.
    pub fn section_once(&mut self, name: &str) -> &mut UnitSection {
        match self.sections.iter().rposition(|s| s.name == name) {
            Some(idx) => &mut self.sections[idx],
            None => self.section(name),
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .filter(|s| s.name == section)
            .flat_map(|s| s.entries.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(UnitSection::is_empty)
    }
}

impl Display for UnitFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for section in self.sections.iter().filter(|s| !s.is_empty()) {
            if !first {
                writeln!(f)?;
            }
            first = false;
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in &section.entries {
                writeln!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

pub fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::UnitFile;

    #[test]
    fn repeated_sections_and_empty_sections() {
        let mut unit = UnitFile::new();
        unit.section("Match").set("Name", "eth0");
        unit.section("Link");
        unit.section("Route").set("Destination", "10.0.0.0/8");
        unit.section("Route").set("Destination", "10.1.0.0/16");
        unit.section_once("Match").set("Driver", "ixgbe");

        assert_eq!(
            unit.to_string(),
            "[Match]\nName=eth0\nDriver=ixgbe\n\n[Route]\nDestination=10.0.0.0/8\n\n[Route]\nDestination=10.1.0.0/16\n"
        );
    }
}
