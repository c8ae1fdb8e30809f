//! Discovery and reading of the document hierarchy.
//!
//! Documents live in three tiers of increasing precedence:
//! `<root>/lib/<ns>`, `<root>/etc/<ns>` and `<root>/run/<ns>`. A document in
//! a higher tier shadows a lower-tier document with the same file name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use netdecl_doc::{parse, DocNode};
use tracing::{debug, warn};

use crate::context::EngineContext;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Lib,
    Etc,
    Run,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Lib, Tier::Etc, Tier::Run];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Lib => "lib",
            Self::Etc => "etc",
            Self::Run => "run",
        }
    }
}

/// A document file selected for loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub tier: Tier,
    pub path: PathBuf,
}

impl DocumentRef {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A parsed document and where it came from.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub root: DocNode,
}

/// Enumerate the surviving documents in processing order.
///
/// Processing is tier-major: every lib document, then etc, then run, each
/// tier ordered by file name. Shadowed documents are dropped.
pub fn discover(ctx: &EngineContext) -> Result<Vec<DocumentRef>> {
    let mut by_tier: Vec<(Tier, BTreeMap<String, PathBuf>)> = Vec::new();
    for tier in Tier::ALL {
        let dir = ctx.tier_dir(tier.dir_name());
        by_tier.push((tier, list_yaml(&dir)?));
    }

    let mut docs = Vec::new();
    for (idx, (tier, files)) in by_tier.iter().enumerate() {
        for (name, path) in files {
            let shadowed_by = by_tier[idx + 1..]
                .iter()
                .find(|(_, higher)| higher.contains_key(name));
            if let Some((higher, _)) = shadowed_by {
                debug!(
                    path = %path.display(),
                    tier = higher.dir_name(),
                    "document shadowed by higher tier"
                );
                continue;
            }
            docs.push(DocumentRef {
                tier: *tier,
                path: path.clone(),
            });
        }
    }
    Ok(docs)
}

fn list_yaml(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut files = BTreeMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(err) => return Err(Error::io(dir, err)),
    };
    for entry in entries {
        let entry = entry.map_err(|err| Error::io(dir, err))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "skipping document with non UTF-8 name");
            continue;
        };
        if !name.ends_with(".yaml") || name.starts_with('.') {
            continue;
        }
        if !path.is_file() {
            continue;
        }
        files.insert(name.to_string(), path);
    }
    Ok(files)
}

/// Read and parse one document.
pub fn read_document(path: &Path) -> Result<Document> {
    let text = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
    let root = parse(&text).map_err(|err| Error::from_parse(err, Some(path)))?;
    debug!(path = %path.display(), "parsed document");
    Ok(Document {
        path: path.to_path_buf(),
        root,
    })
}

/// Discover and parse the whole hierarchy.
pub fn load_hierarchy(ctx: &EngineContext) -> Result<Vec<Document>> {
    discover(ctx)?
        .iter()
        .map(|doc| read_document(&doc.path))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{discover, load_hierarchy, Tier};
    use crate::context::EngineContext;
    use crate::error::ErrorKind;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, body).expect("write");
    }

    #[test]
    fn tier_major_order_with_shadowing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write(root, "lib/netdecl/10-base.yaml", "network: {version: 2}\n");
        write(root, "lib/netdecl/50-shadowed.yaml", "network: {version: 2}\n");
        write(root, "etc/netdecl/01-early.yaml", "network: {version: 2}\n");
        write(root, "run/netdecl/50-shadowed.yaml", "network: {version: 2}\n");
        write(root, "etc/netdecl/notes.txt", "ignored\n");

        let docs = discover(&EngineContext::new(root)).expect("discover");
        let names: Vec<_> = docs.iter().map(|d| (d.tier, d.file_name())).collect();
        assert_eq!(
            names,
            vec![
                (Tier::Lib, "10-base.yaml".to_string()),
                (Tier::Etc, "01-early.yaml".to_string()),
                (Tier::Run, "50-shadowed.yaml".to_string()),
            ]
        );
    }

    #[test]
    fn missing_tiers_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let docs = discover(&EngineContext::new(dir.path())).expect("discover");
        assert!(docs.is_empty());
    }

    #[test]
    fn syntax_error_names_file_and_position() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "etc/netdecl/bad.yaml",
            "network:\n  ethernets:\n    eth0: [unclosed\n",
        );
        let err = load_hierarchy(&EngineContext::new(dir.path())).expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Syntax);
        let loc = err.location().expect("location");
        assert!(loc
            .file
            .as_ref()
            .is_some_and(|f| f.ends_with("etc/netdecl/bad.yaml")));
    }
}
