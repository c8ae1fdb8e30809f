//! In-memory output trees and writing them below a root directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

pub const MODE_PUBLIC: u32 = 0o644;
pub const MODE_SECRET: u32 = 0o600;
/// Secrets read by a daemon running under its own group.
pub const MODE_GROUP_SECRET: u32 = 0o640;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File { contents: String, mode: u32 },
    Symlink { target: PathBuf },
}

/// Files to write, keyed by path relative to the output root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTree {
    entries: BTreeMap<PathBuf, Entry>,
}

impl OutputTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>, mode: u32) {
        self.entries.insert(
            path.into(),
            Entry::File {
                contents: contents.into(),
                mode,
            },
        );
    }

    pub fn add_symlink(&mut self, path: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        self.entries.insert(
            path.into(),
            Entry::Symlink {
                target: target.into(),
            },
        );
    }

    pub fn extend(&mut self, other: OutputTree) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&Entry> {
        self.entries.get(path.as_ref())
    }

    /// Contents of a regular file.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<&str> {
        match self.entries.get(path.as_ref())? {
            Entry::File { contents, .. } => Some(contents),
            Entry::Symlink { .. } => None,
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Entry)> {
        self.entries.iter().map(|(path, entry)| (path.as_path(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every entry below `root`. The first failure aborts the write.
    pub fn write(&self, root: &Path) -> Result<usize> {
        for (rel, entry) in &self.entries {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
            }
            match entry {
                Entry::File { contents, mode } => {
                    fs::write(&path, contents).map_err(|err| Error::io(&path, err))?;
                    set_mode(&path, *mode)?;
                }
                Entry::Symlink { target } => {
                    if fs::symlink_metadata(&path).is_ok() {
                        fs::remove_file(&path).map_err(|err| Error::io(&path, err))?;
                    }
                    symlink(target, &path)?;
                }
            }
            debug!(path = %path.display(), "wrote");
        }
        info!(files = self.entries.len(), root = %root.display(), "output written");
        Ok(self.entries.len())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|err| Error::io(path, err))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, path: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, path).map_err(|err| Error::io(path, err))
}

#[cfg(not(unix))]
fn symlink(target: &Path, path: &Path) -> Result<()> {
    fs::copy(target, path)
        .map(|_| ())
        .map_err(|err| Error::io(path, err))
}

/// Directories and file-name prefixes of everything the engine generates.
pub fn generated_patterns(namespace: &str) -> Vec<(String, String)> {
    [
        ("run/systemd/network", format!("10-{namespace}-")),
        ("run/NetworkManager/system-connections", format!("{namespace}-")),
        ("run/NetworkManager/conf.d", format!("{namespace}.conf")),
        ("run/NetworkManager/conf.d", "10-globally-managed-devices.conf".to_string()),
        ("run/udev/rules.d", format!("99-{namespace}-")),
        ("run/udev/rules.d", format!("90-{namespace}")),
        ("run/systemd/system", format!("{namespace}-")),
        ("run/systemd/system/systemd-networkd.service.wants", format!("{namespace}-")),
    ]
    .into_iter()
    .map(|(dir, prefix)| (dir.to_string(), prefix))
    .chain([(format!("run/{namespace}"), "wpa-".to_string())])
    .collect()
}

/// Remove output left by a previous run. Returns the number of entries
/// removed.
pub fn clean_generated(root: &Path, namespace: &str) -> Result<usize> {
    let mut removed = 0;
    for (dir, prefix) in generated_patterns(namespace) {
        let dir = root.join(dir);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(Error::io(&dir, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|err| Error::io(&dir, err))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) {
                continue;
            }
            let path = entry.path();
            let meta = fs::symlink_metadata(&path).map_err(|err| Error::io(&path, err))?;
            if meta.is_dir() {
                fs::remove_dir_all(&path).map_err(|err| Error::io(&path, err))?;
            } else {
                fs::remove_file(&path).map_err(|err| Error::io(&path, err))?;
            }
            removed += 1;
        }
    }
    if removed > 0 {
        debug!(removed, "removed previously generated files");
    }
    Ok(removed)
}

/// Root-relative path as a string, for `OutputTree` keys.
pub fn rel(path: &str) -> PathBuf {
    PathBuf::from(path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{clean_generated, OutputTree, MODE_SECRET};

    #[test]
    fn write_creates_directories_and_modes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut tree = OutputTree::new();
        tree.add_file("run/netdecl/wpa-wlan0.conf", "network={}\n", MODE_SECRET);
        tree.write(dir.path()).expect("write");

        let path = dir.path().join("run/netdecl/wpa-wlan0.conf");
        assert_eq!(fs::read_to_string(&path).expect("read"), "network={}\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).expect("meta").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn clean_only_touches_generated_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let net = dir.path().join("run/systemd/network");
        fs::create_dir_all(&net).expect("mkdir");
        fs::write(net.join("10-netdecl-eth0.network"), "").expect("write");
        fs::write(net.join("20-admin.network"), "").expect("write");

        assert_eq!(clean_generated(dir.path(), "netdecl").expect("clean"), 1);
        assert!(net.join("20-admin.network").exists());
        assert!(!net.join("10-netdecl-eth0.network").exists());
    }
}
