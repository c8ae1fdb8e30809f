//! Engine context: the global defaults threaded through every stage.
//!
//! The built-in defaults live in `defaults/context.toml`; a context file
//! given on the command line overrides individual keys.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use strum::{Display, EnumString};

use crate::error::{Error, Location, Result};
use crate::model::Backend;

/// How NetworkManager treats devices nobody configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, EnumString, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NmManagement {
    /// NetworkManager manages everything not claimed by networkd.
    #[default]
    All,
    /// NetworkManager only manages devices it is explicitly given.
    OnlyListed,
}

/// Keys accepted in a context file. Unset keys keep the previous layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextFile {
    pub namespace: Option<String>,
    pub default_renderer: Option<Backend>,
    pub ipv6_privacy: Option<bool>,
    pub nm_management: Option<NmManagement>,
    #[serde(default)]
    pub always_serialize: Vec<String>,
}

/// Immutable configuration of one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineContext {
    /// Filesystem root that holds `lib/`, `etc/` and `run/`.
    pub root: PathBuf,
    pub namespace: String,
    pub default_renderer: Option<Backend>,
    pub ipv6_privacy: bool,
    pub nm_management: NmManagement,
    /// Field paths the serializer writes as `null` when unset.
    pub always_serialize: Vec<String>,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            namespace: "netdecl".to_string(),
            default_renderer: None,
            ipv6_privacy: false,
            nm_management: NmManagement::All,
            always_serialize: Vec::new(),
        }
    }
}

impl EngineContext {
    /// Built-in defaults rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut ctx = Self::default();
        let embedded = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/defaults/context.toml"));
        if let Ok(file) = parse_context(embedded) {
            ctx.apply(file);
        }
        ctx.root = root.into();
        ctx
    }

    /// Built-in defaults overridden by a context file.
    pub fn load(root: impl Into<PathBuf>, path: &Path) -> Result<Self> {
        let mut ctx = Self::new(root);
        let raw = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        let file = parse_context(&raw).map_err(|err| {
            let (line, column) = err
                .span()
                .map(|span| line_col(&raw, span.start))
                .unwrap_or((1, 1));
            Error::Schema {
                message: err.message().to_string(),
                location: Location {
                    file: Some(path.to_path_buf()),
                    line,
                    column,
                },
            }
        })?;
        ctx.apply(file);
        Ok(ctx)
    }

    pub fn apply(&mut self, file: ContextFile) {
        if let Some(ns) = file.namespace {
            self.namespace = ns;
        }
        if file.default_renderer.is_some() {
            self.default_renderer = file.default_renderer;
        }
        if let Some(privacy) = file.ipv6_privacy {
            self.ipv6_privacy = privacy;
        }
        if let Some(mode) = file.nm_management {
            self.nm_management = mode;
        }
        for path in file.always_serialize {
            if !self.always_serialize.contains(&path) {
                self.always_serialize.push(path);
            }
        }
    }

    /// `<root>/<tier>/<namespace>`.
    pub fn tier_dir(&self, tier: &str) -> PathBuf {
        self.root.join(tier).join(&self.namespace)
    }

    /// `<root>/<relative>`, with `relative` given without a leading slash.
    pub fn output_path(&self, relative: &str) -> PathBuf {
        self.root.join(relative.trim_start_matches('/'))
    }
}

fn parse_context(raw: &str) -> std::result::Result<ContextFile, toml::de::Error> {
    toml::from_str(raw)
}

fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, column)
}
