use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use netdecl::context::EngineContext;

#[derive(Parser, Debug)]
#[command(name = "netdecl")]
#[command(about = "Compile declarative network configuration for networkd and NetworkManager")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Render the hierarchy into backend configuration under run/.
    Generate(GenerateArgs),
    /// Load, merge and check the hierarchy without writing anything.
    Validate(ValidateArgs),
    /// Print the merged configuration, or one subtree of it.
    Get(GetArgs),
    /// Change settings with `path=value` expressions and write them back.
    Set(SetArgs),
    /// Convert NetworkManager keyfile profiles into documents.
    Import(ImportArgs),
}

#[derive(clap::Args, Debug)]
pub struct GlobalArgs {
    /// Directory holding lib/, etc/ and run/.
    #[arg(long, global = true, default_value = "/")]
    pub root: PathBuf,
    /// TOML file overriding the built-in engine defaults.
    #[arg(long, global = true)]
    pub context: Option<PathBuf>,
    /// Directory name under each tier.
    #[arg(long, global = true)]
    pub namespace: Option<String>,
    /// Field path written as null when unset. Repeatable.
    #[arg(long = "always-serialize", global = true)]
    pub always_serialize: Vec<String>,
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Built-in defaults, then the context file, then flags.
    pub fn engine_context(&self) -> Result<EngineContext> {
        let mut ctx = match &self.context {
            Some(path) => EngineContext::load(&self.root, path)
                .with_context(|| format!("failed to load context {}", path.display()))?,
            None => EngineContext::new(&self.root),
        };
        if let Some(ns) = &self.namespace {
            ctx.namespace = ns.clone();
        }
        for path in &self.always_serialize {
            if !ctx.always_serialize.contains(path) {
                ctx.always_serialize.push(path.clone());
            }
        }
        Ok(ctx)
    }
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Write below this directory instead of the root.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// List the files that would be written.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Dotted path such as `ethernets.eth0.mtu`; the whole document if omitted.
    pub key: Option<String>,
}

#[derive(Parser, Debug)]
pub struct SetArgs {
    /// `path=value`; an empty or null value removes the setting.
    #[arg(required = true)]
    pub expressions: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Print the documents instead of writing them to etc/.
    #[arg(long)]
    pub stdout: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
