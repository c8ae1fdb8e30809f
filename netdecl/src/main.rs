use anyhow::Result;
use clap::Parser;
use netdecl::context::EngineContext;
use netdecl::state::State;
use tracing_subscriber::EnvFilter;

mod cli;
mod generate_cmd;
mod get_cmd;
mod import_cmd;
mod report;
mod set_cmd;
mod validate_cmd;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);
    let ctx = cli.global.engine_context()?;

    match cli.command {
        Command::Generate(args) => generate_cmd::run_generate(&ctx, args),
        Command::Validate(args) => validate_cmd::run_validate(&ctx, args),
        Command::Get(args) => get_cmd::run_get(&ctx, args),
        Command::Set(args) => set_cmd::run_set(&ctx, args),
        Command::Import(args) => import_cmd::run_import(&ctx, args),
    }
}

/// `RUST_LOG` wins; otherwise warnings, or debug with `-v`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the hierarchy, freeze it and run every check.
pub(crate) fn load_state(ctx: &EngineContext) -> netdecl::Result<State> {
    let mut parser = netdecl::parse::Parser::new();
    parser.load_hierarchy(ctx)?;
    let state = parser.freeze(ctx)?;
    netdecl::validate::validate(&state, ctx)?;
    Ok(state)
}
