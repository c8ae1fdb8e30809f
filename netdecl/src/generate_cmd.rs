use anyhow::Result;
use netdecl::context::EngineContext;
use netdecl::render::{generate, render};

use crate::cli::GenerateArgs;
use crate::report::{engine_error, render_ok};

pub fn run_generate(ctx: &EngineContext, args: GenerateArgs) -> Result<()> {
    let state = crate::load_state(ctx).map_err(engine_error)?;

    if args.dry_run {
        let tree = render(&state, ctx).map_err(engine_error)?;
        for path in tree.paths() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let out = args.output.as_deref().unwrap_or(&ctx.root);
    let written = generate(&state, ctx, out).map_err(engine_error)?;
    println!(
        "{}",
        render_ok(&format!(
            "{} devices, {written} files under {}",
            state.len(),
            out.display()
        ))
    );
    Ok(())
}
