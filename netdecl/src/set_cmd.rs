use anyhow::Result;
use netdecl::context::EngineContext;
use netdecl::patch::{apply_to_documents, Patch};

use crate::cli::SetArgs;
use crate::report::{engine_error, render_written};

pub fn run_set(ctx: &EngineContext, args: SetArgs) -> Result<()> {
    let patches = args
        .expressions
        .iter()
        .map(|expr| Patch::parse(expr))
        .collect::<netdecl::Result<Vec<_>>>()
        .map_err(engine_error)?;

    let written = apply_to_documents(ctx, &patches).map_err(engine_error)?;
    for path in written {
        println!("{}", render_written(&path));
    }
    Ok(())
}
