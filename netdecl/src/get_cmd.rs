use anyhow::{Context, Result};
use netdecl::context::EngineContext;
use netdecl::patch::split_path;
use netdecl::serialize::state_document;
use netdecl_doc::{write, DocNode};

use crate::cli::GetArgs;
use crate::report::engine_error;

pub fn run_get(ctx: &EngineContext, args: GetArgs) -> Result<()> {
    let state = crate::load_state(ctx).map_err(engine_error)?;
    let doc = state_document(&state, ctx);

    let node = match &args.key {
        Some(key) => {
            let path = split_path(key);
            let path: Vec<&str> = path.iter().map(String::as_str).collect();
            doc.get_path(&path).cloned().unwrap_or_else(DocNode::null)
        }
        None => doc,
    };
    let text = write(&node).context("failed to serialize configuration")?;
    print!("{text}");
    Ok(())
}
