use anyhow::Result;
use netdecl::context::EngineContext;
use netdecl::import::{import_file, import_to_hierarchy};
use netdecl::model::GlobalSettings;
use netdecl::serialize::definitions_to_yaml;

use crate::cli::ImportArgs;
use crate::report::{engine_error, render_written};

pub fn run_import(ctx: &EngineContext, args: ImportArgs) -> Result<()> {
    if args.stdout {
        let defs = args
            .files
            .iter()
            .map(|file| import_file(file))
            .collect::<netdecl::Result<Vec<_>>>()
            .map_err(engine_error)?;
        let globals = GlobalSettings {
            version: Some(2),
            ..GlobalSettings::default()
        };
        let text = definitions_to_yaml(&defs, &globals, &[]).map_err(engine_error)?;
        print!("{text}");
        return Ok(());
    }

    for file in &args.files {
        let path = import_to_hierarchy(ctx, file).map_err(engine_error)?;
        println!("{}", render_written(&path));
    }
    Ok(())
}
