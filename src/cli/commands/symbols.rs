//! Document symbols command implementation

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::app::App;
use crate::cli::location::resolve_file;
use crate::cli::response::{SymbolOutput, SymbolsResponse};

#[derive(Args, Debug)]
pub struct SymbolsArgs {
    /// File path
    pub file: PathBuf,
}

pub async fn execute(args: SymbolsArgs, app: &App) -> Result<()> {
    let ctx = &app.output;
    let file = resolve_file(&args.file, app.root())?;

    let symbols = app.lsp.document_symbols(&file).await?;
    ctx.print_success(SymbolsResponse {
        file: ctx.relative_path(&file),
        count: symbols.iter().map(|s| s.count()).sum(),
        symbols: symbols.iter().map(SymbolOutput::from).collect(),
    });
    Ok(())
}
