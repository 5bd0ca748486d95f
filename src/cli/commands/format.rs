//! Format command implementation
//!
//! Prints the edits the server proposes; the file itself is left untouched.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::app::App;
use crate::cli::location::resolve_file;
use crate::cli::response::{FormatResponse, TextEditOutput};

#[derive(Args, Debug)]
pub struct FormatArgs {
    /// File path
    pub file: PathBuf,

    #[arg(long, default_value = "4")]
    pub tab_size: u32,

    /// Indent with tabs instead of spaces
    #[arg(long)]
    pub use_tabs: bool,
}

pub async fn execute(args: FormatArgs, app: &App) -> Result<()> {
    let ctx = &app.output;
    let file = resolve_file(&args.file, app.root())?;

    let edits = app
        .lsp
        .formatting(&file, args.tab_size, !args.use_tabs)
        .await?;
    ctx.print_success(FormatResponse {
        file: ctx.relative_path(&file),
        count: edits.len(),
        edits: edits.iter().map(TextEditOutput::from).collect(),
    });
    Ok(())
}
