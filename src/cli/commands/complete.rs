//! Completion command implementation

use anyhow::Result;
use clap::Args;

use crate::app::App;
use crate::cli::ParsedLocation;
use crate::cli::response::{CompletionOutput, CompletionResponse};

#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// File path with position (file:line:column)
    pub location: String,

    /// Maximum number of items to print
    #[arg(long, default_value = "50")]
    pub limit: usize,
}

pub async fn execute(args: CompleteArgs, app: &App) -> Result<()> {
    let loc = ParsedLocation::parse(&args.location)?.resolve(app.root())?;

    let list = app.lsp.completion(&loc.file, loc.position()).await?;
    let items: Vec<CompletionOutput> = list
        .items
        .iter()
        .take(args.limit)
        .map(CompletionOutput::from)
        .collect();

    app.output.print_success(CompletionResponse {
        // Truncated output is incomplete too
        is_incomplete: list.is_incomplete || list.items.len() > items.len(),
        count: items.len(),
        items,
    });
    Ok(())
}
