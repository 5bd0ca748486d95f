//! Hover command implementation
//!
//! Get hover information (type, documentation) for a position.

use anyhow::Result;
use clap::Args;

use crate::app::App;
use crate::cli::ParsedLocation;
use crate::cli::response::HoverResponse;

#[derive(Args, Debug)]
pub struct HoverArgs {
    /// File path with position (file:line:column)
    pub location: String,
}

pub async fn execute(args: HoverArgs, app: &App) -> Result<()> {
    let ctx = &app.output;
    let loc = ParsedLocation::parse(&args.location)?.resolve(app.root())?;

    let response = match app.lsp.hover(&loc.file, loc.position()).await? {
        Some(hover) => HoverResponse {
            content: Some(hover.contents),
            message: None,
        },
        None => HoverResponse {
            content: None,
            message: Some("No hover information available".to_string()),
        },
    };
    ctx.print_success(response);
    Ok(())
}
