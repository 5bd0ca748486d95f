//! Definition and references commands

use anyhow::Result;
use clap::Args;

use crate::app::App;
use crate::cli::ParsedLocation;
use crate::cli::response::LocationsResponse;

#[derive(Args, Debug)]
pub struct LocationArgs {
    /// File path with position (file:line:column)
    pub location: String,

    /// References only: leave out the declaration itself
    #[arg(long)]
    pub no_declaration: bool,
}

pub async fn definition(args: LocationArgs, app: &App) -> Result<()> {
    let loc = ParsedLocation::parse(&args.location)?.resolve(app.root())?;
    let locations = app.lsp.definition(&loc.file, loc.position()).await?;

    app.output
        .print_success(LocationsResponse::new(&locations, app.root()));
    Ok(())
}

pub async fn references(args: LocationArgs, app: &App) -> Result<()> {
    let loc = ParsedLocation::parse(&args.location)?.resolve(app.root())?;
    let locations = app
        .lsp
        .references(&loc.file, loc.position(), !args.no_declaration)
        .await?;

    app.output
        .print_success(LocationsResponse::new(&locations, app.root()));
    Ok(())
}
