//! Servers command implementation
//!
//! Lists built-in and user-configured language servers. Nothing is started.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::services::ServerStatus;

#[derive(Args, Debug)]
pub struct ServersArgs {
    /// Only show servers whose command is on PATH
    #[arg(long)]
    pub installed: bool,
}

#[derive(Serialize)]
struct ServersResponse {
    count: usize,
    servers: Vec<ServerEntry>,
}

#[derive(Serialize)]
struct ServerEntry {
    #[serde(flatten)]
    status: ServerStatus,
    /// Defined in a settings file rather than built in
    user: bool,
}

pub fn execute(args: ServersArgs, app: &App) -> Result<()> {
    let servers: Vec<ServerEntry> = app
        .lsp
        .servers()
        .into_iter()
        .filter(|s| !args.installed || s.installed)
        .map(|status| ServerEntry {
            user: app.config().servers.iter().any(|c| c.id == status.id),
            status,
        })
        .collect();

    app.output.print_success(ServersResponse {
        count: servers.len(),
        servers,
    });
    Ok(())
}
