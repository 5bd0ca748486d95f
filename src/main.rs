//! lsp-hub - Multi-server LSP client CLI
//!
//! Starts language servers on demand, runs one request against a file and
//! prints the answer as JSON.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lsp_hub::app::App;
use lsp_hub::cli::output::{error_value, print_json};
use lsp_hub::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // Quiet by default; RUST_LOG wins over -v
    let default_filter = if cli.verbose {
        "lsp_hub=debug"
    } else {
        "lsp_hub=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            print_json(&error_value(&format!("Failed to create runtime: {}", e)));
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(cli)) {
        print_json(&error_value(&format!("{:#}", e)));
        std::process::exit(2);
    }
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let app = App::new(cli.config.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize: {}", e))?;

    let needs_server = cli.command.needs_server();
    let result = execute_command(cli.command, &app).await;

    if needs_server {
        app.shutdown().await;
    }
    result
}

async fn execute_command(command: Commands, app: &App) -> anyhow::Result<()> {
    use lsp_hub::cli::commands;

    match command {
        Commands::Servers(args) => commands::servers::execute(args, app),

        // Document operations (LSP-based)
        Commands::Diagnostics(args) => commands::diagnostics::execute(args, app).await,
        Commands::Hover(args) => commands::hover::execute(args, app).await,
        Commands::Definition(args) => commands::find::definition(args, app).await,
        Commands::References(args) => commands::find::references(args, app).await,
        Commands::Symbols(args) => commands::symbols::execute(args, app).await,
        Commands::Complete(args) => commands::complete::execute(args, app).await,
        Commands::Format(args) => commands::format::execute(args, app).await,
    }
}
