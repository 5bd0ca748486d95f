//! CLI module for lsp-hub
//!
//! Provides command-line interface using clap derive macros.

pub mod commands;
pub mod location;
pub mod output;
pub mod response;

pub use location::ParsedLocation;
pub use output::OutputContext;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{
    complete::CompleteArgs, diagnostics::DiagnosticsArgs, find::LocationArgs,
    format::FormatArgs, hover::HoverArgs, servers::ServersArgs, symbols::SymbolsArgs,
};

const LONG_ABOUT: &str = r#"
lsp-hub - drive language servers from the command line

Starts the configured language server for a file on demand, opens the
document, runs one request and prints the answer as JSON.

EXAMPLES:
  lsp-hub servers
  lsp-hub diagnostics src/main.rs
  lsp-hub hover src/main.rs:10:5
  lsp-hub definition src/api.rs:25:10
  lsp-hub complete src/app.py:3:8 --limit 20

Servers are configured in ~/.config/lsp-hub/config.toml and
<project>/.lsp-hub/config.toml.
"#;

#[derive(Parser, Debug)]
#[command(name = "lsp-hub")]
#[command(author, version, about, long_about = LONG_ABOUT)]
#[command(propagate_version = true)]
#[command(after_help = "Use 'lsp-hub <COMMAND> --help' for more information about a command.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file to use instead of the global and project files
    #[arg(long, global = true, env = "LSP_HUB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output (debug logging on stderr)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List configured language servers and whether they are installed
    Servers(ServersArgs),

    /// Diagnostics the server publishes for a file
    Diagnostics(DiagnosticsArgs),

    /// Hover information at a position
    Hover(HoverArgs),

    /// Go to definition
    Definition(LocationArgs),

    /// Find references
    References(LocationArgs),

    /// Document symbol outline
    Symbols(SymbolsArgs),

    /// Completion candidates at a position
    Complete(CompleteArgs),

    /// Formatting edits for a file (the file is not modified)
    Format(FormatArgs),
}

impl Commands {
    /// Whether the command talks to a language server
    pub fn needs_server(&self) -> bool {
        !matches!(self, Self::Servers(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "lsp-hub",
            "hover",
            "src/main.bas:3:4",
            "--config",
            "/tmp/hub.toml",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/hub.toml")));
        assert!(matches!(cli.command, Commands::Hover(ref a) if a.location == "src/main.bas:3:4"));
    }

    #[test]
    fn test_parse_references_flags() {
        let cli =
            Cli::try_parse_from(["lsp-hub", "references", "a.bas:1:1", "--no-declaration"]).unwrap();
        match cli.command {
            Commands::References(args) => assert!(args.no_declaration),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_servers_needs_no_server() {
        let cli = Cli::try_parse_from(["lsp-hub", "servers"]).unwrap();
        assert!(!cli.command.needs_server());
        let cli = Cli::try_parse_from(["lsp-hub", "symbols", "a.bas"]).unwrap();
        assert!(cli.command.needs_server());
    }

    #[test]
    fn test_format_defaults() {
        let cli = Cli::try_parse_from(["lsp-hub", "format", "a.bas"]).unwrap();
        match cli.command {
            Commands::Format(args) => {
                assert_eq!(args.tab_size, 4);
                assert!(!args.use_tabs);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
