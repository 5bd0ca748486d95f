//! Diagnostics command implementation

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::app::App;
use crate::cli::location::resolve_file;
use crate::cli::response::{DiagnosticOutput, DiagnosticsResponse};
use crate::models::diagnostic::{Diagnostic, DiagnosticSeverity};

#[derive(Args, Debug)]
pub struct DiagnosticsArgs {
    /// File path to check
    pub file: PathBuf,

    /// Filter by severity (error, warning, info, hint)
    #[arg(long, short = 's', value_delimiter = ',')]
    pub severity: Option<Vec<DiagnosticSeverity>>,

    /// Filter by source (e.g., rust-analyzer, eslint)
    #[arg(long)]
    pub source: Option<String>,
}

impl DiagnosticsArgs {
    fn matches(&self, diagnostic: &Diagnostic) -> bool {
        if let Some(ref filter) = self.severity
            && !filter.contains(&diagnostic.severity)
        {
            return false;
        }
        if let Some(ref source) = self.source
            && diagnostic.source.as_ref() != Some(source)
        {
            return false;
        }
        true
    }
}

pub async fn execute(args: DiagnosticsArgs, app: &App) -> Result<()> {
    let ctx = &app.output;
    let file = resolve_file(&args.file, app.root())?;

    let published = app.lsp.diagnostics(&file).await?;
    let diagnostics: Vec<DiagnosticOutput> = published
        .diagnostics
        .iter()
        .filter(|d| args.matches(d))
        .map(DiagnosticOutput::from)
        .collect();

    ctx.print_success(DiagnosticsResponse {
        file: ctx.relative_path(&file),
        language: published.language_id,
        count: diagnostics.len(),
        diagnostics,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lsp::Range;

    fn diagnostic(severity: DiagnosticSeverity, source: &str) -> Diagnostic {
        Diagnostic {
            range: Range::default(),
            severity,
            code: None,
            source: Some(source.to_string()),
            message: "x".to_string(),
        }
    }

    #[test]
    fn test_filters() {
        let args = DiagnosticsArgs {
            file: PathBuf::from("a.bas"),
            severity: Some(vec![DiagnosticSeverity::Error]),
            source: Some("basic-lint".to_string()),
        };
        assert!(args.matches(&diagnostic(DiagnosticSeverity::Error, "basic-lint")));
        assert!(!args.matches(&diagnostic(DiagnosticSeverity::Warning, "basic-lint")));
        assert!(!args.matches(&diagnostic(DiagnosticSeverity::Error, "fake-ls")));

        let open = DiagnosticsArgs {
            file: PathBuf::from("a.bas"),
            severity: None,
            source: None,
        };
        assert!(open.matches(&diagnostic(DiagnosticSeverity::Hint, "fake-ls")));
    }
}
