//! `FILE:LINE[:COL]` arguments

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::models::lsp::Position;

/// A 1-indexed position in a file, as typed by the user
#[derive(Debug, Clone)]
pub struct ParsedLocation {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl ParsedLocation {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("Location cannot be empty");
        }

        let (file_part, rest) = split_path_and_position(input)?;
        let (line, column) = parse_position(rest)?;

        Ok(Self {
            file: PathBuf::from(file_part),
            line,
            column,
        })
    }

    /// Resolve the file against `root` and check that it exists
    pub fn resolve(mut self, root: &Path) -> Result<Self> {
        self.file = resolve_file(&self.file, root)?;
        Ok(self)
    }

    /// LSP (0-indexed) position
    pub fn position(&self) -> Position {
        Position::from_display(self.line, self.column)
    }
}

impl std::fmt::Display for ParsedLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// Absolute, canonical path of an existing file
pub fn resolve_file(file: &Path, root: &Path) -> Result<PathBuf> {
    let joined = if file.is_absolute() {
        file.to_path_buf()
    } else {
        root.join(file)
    };
    let canonical = joined
        .canonicalize()
        .with_context(|| format!("File not found: {}", file.display()))?;
    if !canonical.is_file() {
        bail!("Not a file: {}", file.display());
    }
    Ok(canonical)
}

/// Split at the first `:` followed by a digit, skipping a Windows drive prefix
fn split_path_and_position(input: &str) -> Result<(&str, &str)> {
    let bytes = input.as_bytes();
    let has_drive = bytes.len() > 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic();
    let search_start = if has_drive { 2 } else { 0 };

    for (offset, ch) in input[search_start..].char_indices() {
        if ch != ':' {
            continue;
        }
        let split = search_start + offset;
        match input[split + 1..].chars().next() {
            Some(c) if c.is_ascii_digit() => return Ok((&input[..split], &input[split + 1..])),
            Some('-') => bail!(
                "Invalid line number: negative values not allowed. Line numbers are 1-indexed.\nExample: src/main.bas:10:5"
            ),
            _ => {}
        }
    }

    bail!("Invalid location format. Expected: file:line[:column]\nExample: src/main.bas:10:5")
}

fn parse_position(rest: &str) -> Result<(u32, u32)> {
    let (line_str, column_str) = match rest.split_once(':') {
        Some((line, column)) => (line, Some(column)),
        None => (rest, None),
    };

    let line: u32 = line_str.parse().map_err(|_| {
        anyhow::anyhow!("Invalid line number '{}': must be a positive integer (1-indexed)", line_str)
    })?;
    let column: u32 = match column_str {
        Some(col) => col.parse().map_err(|_| {
            anyhow::anyhow!("Invalid column number '{}': must be a positive integer (1-indexed)", col)
        })?,
        None => 1,
    };

    if line == 0 {
        bail!("Line number must be >= 1 (got 0). Line numbers are 1-indexed.");
    }
    if column == 0 {
        bail!("Column number must be >= 1 (got 0). Column numbers are 1-indexed.");
    }

    Ok((line, column))
}
