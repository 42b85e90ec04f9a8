//! Quire Parser Library
//!
//! Markdown rendering and syntax highlighting.

pub mod markdown;
pub mod syntax;

pub use markdown::{MarkdownOutput, MarkdownParser};
use quire_core::SyntaxHighlightingConfig;
pub use syntax::{HighlightWarning, Highlighted, SyntaxError, SyntaxHighlighter};
use thiserror::Error;

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    /// Syntax highlighter setup error.
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),
}

/// Result type for parser operations.
pub type Result<T> = std::result::Result<T, ParserError>;

/// Build the markdown renderer described by the highlighting configuration.
pub fn markdown_parser(config: &SyntaxHighlightingConfig) -> Result<MarkdownParser> {
    if !config.enabled {
        return Ok(MarkdownParser::new());
    }
    let highlighter = SyntaxHighlighter::new(&config.theme)?;
    Ok(MarkdownParser::with_highlighter(highlighter))
}
