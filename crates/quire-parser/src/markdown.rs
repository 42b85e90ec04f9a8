//! Markdown renderer using pulldown-cmark.

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};

use crate::syntax::{HighlightWarning, SyntaxHighlighter};

/// HTML produced from one markdown document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownOutput {
    pub html: String,
    /// Fenced code blocks rendered without highlighting, in document order.
    pub highlight_warnings: Vec<HighlightWarning>,
}

/// Markdown renderer with optional syntax highlighting.
#[derive(Debug)]
pub struct MarkdownParser {
    highlighter: Option<SyntaxHighlighter>,
    options: Options,
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownParser {
    /// Create a renderer without highlighting.
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self {
            highlighter: None,
            options,
        }
    }

    /// Create a renderer that highlights fenced code blocks.
    pub fn with_highlighter(highlighter: SyntaxHighlighter) -> Self {
        Self {
            highlighter: Some(highlighter),
            ..Self::new()
        }
    }

    pub fn highlighter(&self) -> Option<&SyntaxHighlighter> {
        self.highlighter.as_ref()
    }

    /// Render markdown to HTML.
    pub fn render_markdown(&self, content: &str) -> MarkdownOutput {
        let parser = Parser::new_ext(content, self.options);
        let Some(highlighter) = &self.highlighter else {
            let mut out = String::with_capacity(content.len() * 3 / 2);
            html::push_html(&mut out, parser);
            return MarkdownOutput {
                html: out,
                highlight_warnings: Vec::new(),
            };
        };

        let mut highlight_warnings = Vec::new();
        let mut events = Vec::new();
        let mut code_block: Option<(Option<String>, String)> = None;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code_block = Some((lang, String::new()));
                }
                Event::Text(text) if code_block.is_some() => {
                    if let Some((_, buffer)) = code_block.as_mut() {
                        buffer.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, buffer)) = code_block.take() {
                        let highlighted = highlighter.highlight(&buffer, lang.as_deref());
                        highlight_warnings.extend(highlighted.warning);
                        events.push(Event::Html(CowStr::from(highlighted.html)));
                    }
                }
                other => events.push(other),
            }
        }

        let mut out = String::with_capacity(content.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());
        MarkdownOutput {
            html: out,
            highlight_warnings,
        }
    }
}
