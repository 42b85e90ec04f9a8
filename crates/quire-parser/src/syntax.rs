//! Syntax highlighting for code blocks.
//!
//! Output is class based so colors live in a separate `highlight.css`
//! generated from the same theme.

use syntect::{
    highlighting::ThemeSet,
    html::{ClassStyle, ClassedHTMLGenerator, css_for_theme_with_class_style},
    parsing::SyntaxSet,
    util::LinesWithEndings,
};
use thiserror::Error;

/// Prefix applied to every highlighting class.
pub const CLASS_PREFIX: &str = "hl-";

const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: CLASS_PREFIX };

/// Syntax highlighting errors.
#[derive(Debug, Error)]
pub enum SyntaxError {
    /// The configured theme does not exist.
    #[error("unknown syntax highlighting theme `{name}` (available: {available})")]
    UnknownTheme { name: String, available: String },

    /// Failed to generate highlighted output or theme CSS.
    #[error("syntax highlighting failed: {0}")]
    Highlight(#[from] syntect::Error),
}

/// Result of highlighting one code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlighted {
    pub html: String,
    /// Set when the block was emitted as plain text against its author's intent.
    pub warning: Option<HighlightWarning>,
}

/// Why a fenced block with a language was rendered without highlighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightWarning {
    /// The highlighter does not know the language.
    UnknownLanguage(String),
    /// The language is known but highlighting the block failed.
    Failed { lang: String, detail: String },
}

impl std::fmt::Display for HighlightWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLanguage(lang) => write!(f, "unrecognized highlighting language `{lang}`"),
            Self::Failed { lang, detail } => {
                write!(f, "highlighting `{lang}` failed: {detail}")
            }
        }
    }
}

/// Syntax highlighter using syntect.
#[derive(Debug)]
pub struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    theme: String,
}

impl Default for SyntaxHighlighter {
    fn default() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            theme: "base16-ocean.dark".to_string(),
        }
    }
}

impl SyntaxHighlighter {
    /// Create a new syntax highlighter with the specified theme.
    pub fn new(theme: &str) -> Result<Self, SyntaxError> {
        let mut highlighter = Self::default();
        if !highlighter.theme_set.themes.contains_key(theme) {
            return Err(SyntaxError::UnknownTheme {
                name: theme.to_string(),
                available: highlighter.available_themes().join(", "),
            });
        }
        highlighter.theme = theme.to_string();
        Ok(highlighter)
    }

    /// Get available theme names.
    pub fn available_themes(&self) -> Vec<&str> {
        self.theme_set.themes.keys().map(|s| s.as_str()).collect()
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    /// Highlight code with the given language.
    ///
    /// Unknown languages and blocks without a language are emitted as plain
    /// escaped `<pre><code>`.
    pub fn highlight(&self, code: &str, lang: Option<&str>) -> Highlighted {
        let Some(lang) = lang else {
            return Highlighted {
                html: plain_block(code, None),
                warning: None,
            };
        };

        let Some(syntax) = self.syntax_set.find_syntax_by_token(lang) else {
            return Highlighted {
                html: plain_block(code, Some(lang)),
                warning: Some(HighlightWarning::UnknownLanguage(lang.to_string())),
            };
        };

        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntax_set, CLASS_STYLE);
        let classed = LinesWithEndings::from(code)
            .try_for_each(|line| generator.parse_html_for_line_which_includes_newline(line))
            .map(|()| generator.finalize());
        classed_block(code, lang, classed)
    }

    /// Stylesheet for the configured theme, matching the classes emitted by [`Self::highlight`].
    pub fn theme_css(&self) -> Result<String, SyntaxError> {
        let theme = self
            .theme_set
            .themes
            .get(&self.theme)
            .ok_or_else(|| SyntaxError::UnknownTheme {
                name: self.theme.clone(),
                available: self.available_themes().join(", "),
            })?;
        Ok(css_for_theme_with_class_style(theme, CLASS_STYLE)?)
    }
}

/// Wrap classed output, falling back to a plain block when highlighting failed.
fn classed_block(code: &str, lang: &str, classed: Result<String, syntect::Error>) -> Highlighted {
    match classed {
        Ok(body) => Highlighted {
            html: format!(
                "<pre class=\"{CLASS_PREFIX}code\"><code class=\"language-{}\">{body}</code></pre>\n",
                html_escape(lang),
            ),
            warning: None,
        },
        Err(err) => Highlighted {
            html: plain_block(code, Some(lang)),
            warning: Some(HighlightWarning::Failed {
                lang: lang.to_string(),
                detail: err.to_string(),
            }),
        },
    }
}

fn plain_block(code: &str, lang: Option<&str>) -> String {
    let lang_class = lang
        .map(|l| format!(" class=\"language-{}\"", html_escape(l)))
        .unwrap_or_default();
    format!("<pre><code{lang_class}>{}</code></pre>\n", html_escape(code))
}

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_rust() {
        let highlighter = SyntaxHighlighter::default();
        let code = "fn main() {\n    println!(\"Hello\");\n}\n";
        let out = highlighter.highlight(code, Some("rust"));

        assert_eq!(out.warning, None);
        assert!(out.html.contains("<pre class=\"hl-code\""));
        assert!(out.html.contains("language-rust"));
        assert!(out.html.contains("hl-"));
        assert!(out.html.contains("main"));
    }

    #[test]
    fn test_highlight_unknown_language() {
        let highlighter = SyntaxHighlighter::default();
        let out = highlighter.highlight("some <code>", Some("unknown_lang_xyz"));

        assert_eq!(
            out.warning,
            Some(HighlightWarning::UnknownLanguage("unknown_lang_xyz".to_string()))
        );
        assert!(out.html.contains("some &lt;code&gt;"));
        assert!(out.html.contains("language-unknown_lang_xyz"));
    }

    #[test]
    fn test_highlight_no_language() {
        let highlighter = SyntaxHighlighter::default();
        let out = highlighter.highlight("plain text", None);

        assert_eq!(out.warning, None);
        assert_eq!(out.html, "<pre><code>plain text</code></pre>\n");
    }

    #[test]
    fn test_failed_highlighting_falls_back_with_warning() {
        let out = classed_block("a < b", "rust", Err(syntect::Error::from(std::fmt::Error)));

        assert_eq!(out.html, "<pre><code class=\"language-rust\">a &lt; b</code></pre>\n");
        let warning = out.warning.expect("warning");
        assert!(matches!(&warning, HighlightWarning::Failed { lang, .. } if lang == "rust"));
        assert!(warning.to_string().starts_with("highlighting `rust` failed"));
    }

    #[test]
    fn test_unknown_theme_rejected() {
        let err = SyntaxHighlighter::new("no-such-theme").unwrap_err();
        assert!(err.to_string().contains("no-such-theme"));
    }

    #[test]
    fn test_theme_css_uses_prefixed_classes() {
        let highlighter = SyntaxHighlighter::new("InspiredGitHub").expect("theme");
        let css = highlighter.theme_css().expect("css");
        assert!(css.contains(".hl-"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
        assert_eq!(html_escape("a & b"), "a &amp; b");
    }
}
