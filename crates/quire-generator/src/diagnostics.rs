//! Non-fatal build diagnostics.

use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
};

use quire_core::{
    FieldValue, Page,
    content::{DATE_FIELDS, date_field, invalid_date_field},
};
use serde::Serialize;

use crate::sitemap::LASTMOD_FIELDS;

/// A warning collected during the build and reported in the summary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Diagnostic {
    /// Source file the warning is attributed to, if any.
    pub source: Option<PathBuf>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(source: Option<PathBuf>, message: impl Into<String>) -> Self {
        let diagnostic = Self {
            source,
            message: message.into(),
        };
        tracing::warn!(source = ?diagnostic.source, "{}", diagnostic.message);
        diagnostic
    }

    pub fn for_file(source: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(Some(source.into()), message)
    }

    pub fn site(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(path) => write!(f, "{}: {}", path.display(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Warnings for pages whose first present date field cannot be read.
///
/// Such a page is undated in feeds and has no sitemap `<lastmod>`. Pages
/// expanded from one source are reported once.
pub fn date_diagnostics(pages: &[Page]) -> Vec<Diagnostic> {
    let mut seen: BTreeSet<(&Path, &str)> = BTreeSet::new();
    let mut diagnostics = Vec::new();

    for page in pages {
        for names in [DATE_FIELDS, LASTMOD_FIELDS] {
            let Some(field) = invalid_date_field(&page.fields, names) else {
                continue;
            };
            if !seen.insert((page.source.as_path(), field)) {
                continue;
            }
            let message = match date_field(&page.fields, names) {
                Some((_, FieldValue::Expr(_))) => format!(
                    "`{field}` is computed after the registry freezes and cannot date the page"
                ),
                _ => format!(
                    "`{field}` is not a valid date (expected RFC 3339, YYYY-MM-DD or \
                     YYYY-MM-DD HH:MM:SS); the page is treated as undated"
                ),
            };
            diagnostics.push(Diagnostic::for_file(&page.source, message));
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use quire_core::{Fields, PageKind};

    use super::*;

    fn page(source: &str, fields: &[(&str, &str)]) -> Page {
        Page {
            url: format!("/{}", source.trim_end_matches(".md")),
            kind: PageKind::Ordinary,
            source: PathBuf::from(source),
            expansion_index: 0,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), FieldValue::String(v.to_string())))
                .collect::<Fields>(),
            body: String::new(),
        }
    }

    #[test]
    fn test_unreadable_date_is_reported() {
        let pages = vec![
            page("blog/a.md", &[("date", "garbage"), ("published", "2024-01-01")]),
            page("blog/b.md", &[("date", "2024-01-02")]),
        ];

        let diagnostics = date_diagnostics(&pages);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].source.as_deref(), Some(Path::new("blog/a.md")));
        assert!(diagnostics[0].message.starts_with("`date` is not a valid date"));
    }

    #[test]
    fn test_unreadable_updated_is_reported() {
        let pages = vec![page("about.md", &[("updated", "soon"), ("date", "2024-01-02")])];

        let diagnostics = date_diagnostics(&pages);

        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.starts_with("`updated`"));
    }

    #[test]
    fn test_expansions_of_one_source_report_once() {
        let mut second = page("tags/[tag].md", &[("date", "never")]);
        second.expansion_index = 1;
        let pages = vec![page("tags/[tag].md", &[("date", "never")]), second];

        assert_eq!(date_diagnostics(&pages).len(), 1);
    }

    #[test]
    fn test_display_includes_source() {
        let d = Diagnostic::for_file("blog/post.md", "unknown highlighting language `foo`");
        assert_eq!(d.to_string(), "blog/post.md: unknown highlighting language `foo`");
        assert_eq!(Diagnostic::site("no sitemap").to_string(), "no sitemap");
    }
}
