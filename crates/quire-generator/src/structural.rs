//! Structural set loading.
//!
//! Reads the shared fragments under `_/`: header, nav, footer, the optional
//! content wrapper, theme stylesheet, layout override and snippets.

use std::{
    fs,
    path::{Path, PathBuf},
};

use quire_core::{CoreError, FieldValue, parse_frontmatter};
use thiserror::Error;
use tracing::{debug, info};

use crate::discover::SourceEntry;

/// Structural set errors.
#[derive(Debug, Error)]
pub enum StructuralError {
    /// A structural file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snippet file name that cannot be used as a function name.
    #[error("invalid snippet name in {path}: `{name}` must be an identifier")]
    InvalidSnippetName { path: PathBuf, name: String },

    /// Snippet frontmatter is malformed.
    #[error(transparent)]
    Frontmatter(#[from] CoreError),
}

/// Result type for structural loading.
pub type Result<T> = std::result::Result<T, StructuralError>;

/// A reusable fragment callable from any template.
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub name: String,
    /// Declared keyword parameters and their defaults, in declaration order.
    pub params: Vec<(String, FieldValue)>,
    /// Template and markdown text of the snippet.
    pub body: String,
    pub source: PathBuf,
}

impl Snippet {
    /// Name under which the body is registered with the template engine.
    pub fn template_name(&self) -> String {
        format!("_/macros/{}.md", self.name)
    }
}

/// Shared fragments, loaded once per build and read by every page render.
#[derive(Debug, Clone, Default)]
pub struct StructuralSet {
    pub header: Option<String>,
    pub nav: Option<String>,
    pub footer: Option<String>,
    pub content_wrapper: Option<String>,
    pub theme_css: Option<String>,
    pub layout: Option<String>,
    pub snippets: Vec<Snippet>,
}

impl StructuralSet {
    /// Load the set from discovered structural entries.
    pub fn load(entries: &[&SourceEntry]) -> Result<Self> {
        let mut set = Self::default();

        for entry in entries {
            let rel = entry.relative.to_string_lossy().replace('\\', "/");
            let slot = match rel.as_str() {
                "_/header.md" => &mut set.header,
                "_/nav.md" => &mut set.nav,
                "_/footer.md" => &mut set.footer,
                "_/content.md" => &mut set.content_wrapper,
                "_/theme.css" => &mut set.theme_css,
                "_/layout.html" => &mut set.layout,
                _ => {
                    if let Some(name) = rel
                        .strip_prefix("_/macros/")
                        .and_then(|n| n.strip_suffix(".md"))
                        .filter(|n| !n.contains('/'))
                    {
                        set.snippets.push(load_snippet(entry, name)?);
                    } else {
                        debug!(path = %rel, "ignoring structural file");
                    }
                    continue;
                }
            };
            *slot = Some(read(&entry.path, &entry.relative)?);
        }

        set.snippets.sort_by(|a, b| a.name.cmp(&b.name));
        info!(
            header = set.header.is_some(),
            nav = set.nav.is_some(),
            footer = set.footer.is_some(),
            wrapper = set.content_wrapper.is_some(),
            snippets = set.snippets.len(),
            "structural set loaded"
        );
        Ok(set)
    }
}

fn read(path: &Path, relative: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| StructuralError::Read {
        path: relative.to_path_buf(),
        source,
    })
}

fn load_snippet(entry: &SourceEntry, name: &str) -> Result<Snippet> {
    if !is_identifier(name) {
        return Err(StructuralError::InvalidSnippetName {
            path: entry.relative.clone(),
            name: name.to_string(),
        });
    }

    let raw = read(&entry.path, &entry.relative)?;
    let (fields, body) = parse_frontmatter(&raw, &entry.relative)?;
    let params = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    Ok(Snippet {
        name: name.to_string(),
        params,
        body,
        source: entry.relative.clone(),
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::discover::ContentDiscoverer;

    fn load(root: &Path) -> Result<StructuralSet> {
        let discovery = ContentDiscoverer::new(root).discover().expect("discover");
        let entries: Vec<_> = discovery.structural().collect();
        StructuralSet::load(&entries)
    }

    #[test]
    fn test_load_fragments_and_snippets() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("_/macros")).expect("mkdir");
        fs::write(root.join("_/header.md"), "# {{ site.title }}").expect("write");
        fs::write(root.join("_/theme.css"), "body { color: red; }").expect("write");
        fs::write(
            root.join("_/macros/card.md"),
            "---\ntitle: Untitled\nwide: false\n---\n<div class=\"card\">{{ title }}</div>",
        )
        .expect("write");
        fs::write(root.join("_/notes.txt"), "ignored").expect("write");

        let set = load(root).expect("load");

        assert_eq!(set.header.as_deref(), Some("# {{ site.title }}"));
        assert!(set.nav.is_none());
        assert!(set.content_wrapper.is_none());
        assert!(set.theme_css.is_some());
        assert_eq!(set.snippets.len(), 1);

        let card = &set.snippets[0];
        assert_eq!(card.name, "card");
        assert_eq!(card.template_name(), "_/macros/card.md");
        assert_eq!(
            card.params,
            vec![
                ("title".to_string(), FieldValue::String("Untitled".into())),
                ("wide".to_string(), FieldValue::Bool(false)),
            ]
        );
        assert!(card.body.starts_with("<div class=\"card\">"));
    }

    #[test]
    fn test_invalid_snippet_name() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir_all(dir.path().join("_/macros")).expect("mkdir");
        fs::write(dir.path().join("_/macros/my-card.md"), "x").expect("write");

        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, StructuralError::InvalidSnippetName { .. }));
    }
}
