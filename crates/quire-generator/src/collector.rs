//! Content collection.
//!
//! Reads and parses every discovered content file into a [`PageTemplate`].

use std::{fs, path::PathBuf};

use quire_core::{CoreError, PageTemplate, TemplateKind, derive_url, parse_frontmatter};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::discover::SourceEntry;

/// Content collection errors.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// A content file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Header or path problem attributed to a file.
    #[error(transparent)]
    Content(#[from] CoreError),
}

/// Result type for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Parses content files into page templates.
#[derive(Debug, Default)]
pub struct ContentCollector;

impl ContentCollector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse all content entries in parallel.
    ///
    /// The result keeps the order of `entries`. The first failure in that
    /// order is returned.
    pub fn collect(&self, entries: &[&SourceEntry]) -> Result<Vec<PageTemplate>> {
        info!(count = entries.len(), "parsing content files");

        let templates = entries
            .par_iter()
            .map(|entry| self.parse_entry(entry))
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let dynamic = templates
            .iter()
            .filter(|t| matches!(t.kind(), TemplateKind::Dynamic { .. }))
            .count();
        info!(templates = templates.len(), dynamic, "content collection complete");
        Ok(templates)
    }

    /// Parse a single content file.
    pub fn parse_entry(&self, entry: &SourceEntry) -> Result<PageTemplate> {
        debug!(path = %entry.relative.display(), "parsing file");

        let raw = fs::read_to_string(&entry.path).map_err(|source| CollectorError::Read {
            path: entry.relative.clone(),
            source,
        })?;
        let url = derive_url(&entry.relative)?;
        let (fields, body) = parse_frontmatter(&raw, &entry.relative)?;

        if url.kind == TemplateKind::Ordinary {
            fields.validate(&entry.relative)?;
        }

        Ok(PageTemplate {
            source: entry.relative.clone(),
            url,
            fields,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::discover::ContentDiscoverer;

    fn collect(root: &Path) -> Result<Vec<PageTemplate>> {
        let discovery = ContentDiscoverer::new(root).discover().expect("discover");
        let entries: Vec<_> = discovery.content().collect();
        ContentCollector::new().collect(&entries)
    }

    #[test]
    fn test_collect_templates() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("blog")).expect("mkdir");
        fs::write(root.join("index.md"), "---\ntitle: Home\n---\nWelcome").expect("write");
        fs::write(
            root.join("blog/[tag].md"),
            "---\ntag: [rust, web]\n---\nTagged {{ tag }}",
        )
        .expect("write");

        let templates = collect(root).expect("collect");

        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].url.url, "/blog/[tag]");
        assert_eq!(
            templates[0].kind(),
            &TemplateKind::Dynamic {
                param: "tag".to_string()
            }
        );
        assert_eq!(templates[1].url.url, "/");
        assert_eq!(templates[1].body, "Welcome");
    }

    #[test]
    fn test_missing_title_is_fatal_for_ordinary_pages() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("about.md"), "---\nauthor: me\n---\nbody").expect("write");

        let err = collect(dir.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("about.md"));
        assert!(msg.contains("title is required"));
    }

    #[test]
    fn test_dynamic_template_does_not_need_title() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("[n].md"), "---\nn: [1, 2]\n---\n").expect("write");

        assert!(collect(dir.path()).is_ok());
    }

    #[test]
    fn test_malformed_header_is_attributed() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("broken.md"), "---\ntitle: [oops\n---\n").expect("write");

        let err = collect(dir.path()).unwrap_err();
        assert!(err.to_string().contains("broken.md"));
    }
}
