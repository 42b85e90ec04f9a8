//! Content discovery.
//!
//! Walks the site root once and classifies every entry as content,
//! structural, static asset or directory.

use std::path::{Path, PathBuf};

use quire_core::{
    CoreError,
    config::CONFIG_FILE,
    content::{STRUCTURAL_DIR, is_content_extension},
};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// Failed to walk the source tree.
    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A path that cannot become part of the site.
    #[error(transparent)]
    Path(#[from] CoreError),
}

/// Result type for discovery.
pub type Result<T> = std::result::Result<T, DiscoverError>;

/// Classification of a discovered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A markdown file that becomes one or more pages.
    Content,
    /// A file under the structural directory.
    Structural,
    /// Any other file, copied through unchanged.
    Asset,
    Directory,
}

/// One file or directory found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: PathBuf,
    /// Path relative to the site root.
    pub relative: PathBuf,
    pub kind: EntryKind,
}

/// All entries found in one pass, in file-name order.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub entries: Vec<SourceEntry>,
}

impl Discovery {
    pub fn of_kind(&self, kind: EntryKind) -> impl Iterator<Item = &SourceEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    pub fn content(&self) -> impl Iterator<Item = &SourceEntry> {
        self.of_kind(EntryKind::Content)
    }

    pub fn structural(&self) -> impl Iterator<Item = &SourceEntry> {
        self.of_kind(EntryKind::Structural)
    }

    pub fn assets(&self) -> impl Iterator<Item = &SourceEntry> {
        self.of_kind(EntryKind::Asset)
    }
}

/// Walks a site root and classifies its files.
#[derive(Debug, Clone)]
pub struct ContentDiscoverer {
    root: PathBuf,
    excluded: Vec<PathBuf>,
}

impl ContentDiscoverer {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: Vec::new(),
        }
    }

    /// Skip a path under the root: the output directory when it sits inside
    /// the root, or a configuration file given by path.
    #[must_use]
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    /// Walk the tree.
    pub fn discover(&self) -> Result<Discovery> {
        info!(root = %self.root.display(), "discovering content");

        let mut entries = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name()) && !self.is_excluded(e.path()));

        for entry in walker {
            let entry = entry.map_err(|source| DiscoverError::Walk {
                root: self.root.clone(),
                source,
            })?;
            let path = entry.path().to_path_buf();
            let relative = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();

            if entry.file_type().is_dir() {
                check_directory_name(&relative)?;
                entries.push(SourceEntry {
                    path,
                    relative,
                    kind: EntryKind::Directory,
                });
                continue;
            }

            if relative == Path::new(CONFIG_FILE) {
                continue;
            }

            let kind = classify(&relative);
            debug!(path = %relative.display(), ?kind, "discovered");
            entries.push(SourceEntry {
                path,
                relative,
                kind,
            });
        }

        let discovery = Discovery { entries };
        info!(
            content = discovery.content().count(),
            structural = discovery.structural().count(),
            assets = discovery.assets().count(),
            "discovery complete"
        );
        Ok(discovery)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|excluded| path == excluded)
    }
}

/// Classify a file by its path relative to the site root.
pub fn classify(relative: &Path) -> EntryKind {
    if relative
        .components()
        .next()
        .is_some_and(|c| c.as_os_str() == STRUCTURAL_DIR)
    {
        return EntryKind::Structural;
    }
    match relative.extension().and_then(|e| e.to_str()) {
        Some(ext) if is_content_extension(ext) => EntryKind::Content,
        _ => EntryKind::Asset,
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

fn check_directory_name(relative: &Path) -> std::result::Result<(), CoreError> {
    let Some(name) = relative.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };
    if name.starts_with('[') && name.ends_with(']') {
        return Err(CoreError::url_derivation(
            relative,
            format!("directory `{name}` cannot be dynamic; only file names may use [param]"),
        ));
    }
    Ok(())
}
