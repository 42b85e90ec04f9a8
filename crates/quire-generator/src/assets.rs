//! Static assets and cache busting.
//!
//! Static files are passed through to the output unchanged. Any asset named
//! in a `cache_bust(path=...)` call is additionally published under a name
//! carrying a hash of its bytes, so identical input always yields the same
//! filename.

use std::{
    collections::BTreeMap,
    fs,
    path::{Component, Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::discover::SourceEntry;

/// Hex digits of the content hash kept in busted filenames.
pub const HASH_LEN: usize = 8;

/// Asset processing errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// `cache_bust` named a path that is neither a static asset nor a generated stylesheet.
    #[error("cache_bust: asset not found: {0}")]
    Missing(String),

    /// The path escapes the site root or is empty.
    #[error("cache_bust: invalid asset path: {0}")]
    InvalidPath(String),

    /// A static asset could not be read.
    #[error("failed to read asset {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

/// A static file copied to the output at its own relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAsset {
    /// Site URL, e.g. `/img/logo.png`.
    pub url: String,
    /// Absolute path of the source file.
    pub source: PathBuf,
}

impl StaticAsset {
    pub fn from_entry(entry: &SourceEntry) -> Self {
        Self {
            url: url_for_relative(&entry.relative),
            source: entry.path.clone(),
        }
    }
}

/// `img/logo.png` → `/img/logo.png`.
pub fn url_for_relative(relative: &Path) -> String {
    let joined = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

/// First [`HASH_LEN`] hex digits of the SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_LEN);
    hash
}

/// Insert `hash` before the extension of the last URL segment.
///
/// `/theme.css` → `/theme.<hash>.css`; `/LICENSE` → `/LICENSE.<hash>`.
pub fn busted_url(url: &str, hash: &str) -> String {
    let (dir, file) = url.rsplit_once('/').unwrap_or(("", url));
    let name = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.{hash}.{ext}"),
        _ => format!("{file}.{hash}"),
    };
    format!("{dir}/{name}")
}

/// Mapping from original asset URL to its busted URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetManifest {
    assets: BTreeMap<String, String>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, original: impl Into<String>, busted: impl Into<String>) {
        self.assets.insert(original.into(), busted.into());
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.assets.get(original).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Computes busted names on demand and remembers which assets were requested.
///
/// Generated stylesheets (`/theme.css`, `/highlight.css`) are registered with
/// their final bytes; static files are read when first busted. Shared between
/// rendering threads.
#[derive(Debug, Default)]
pub struct CacheBuster {
    generated: BTreeMap<String, Vec<u8>>,
    statics: BTreeMap<String, PathBuf>,
    manifest: Mutex<AssetManifest>,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generated asset with its output bytes.
    #[must_use]
    pub fn with_generated(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.generated.insert(url.into(), bytes.into());
        self
    }

    /// Register the static assets that may be busted.
    #[must_use]
    pub fn with_statics<'a>(mut self, assets: impl IntoIterator<Item = &'a StaticAsset>) -> Self {
        self.statics
            .extend(assets.into_iter().map(|a| (a.url.clone(), a.source.clone())));
        self
    }

    /// Busted URL for `path`, recording it in the manifest.
    pub fn bust(&self, path: &str) -> Result<String> {
        let url = normalize(path)?;
        if let Some(busted) = self.lock().get(&url) {
            return Ok(busted.to_string());
        }

        let hash = match (self.generated.get(&url), self.statics.get(&url)) {
            (Some(bytes), _) => content_hash(bytes),
            (None, Some(source)) => {
                let bytes = fs::read(source).map_err(|source_err| AssetError::Read {
                    path: source.clone(),
                    source: source_err,
                })?;
                content_hash(&bytes)
            }
            (None, None) => return Err(AssetError::Missing(url)),
        };

        let busted = busted_url(&url, &hash);
        debug!(asset = %url, busted = %busted, "cache busted");
        self.lock().add(url, busted.clone());
        Ok(busted)
    }

    /// Snapshot of every asset busted so far.
    pub fn manifest(&self) -> AssetManifest {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AssetManifest> {
        self.manifest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalize(path: &str) -> Result<String> {
    let trimmed = path.trim().split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    if segments.is_empty() || segments.contains(&"..") {
        return Err(AssetError::InvalidPath(path.to_string()));
    }
    Ok(format!("/{}", segments.join("/")))
}
