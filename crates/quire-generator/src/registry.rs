//! Page registry.
//!
//! [`FrozenRegistry`] owns every resolved page once expansion is complete.
//! It is built in one pass and exposes read-only queries: lookup by URL,
//! section membership ("within"), tags, sorting by an arbitrary field and
//! previous/next navigation on a numeric field.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    path::PathBuf,
};

use quire_core::{FieldValue, Page, content::section_prefix};
use thiserror::Error;
use tracing::info;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two pages resolved to the same URL.
    #[error("URL collision on {url}: produced by both {} and {}", first.display(), second.display())]
    Collision {
        url: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Immutable collection of all pages of a build.
#[derive(Debug, Default)]
pub struct FrozenRegistry {
    pages: Vec<Page>,
    by_url: HashMap<String, usize>,
    /// Section prefix (no trailing slash, `/` for root) to the pages strictly under it.
    by_prefix: HashMap<String, Vec<usize>>,
    by_tag: BTreeMap<String, Vec<usize>>,
}

impl FrozenRegistry {
    /// Take ownership of all pages and build the indices.
    ///
    /// Pages are ordered by source path, then expansion index, so queries are
    /// deterministic regardless of the order the pages were produced in.
    pub fn freeze(mut pages: Vec<Page>) -> Result<Self> {
        pages.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then(a.expansion_index.cmp(&b.expansion_index))
        });

        let mut by_url = HashMap::with_capacity(pages.len());
        let mut by_prefix: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_tag: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (idx, page) in pages.iter().enumerate() {
            if let Some(&existing) = by_url.get(&page.url) {
                let first: &Page = &pages[existing];
                return Err(RegistryError::Collision {
                    url: page.url.clone(),
                    first: first.source.clone(),
                    second: page.source.clone(),
                });
            }
            by_url.insert(page.url.clone(), idx);

            if page.kind.is_not_found() {
                continue;
            }

            for prefix in ancestors(&page.url) {
                by_prefix.entry(prefix).or_default().push(idx);
            }

            for tag in page.fields.tags() {
                let bucket = by_tag.entry(tag.to_string()).or_default();
                if bucket.last() != Some(&idx) {
                    bucket.push(idx);
                }
            }
        }

        info!(pages = pages.len(), tags = by_tag.len(), "registry frozen");
        Ok(Self {
            pages,
            by_url,
            by_prefix,
            by_tag,
        })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// All pages in registry order, including the not-found page.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn index_of(&self, url: &str) -> Option<usize> {
        self.by_url.get(url).copied()
    }

    pub fn get(&self, url: &str) -> Option<&Page> {
        self.index_of(url).map(|i| &self.pages[i])
    }

    /// Every page except the not-found page.
    pub fn all(&self) -> Vec<&Page> {
        self.pages.iter().filter(|p| !p.kind.is_not_found()).collect()
    }

    /// Pages strictly under `prefix`, excluding the section's own index page.
    ///
    /// Matching is segment aligned: `/blog` matches `/blog/post` but not `/blogroll`.
    pub fn within(&self, prefix: &str) -> Vec<&Page> {
        self.within_indices(prefix)
            .iter()
            .map(|&i| &self.pages[i])
            .collect()
    }

    pub fn within_indices(&self, prefix: &str) -> &[usize] {
        self.by_prefix
            .get(normalize_prefix(prefix))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Pages listing `tag` in their `tags` field, in registry order.
    pub fn tagged(&self, tag: &str) -> Vec<&Page> {
        self.tagged_indices(tag)
            .iter()
            .map(|&i| &self.pages[i])
            .collect()
    }

    pub fn tagged_indices(&self, tag: &str) -> &[usize] {
        self.by_tag.get(tag).map(Vec::as_slice).unwrap_or_default()
    }

    /// Distinct tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        self.by_tag.keys().map(String::as_str).collect()
    }

    /// Stable sort of `pages` by `field`. Pages without the field always come last.
    pub fn sorted_by<'a>(&self, pages: &mut Vec<&'a Page>, field: &str, descending: bool) {
        pages.sort_by(|a, b| compare_field(a.fields.get(field), b.fields.get(field), descending));
    }

    /// Sort registry indices the same way as [`Self::sorted_by`].
    pub fn sort_indices(&self, indices: &mut [usize], field: &str, descending: bool) {
        indices.sort_by(|&a, &b| {
            compare_field(
                self.pages[a].fields.get(field),
                self.pages[b].fields.get(field),
                descending,
            )
        });
    }

    /// Previous and next pages by a numeric `field` within the page's section.
    ///
    /// Previous is the page with value `k - 1`, next the page with `k + 1`.
    /// Gaps produce `None`; so does a value held by more than one page.
    pub fn neighbors(&self, url: &str, field: &str) -> (Option<&Page>, Option<&Page>) {
        let Some(page) = self.get(url) else {
            return (None, None);
        };
        let Some(k) = page.fields.get(field).and_then(FieldValue::as_f64) else {
            return (None, None);
        };
        let section = section_prefix(&page.url);
        (
            self.unique_with_value(section, field, k - 1.0),
            self.unique_with_value(section, field, k + 1.0),
        )
    }

    fn unique_with_value(&self, section: &str, field: &str, value: f64) -> Option<&Page> {
        let mut matches = self.pages.iter().filter(|p| {
            !p.kind.is_not_found()
                && section_prefix(&p.url) == section
                && p.fields.get(field).and_then(FieldValue::as_f64) == Some(value)
        });
        let found = matches.next()?;
        matches.next().is_none().then_some(found)
    }
}

fn normalize_prefix(prefix: &str) -> &str {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Section prefixes a URL lies strictly within.
fn ancestors(url: &str) -> Vec<String> {
    let trimmed = url.trim_end_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    let mut prefixes = vec!["/".to_string()];
    for (pos, _) in trimmed.match_indices('/').skip(1) {
        prefixes.push(trimmed[..pos].to_string());
    }
    prefixes
}

fn compare_field(a: Option<&FieldValue>, b: Option<&FieldValue>, descending: bool) -> Ordering {
    let a = a.filter(|v| !v.is_null() && !v.is_unresolved());
    let b = b.filter(|v| !v.is_null() && !v.is_unresolved());
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = compare_values(a, b);
            if descending { ord.reverse() } else { ord }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn type_rank(value: &FieldValue) -> u8 {
    match value {
        FieldValue::Bool(_) => 0,
        FieldValue::Integer(_) | FieldValue::Float(_) => 1,
        FieldValue::String(_) => 2,
        FieldValue::List(_) => 3,
        FieldValue::Map(_) => 4,
        FieldValue::Null | FieldValue::Expr(_) => 5,
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x.cmp(y),
        (FieldValue::String(x), FieldValue::String(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}
