//! Content types and URL derivation.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::{
    error::{CoreError, Result},
    frontmatter::{FieldValue, Fields},
};

/// Directory holding header, nav, footer, wrapper, theme and snippets.
pub const STRUCTURAL_DIR: &str = "_";

/// File stem that collapses to its directory's URL.
pub const INDEX_STEM: &str = "index";

/// Bracket name reserved for the not-found page.
pub const NOT_FOUND_PARAM: &str = "404";

/// URL of the not-found page.
pub const NOT_FOUND_URL: &str = "/404";

/// Frontmatter fields consulted, in order, for a page's date.
pub const DATE_FIELDS: &[&str] = &["date", "published", "created", "pubDate"];

/// Whether a file extension marks a content file.
pub fn is_content_extension(ext: &str) -> bool {
    matches!(ext.to_ascii_lowercase().as_str(), "md" | "markdown")
}

/// Kind of a content file before expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateKind {
    /// One file, one page.
    Ordinary,
    /// A `[param].md` file expanded once per value of `param`.
    Dynamic { param: String },
    /// The reserved `[404].md` file.
    NotFound,
}

/// Kind of a resolved page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageKind {
    Ordinary,
    Dynamic { param: String, value: FieldValue },
    NotFound,
}

impl PageKind {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// URL derived from a content file's relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedUrl {
    /// The URL, or URL stem containing `[param]` for dynamic files.
    pub url: String,
    pub kind: TemplateKind,
}

impl DerivedUrl {
    /// Substitute a bracket value into a dynamic URL stem.
    pub fn expand(&self, segment: &str) -> String {
        match &self.kind {
            TemplateKind::Dynamic { param } => self.url.replace(&format!("[{param}]"), segment),
            _ => self.url.clone(),
        }
    }
}

fn bracket_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('[')?.strip_suffix(']')
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Derive the URL for a content file from its path relative to the site root.
///
/// - `about.md` → `/about`
/// - `blog/index.md` → `/blog/`
/// - `index.md` → `/`
/// - `blog/tags/[tag].md` → `/blog/tags/[tag]` (dynamic on `tag`)
/// - `[404].md` → `/404` (not-found page)
pub fn derive_url(relative: &Path) -> Result<DerivedUrl> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(s) => segments.push(s.to_str().ok_or_else(|| {
                CoreError::url_derivation(relative, "path is not valid UTF-8")
            })?),
            Component::CurDir => {}
            _ => {
                return Err(CoreError::url_derivation(
                    relative,
                    "content paths must be relative to the site root",
                ));
            }
        }
    }

    let Some(file_name) = segments.pop() else {
        return Err(CoreError::url_derivation(relative, "empty path"));
    };

    if let Some(dir) = segments.iter().find(|s| s.contains('[') || s.contains(']')) {
        return Err(CoreError::url_derivation(
            relative,
            format!("directory `{dir}` cannot be dynamic; only file names may use [param]"),
        ));
    }

    let stem = match file_name.rsplit_once('.') {
        Some((stem, ext)) if is_content_extension(ext) => stem,
        _ => return Err(CoreError::url_derivation(relative, "not a content file")),
    };

    let kind = match bracket_name(stem) {
        Some(NOT_FOUND_PARAM) => {
            if !segments.is_empty() {
                return Err(CoreError::url_derivation(
                    relative,
                    "[404] is reserved for the site root",
                ));
            }
            return Ok(DerivedUrl {
                url: NOT_FOUND_URL.to_string(),
                kind: TemplateKind::NotFound,
            });
        }
        Some(param) if is_identifier(param) => TemplateKind::Dynamic {
            param: param.to_string(),
        },
        Some(param) => {
            return Err(CoreError::url_derivation(
                relative,
                format!("`[{param}]` is not a valid parameter name"),
            ));
        }
        None if stem.contains('[') || stem.contains(']') => {
            return Err(CoreError::url_derivation(
                relative,
                "brackets must wrap the whole file name, e.g. [param].md",
            ));
        }
        None => TemplateKind::Ordinary,
    };

    let mut url = String::from("/");
    url.push_str(&segments.join("/"));
    if stem == INDEX_STEM {
        if !segments.is_empty() {
            url.push('/');
        }
    } else {
        if !segments.is_empty() {
            url.push('/');
        }
        url.push_str(stem);
    }

    Ok(DerivedUrl { url, kind })
}

/// Space separated URL segments used as a CSS class.
///
/// The root is `index` and the not-found page is `notfound`.
pub fn path_class(url: &str) -> String {
    if url == NOT_FOUND_URL {
        return "notfound".to_string();
    }
    let class = url
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if class.is_empty() {
        INDEX_STEM.to_string()
    } else {
        class
    }
}

/// The section a page belongs to: its parent URL without trailing slash.
///
/// `/blog/post-a` and `/blog/post-b` share the section `/blog`; `/blog/` and
/// `/about` belong to `/`.
pub fn section_prefix(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/",
        Some(pos) => &trimmed[..pos],
    }
}

/// Whether `url` lies strictly under `prefix`, aligned on path segments.
///
/// The section's own index (`/blog/` for prefix `/blog`) is not included.
pub fn is_within(url: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return url != "/";
    }
    url.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty())
}

/// Parse the date formats accepted in frontmatter.
///
/// RFC 3339, `YYYY-MM-DD` and `YYYY-MM-DD HH:MM:SS` are recognized.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// The first of `names` present in `fields`, with its value.
///
/// A null value (`date:` with nothing after it) counts as absent.
pub fn date_field<'n, 'f>(
    fields: &'f Fields,
    names: &[&'n str],
) -> Option<(&'n str, &'f FieldValue)> {
    names.iter().find_map(|&name| {
        fields
            .get(name)
            .filter(|value| !matches!(value, FieldValue::Null))
            .map(|value| (name, value))
    })
}

/// Date of the first of `names` present in `fields`.
///
/// Later names are not consulted when the first present one does not parse;
/// [`invalid_date_field`] reports that case.
pub fn date_from_fields(fields: &Fields, names: &[&str]) -> Option<DateTime<Utc>> {
    let (_, value) = date_field(fields, names)?;
    value.as_str().and_then(parse_date)
}

/// Name of the first present field among `names` when its value is not a date.
pub fn invalid_date_field<'n>(fields: &Fields, names: &[&'n str]) -> Option<&'n str> {
    let (name, value) = date_field(fields, names)?;
    value.as_str().and_then(parse_date).is_none().then_some(name)
}

/// A parsed content file before dynamic expansion.
#[derive(Debug, Clone)]
pub struct PageTemplate {
    /// Path relative to the site root.
    pub source: PathBuf,
    pub url: DerivedUrl,
    pub fields: Fields,
    /// Raw template body.
    pub body: String,
}

impl PageTemplate {
    pub fn kind(&self) -> &TemplateKind {
        &self.url.kind
    }
}

/// A resolved page with a unique URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub kind: PageKind,
    /// Source file relative to the site root.
    pub source: PathBuf,
    /// Position of this page among the expansions of its source.
    pub expansion_index: usize,
    /// Resolved fields. Registry-dependent expressions are still unevaluated.
    pub fields: Fields,
    /// Raw template body, rendered after the registry freezes.
    pub body: String,
}

impl Page {
    pub fn title(&self) -> Option<&str> {
        self.fields.title()
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        date_from_fields(&self.fields, DATE_FIELDS)
    }
}
