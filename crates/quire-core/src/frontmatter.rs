//! Frontmatter parsing for content files.
//!
//! A header is parsed into [`Fields`], an ordered mapping whose values keep
//! their type. Strings containing template delimiters become
//! [`FieldValue::Expr`] and are evaluated later by the generator; each
//! expression records whether it queries the page registry so evaluation can
//! be split around the registry freeze.

use std::{path::Path, sync::LazyLock};

use regex::Regex;
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::error::{CoreError, Result};

/// Template functions that read the page registry.
pub const REGISTRY_FUNCTIONS: &[&str] = &["pages", "tags", "prev_page", "next_page"];

static REGISTRY_CALL: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"\b(?:{})\s*\(", REGISTRY_FUNCTIONS.join("|"));
    Regex::new(&pattern).expect("valid registry call pattern")
});

/// Delimiter types for frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    /// YAML frontmatter delimited by `---`.
    Yaml,
    /// TOML frontmatter delimited by `+++`.
    Toml,
}

impl FrontmatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// An unevaluated template expression found in a header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    source: String,
    needs_registry: bool,
}

impl Expression {
    /// Wrap a source string as an expression regardless of delimiters.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let needs_registry = REGISTRY_CALL.is_match(&source);
        Self {
            source,
            needs_registry,
        }
    }

    /// Returns an expression if the string contains template delimiters.
    pub fn detect(text: &str) -> Option<Self> {
        (text.contains("{{") || text.contains("{%")).then(|| Self::new(text))
    }

    /// The expression text as written in the header.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether evaluating this expression requires the complete page registry.
    pub fn needs_registry(&self) -> bool {
        self.needs_registry
    }

    /// The inner expression when the source is a single `{{ ... }}` block.
    pub fn bare_expression(&self) -> Option<&str> {
        let inner = self
            .source
            .trim()
            .strip_prefix("{{")?
            .strip_suffix("}}")?
            .trim();
        (!inner.contains("{{") && !inner.contains("}}")).then_some(inner)
    }
}

/// A typed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<FieldValue>),
    Map(Fields),
    /// Evaluated by the generator, either before or after the registry freeze.
    Expr(Expression),
}

impl FieldValue {
    /// Build a string value, flagging it as an expression when it contains delimiters.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        match Expression::detect(&text) {
            Some(expr) => Self::Expr(expr),
            None => Self::String(text),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value is a single scalar (string, number or boolean).
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::Integer(_) | Self::Float(_) | Self::String(_)
        )
    }

    /// Whether this value, or any nested value, is still an expression.
    pub fn is_unresolved(&self) -> bool {
        match self {
            Self::Expr(_) => true,
            Self::List(items) => items.iter().any(Self::is_unresolved),
            Self::Map(fields) => fields.iter().any(|(_, v)| v.is_unresolved()),
            _ => false,
        }
    }

    /// Whether any nested expression needs the page registry.
    pub fn needs_registry(&self) -> bool {
        match self {
            Self::Expr(expr) => expr.needs_registry(),
            Self::List(items) => items.iter().any(Self::needs_registry),
            Self::Map(fields) => fields.iter().any(|(_, v)| v.needs_registry()),
            _ => false,
        }
    }

    /// The string substituted for a bracket segment in a URL.
    pub fn to_url_segment(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(format!("{f:.0}")),
            Self::Float(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// A short name for the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Expr(_) => "expression",
        }
    }

    fn from_yaml(value: serde_yaml::Value, path: &Path) -> Result<Self> {
        use serde_yaml::Value as Y;

        Ok(match value {
            Y::Null => Self::Null,
            Y::Bool(b) => Self::Bool(b),
            Y::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Y::String(s) => Self::from_text(s),
            Y::Sequence(items) => Self::List(
                items
                    .into_iter()
                    .map(|v| Self::from_yaml(v, path))
                    .collect::<Result<_>>()?,
            ),
            Y::Mapping(map) => Self::Map(Fields::from_yaml(map, path)?),
            Y::Tagged(tagged) => Self::from_yaml(tagged.value, path)?,
        })
    }

    fn from_toml(value: toml::Value) -> Self {
        use toml::Value as T;

        match value {
            T::String(s) => Self::from_text(s),
            T::Integer(i) => Self::Integer(i),
            T::Float(f) => Self::Float(f),
            T::Boolean(b) => Self::Bool(b),
            T::Datetime(dt) => Self::String(dt.to_string()),
            T::Array(items) => Self::List(items.into_iter().map(Self::from_toml).collect()),
            T::Table(table) => Self::Map(Fields::from_toml(table)),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null | Self::Expr(_) => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => items.serialize(serializer),
            Self::Map(fields) => fields.serialize(serializer),
        }
    }
}

/// Ordered key/value header fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, FieldValue)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert a value, replacing an existing key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The resolved page title, if it is a plain string.
    pub fn title(&self) -> Option<&str> {
        self.get("title").and_then(FieldValue::as_str)
    }

    /// Resolved `tags` entries. Non-string entries are ignored.
    pub fn tags(&self) -> Vec<&str> {
        match self.get("tags") {
            Some(FieldValue::List(items)) => items.iter().filter_map(FieldValue::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the title is present. Expressions count as present.
    pub fn has_title(&self) -> bool {
        match self.get("title") {
            Some(FieldValue::String(s)) => !s.trim().is_empty(),
            Some(FieldValue::Null) | None => false,
            Some(_) => true,
        }
    }

    /// Validate fields required by ordinary pages.
    pub fn validate(&self, path: &Path) -> Result<()> {
        if !self.has_title() {
            return Err(CoreError::frontmatter(path, "title is required"));
        }
        Ok(())
    }

    fn from_yaml(map: serde_yaml::Mapping, path: &Path) -> Result<Self> {
        let mut fields = Self::new();
        for (key, value) in map {
            let key = match key {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(CoreError::frontmatter(
                        path,
                        format!("unsupported key type: {other:?}"),
                    ));
                }
            };
            fields.insert(key, FieldValue::from_yaml(value, path)?);
        }
        Ok(fields)
    }

    fn from_toml(table: toml::Table) -> Self {
        let mut fields = Self::new();
        for (key, value) in table {
            fields.insert(key, FieldValue::from_toml(value));
        }
        fields
    }
}

impl FromIterator<(String, FieldValue)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

impl Serialize for Fields {
    /// Unresolved expressions are left out, so templates never see raw expression text.
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let resolved: Vec<_> = self.entries.iter().filter(|(_, v)| !v.is_unresolved()).collect();
        let mut map = serializer.serialize_map(Some(resolved.len()))?;
        for (key, value) in resolved {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Split content into frontmatter and body.
///
/// Returns `Ok(None)` when the file has no header. The closing delimiter must
/// sit on a line of its own; a header that never closes is an error.
pub fn split_frontmatter<'a>(
    content: &'a str,
    path: &Path,
) -> Result<Option<(FrontmatterFormat, &'a str, &'a str)>> {
    let content = content.trim_start_matches('\u{feff}');

    let format = if content.starts_with("---") {
        FrontmatterFormat::Yaml
    } else if content.starts_with("+++") {
        FrontmatterFormat::Toml
    } else {
        return Ok(None);
    };

    let delimiter = format.delimiter();
    let Some(first_newline) = content.find('\n') else {
        return Err(CoreError::frontmatter(path, "unterminated frontmatter header"));
    };
    if content[..first_newline].trim_end() != delimiter {
        return Ok(None);
    }

    let after_first = &content[first_newline + 1..];
    let mut offset = 0;
    for line in after_first.split_inclusive('\n') {
        if line.trim_end() == delimiter {
            let frontmatter = &after_first[..offset];
            let body = &after_first[offset + line.len()..];
            return Ok(Some((format, frontmatter, body.trim_start_matches(['\r', '\n']))));
        }
        offset += line.len();
    }

    Err(CoreError::frontmatter(path, "unterminated frontmatter header"))
}

/// Parse frontmatter from a string.
pub fn parse_frontmatter(content: &str, path: &Path) -> Result<(Fields, String)> {
    let Some((format, fm_str, body)) = split_frontmatter(content, path)? else {
        return Ok((Fields::default(), content.to_string()));
    };

    let fields = match format {
        FrontmatterFormat::Yaml => {
            let value: serde_yaml::Value =
                serde_yaml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?;
            match value {
                serde_yaml::Value::Null => Fields::default(),
                serde_yaml::Value::Mapping(map) => Fields::from_yaml(map, path)?,
                _ => {
                    return Err(CoreError::frontmatter(
                        path,
                        "header must be a key-value mapping",
                    ));
                }
            }
        }
        FrontmatterFormat::Toml => {
            let table: toml::Table =
                toml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?;
            Fields::from_toml(table)
        }
    };

    Ok((fields, body.to_string()))
}
