//! Page expansion.
//!
//! Turns [`PageTemplate`]s into [`Page`]s. Ordinary and not-found templates
//! yield one page each; a `[param]` template yields one page per distinct
//! value of its `param` field. Field expressions are resolved in two stages:
//! [`Stage::Eager`] before the registry freezes and [`Stage::Deferred`] (every
//! expression that queries the registry) after it.

use std::path::{Path, PathBuf};

use minijinja::Value;
use quire_core::{
    Expression, FieldValue, Fields, Page, PageKind, PageTemplate, TemplateKind,
    content::path_class,
};
use thiserror::Error;
use tracing::debug;

use crate::template::{TemplateEngine, describe_error, scope};

/// Expansion errors.
#[derive(Debug, Error)]
pub enum ExpandError {
    /// A `[param]` file without a `param` field.
    #[error("{}: bracket parameter `{param}` has no matching frontmatter field", path.display())]
    MissingBracketField { path: PathBuf, param: String },

    /// The bracket field did not produce a list.
    #[error("{}: field `{param}` must be a list to drive expansion, found {found}", path.display())]
    NotASequence {
        path: PathBuf,
        param: String,
        found: &'static str,
    },

    /// The bracket list contains a list, map or null.
    #[error("{}: field `{param}` contains a {found}; only strings, numbers and booleans can name pages", path.display())]
    NonScalarValue {
        path: PathBuf,
        param: String,
        found: &'static str,
    },

    /// A bracket value cannot be used as a URL segment.
    #[error("{}: value `{value}` of `{param}` is not a valid URL segment", path.display())]
    InvalidSegment {
        path: PathBuf,
        param: String,
        value: String,
    },

    /// A frontmatter expression failed to evaluate.
    #[error("{}: cannot evaluate field `{field}` (`{expression}`): {detail}", path.display())]
    Evaluation {
        path: PathBuf,
        field: String,
        expression: String,
        detail: String,
    },

    /// A generated page has no title once its fields are resolved.
    #[error("{}: title is required", path.display())]
    MissingTitle { path: PathBuf },
}

/// Result type for expansion.
pub type Result<T> = std::result::Result<T, ExpandError>;

/// Which expressions a resolution pass evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Expressions that do not query the registry.
    Eager,
    /// Expressions that do.
    Deferred,
}

impl Stage {
    fn includes(self, expr: &Expression) -> bool {
        match self {
            Self::Eager => !expr.needs_registry(),
            Self::Deferred => expr.needs_registry(),
        }
    }
}

/// Resolve the expressions of `fields` that belong to `stage`.
///
/// Fields are resolved in declaration order; each field sees the ones before
/// it already resolved, together with `site` and `extra`.
pub fn resolve_fields(
    engine: &TemplateEngine,
    source: &Path,
    fields: &Fields,
    stage: Stage,
    extra: &[(&str, Value)],
) -> Result<Fields> {
    let mut resolved = fields.clone();
    for (key, value) in fields.iter() {
        if !value.is_unresolved() {
            continue;
        }
        let ctx = scope(engine.site(), &resolved, extra);
        let value = resolve_value(engine, source, key, value, stage, &ctx)?;
        resolved.insert(key, value);
    }
    Ok(resolved)
}

fn resolve_value(
    engine: &TemplateEngine,
    source: &Path,
    key: &str,
    value: &FieldValue,
    stage: Stage,
    ctx: &Value,
) -> Result<FieldValue> {
    Ok(match value {
        FieldValue::Expr(expr) if stage.includes(expr) => {
            let name = format!("{}:{key}", source.display());
            engine
                .evaluate(&name, expr, ctx)
                .map_err(|e| ExpandError::Evaluation {
                    path: source.to_path_buf(),
                    field: key.to_string(),
                    expression: expr.source().to_string(),
                    detail: describe_error(&e),
                })?
        }
        FieldValue::List(items) => FieldValue::List(
            items
                .iter()
                .map(|item| resolve_value(engine, source, key, item, stage, ctx))
                .collect::<Result<_>>()?,
        ),
        FieldValue::Map(fields) => {
            let mut map = Fields::new();
            for (k, v) in fields.iter() {
                map.insert(k, resolve_value(engine, source, key, v, stage, ctx)?);
            }
            FieldValue::Map(map)
        }
        other => other.clone(),
    })
}

/// Bindings every page scope carries besides its fields.
pub fn page_bindings(url: &str) -> [(&'static str, Value); 2] {
    [
        ("url", Value::from(url)),
        ("path_class", Value::from(path_class(url))),
    ]
}

/// Expands templates against an engine.
///
/// Before the registry exists the engine holds the snapshot of ordinary pages,
/// so `pages()` in a bracket expression sees those only.
#[derive(Debug, Clone, Copy)]
pub struct Expander<'a> {
    engine: &'a TemplateEngine,
}

impl<'a> Expander<'a> {
    pub fn new(engine: &'a TemplateEngine) -> Self {
        Self { engine }
    }

    /// Expand any template into its pages.
    pub fn expand(&self, template: &PageTemplate) -> Result<Vec<Page>> {
        match template.kind() {
            TemplateKind::Dynamic { param } => self.expand_dynamic(template, param),
            TemplateKind::Ordinary | TemplateKind::NotFound => {
                Ok(vec![self.expand_ordinary(template)?])
            }
        }
    }

    /// One page with its eager fields resolved.
    pub fn expand_ordinary(&self, template: &PageTemplate) -> Result<Page> {
        let url = template.url.url.clone();
        let fields = resolve_fields(
            self.engine,
            &template.source,
            &template.fields,
            Stage::Eager,
            &page_bindings(&url),
        )?;
        let kind = match template.kind() {
            TemplateKind::NotFound => PageKind::NotFound,
            _ => PageKind::Ordinary,
        };

        Ok(Page {
            url,
            kind,
            source: template.source.clone(),
            expansion_index: 0,
            fields,
            body: template.body.clone(),
        })
    }

    /// Distinct values of the bracket field, in first-occurrence order.
    ///
    /// A literal list is used as is. An expression, or a plain string such
    /// as `range(1, 4)`, is evaluated and must produce a list.
    pub fn bracket_values(&self, template: &PageTemplate, param: &str) -> Result<Vec<FieldValue>> {
        let source = &template.source;
        let raw = template
            .fields
            .get(param)
            .ok_or_else(|| ExpandError::MissingBracketField {
                path: source.clone(),
                param: param.to_string(),
            })?;

        let ctx = scope(self.engine.site(), &template.fields, &[]);
        let evaluation_error = |expression: &str, e: minijinja::Error| ExpandError::Evaluation {
            path: source.clone(),
            field: param.to_string(),
            expression: expression.to_string(),
            detail: describe_error(&e),
        };
        let evaluated = match raw {
            FieldValue::Expr(expr) => {
                let name = format!("{}:{param}", source.display());
                self.engine
                    .evaluate(&name, expr, &ctx)
                    .map_err(|e| evaluation_error(expr.source(), e))?
            }
            FieldValue::String(text) => self
                .engine
                .eval_expression(text, &ctx)
                .map_err(|e| evaluation_error(text, e))?,
            other => other.clone(),
        };

        let FieldValue::List(items) = evaluated else {
            return Err(ExpandError::NotASequence {
                path: source.clone(),
                param: param.to_string(),
                found: evaluated.type_name(),
            });
        };

        let mut values: Vec<FieldValue> = Vec::with_capacity(items.len());
        for item in items {
            if !item.is_scalar() {
                return Err(ExpandError::NonScalarValue {
                    path: source.clone(),
                    param: param.to_string(),
                    found: item.type_name(),
                });
            }
            if !values.contains(&item) {
                values.push(item);
            }
        }
        Ok(values)
    }

    /// One page per distinct bracket value, each with the value bound to `param`.
    pub fn expand_dynamic(&self, template: &PageTemplate, param: &str) -> Result<Vec<Page>> {
        let values = self.bracket_values(template, param)?;
        debug!(
            source = %template.source.display(),
            param,
            count = values.len(),
            "expanding dynamic template"
        );

        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| self.instantiate(template, param, index, value))
            .collect()
    }

    fn instantiate(
        &self,
        template: &PageTemplate,
        param: &str,
        index: usize,
        value: FieldValue,
    ) -> Result<Page> {
        let invalid_segment = || ExpandError::InvalidSegment {
            path: template.source.clone(),
            param: param.to_string(),
            value: value.to_url_segment().unwrap_or_default(),
        };
        let segment = value.to_url_segment().ok_or_else(invalid_segment)?;
        if segment.trim().is_empty() || segment.contains('/') {
            return Err(invalid_segment());
        }

        let url = template.url.expand(&segment);
        let mut fields = template.fields.clone();
        fields.insert(param, value.clone());
        let fields = resolve_fields(
            self.engine,
            &template.source,
            &fields,
            Stage::Eager,
            &page_bindings(&url),
        )?;
        if !fields.has_title() {
            return Err(ExpandError::MissingTitle {
                path: template.source.clone(),
            });
        }

        Ok(Page {
            url,
            kind: PageKind::Dynamic {
                param: param.to_string(),
                value,
            },
            source: template.source.clone(),
            expansion_index: index,
            fields,
            body: template.body.clone(),
        })
    }
}
