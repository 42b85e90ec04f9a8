//! Template environment.
//!
//! Wraps a [`minijinja::Environment`] configured for site rendering: registry
//! queries (`pages`, `tags`, `prev_page`, `next_page`), `readtime`,
//! `cache_bust`, the `datefmt` and `flatten` filters and one callable per
//! snippet. The same engine type serves frontmatter evaluation before the
//! registry freezes (over the ordinary-page snapshot) and page rendering after
//! it.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    sync::{Arc, LazyLock},
};

use chrono::Locale;
use minijinja::{
    Environment, Error, ErrorKind, State, UndefinedBehavior, Value,
    value::{Kwargs, ValueKind},
};
use quire_core::{
    Config, Expression, FieldValue, Fields, Page, PageKind, content::parse_date,
};
use regex::Regex;
use serde::{Serialize, Serializer, ser::SerializeMap};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::{assets::CacheBuster, registry::FrozenRegistry, structural::StructuralSet};

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid html tag pattern"));

/// A template that failed to compile while the engine was being set up.
#[derive(Debug, ThisError)]
#[error("template {name}: {detail}")]
pub struct TemplateError {
    pub name: String,
    pub detail: String,
}

impl TemplateError {
    fn new(name: impl Into<String>, err: &Error) -> Self {
        Self {
            name: name.into(),
            detail: describe_error(err),
        }
    }
}

/// Result type for engine setup.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Full description of a template error including its cause chain.
///
/// minijinja reports the template name and line in its `Display` output;
/// errors raised inside snippets carry the snippet's error as a source.
pub fn describe_error(err: &Error) -> String {
    let mut detail = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let _ = write!(detail, ": {cause}");
        source = cause.source();
    }
    detail
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// Serializes a page the way templates see it: every resolved field plus
/// `url`, `kind` and `source`.
struct PageView<'a>(&'a Page);

impl Serialize for PageView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let page = self.0;
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in page.fields.iter() {
            if !value.is_unresolved() && !matches!(key, "url" | "kind" | "source") {
                map.serialize_entry(key, value)?;
            }
        }
        map.serialize_entry("url", &page.url)?;
        map.serialize_entry("source", &page.source.to_string_lossy())?;
        let kind = match &page.kind {
            PageKind::Ordinary => "ordinary",
            PageKind::Dynamic { .. } => "dynamic",
            PageKind::NotFound => "not_found",
        };
        map.serialize_entry("kind", kind)?;
        map.end()
    }
}

/// Template value for a page.
pub fn page_value(page: &Page) -> Value {
    Value::from_serialize(PageView(page))
}

/// A registry together with the template value of every page in it.
///
/// Views are computed once so query functions only clone handles.
#[derive(Debug)]
pub struct PageGraph {
    registry: Arc<FrozenRegistry>,
    views: Vec<Value>,
}

impl PageGraph {
    pub fn new(registry: Arc<FrozenRegistry>) -> Self {
        let views = registry.pages().iter().map(page_value).collect();
        Self { registry, views }
    }

    pub fn registry(&self) -> &FrozenRegistry {
        &self.registry
    }

    fn view(&self, url: &str) -> Option<Value> {
        self.registry.index_of(url).map(|i| self.views[i].clone())
    }

    /// `pages(within=, tag=, sort_by=, reverse=, limit=)`.
    fn query(&self, kwargs: &Kwargs) -> std::result::Result<Value, Error> {
        let within: Option<String> = kwargs.get("within")?;
        let tag: Option<String> = kwargs.get("tag")?;
        let sort_by: Option<String> = kwargs.get("sort_by")?;
        let reverse: Option<bool> = kwargs.get("reverse")?;
        let limit: Option<usize> = kwargs.get("limit")?;
        kwargs.assert_all_used()?;

        let registry = &self.registry;
        let mut indices: Vec<usize> = match &within {
            Some(prefix) => registry.within_indices(prefix).to_vec(),
            None => (0..registry.len())
                .filter(|&i| !registry.pages()[i].kind.is_not_found())
                .collect(),
        };
        if let Some(tag) = &tag {
            let tagged = registry.tagged_indices(tag);
            indices.retain(|i| tagged.contains(i));
        }

        let reverse = reverse.unwrap_or(false);
        match &sort_by {
            Some(field) => registry.sort_indices(&mut indices, field, reverse),
            None if reverse => indices.reverse(),
            None => {}
        }
        if let Some(limit) = limit {
            indices.truncate(limit);
        }

        Ok(Value::from(
            indices
                .into_iter()
                .map(|i| self.views[i].clone())
                .collect::<Vec<_>>(),
        ))
    }

    fn neighbor(&self, state: &State, kwargs: &Kwargs, next: bool) -> std::result::Result<Value, Error> {
        let by: Option<String> = kwargs.get("by")?;
        kwargs.assert_all_used()?;
        let by = by.as_deref().unwrap_or("order");

        let url = state
            .lookup("url")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| invalid("prev_page/next_page can only be used while rendering a page"))?;

        let (prev, following) = self.registry.neighbors(&url, by);
        let found = if next { following } else { prev };
        Ok(found
            .and_then(|page| self.view(&page.url))
            .unwrap_or_else(|| Value::from(())))
    }
}

/// Words in a markdown text, ignoring fenced code, HTML tags and tokens made
/// only of markdown punctuation.
pub fn count_words(text: &str) -> usize {
    let mut in_fence = false;
    let mut words = 0;
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        words += HTML_TAG
            .replace_all(line, " ")
            .split_whitespace()
            .filter(|token| token.chars().any(char::is_alphanumeric))
            .count();
    }
    words
}

/// Minutes needed to read `text`, at least one.
pub fn reading_time(text: &str, words_per_minute: u32) -> u32 {
    let minutes = count_words(text).div_ceil(words_per_minute.max(1) as usize);
    u32::try_from(minutes).unwrap_or(u32::MAX).max(1)
}

/// Map a language tag such as `en-us` or `fr_FR` to a chrono locale.
pub fn parse_locale(tag: &str) -> Option<Locale> {
    let mut parts = tag.split(['-', '_']);
    let language = parts.next()?.to_ascii_lowercase();
    let name = match parts.next() {
        Some(region) => format!("{language}_{}", region.to_ascii_uppercase()),
        None => language,
    };
    Locale::try_from(name.as_str()).ok()
}

fn datefmt_filter(
    default_locale: Locale,
) -> impl Fn(Value, String, Kwargs) -> std::result::Result<String, Error> + Send + Sync + 'static {
    move |value: Value, format: String, kwargs: Kwargs| {
        let locale: Option<String> = kwargs.get("locale")?;
        kwargs.assert_all_used()?;
        let locale = locale
            .as_deref()
            .and_then(parse_locale)
            .unwrap_or(default_locale);

        let text = value
            .as_str()
            .ok_or_else(|| invalid(format!("datefmt: expected a date string, got {}", value.kind())))?;
        let date = parse_date(text).ok_or_else(|| {
            invalid(format!(
                "datefmt: cannot parse `{text}` (expected RFC 3339, YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)"
            ))
        })?;

        let mut out = String::new();
        write!(out, "{}", date.format_localized(&format, locale))
            .map_err(|_| invalid(format!("datefmt: invalid format string `{format}`")))?;
        Ok(out)
    }
}

fn flatten_filter(value: Value) -> std::result::Result<Value, Error> {
    if !matches!(value.kind(), ValueKind::Seq | ValueKind::Iterable) {
        return Err(invalid(format!("flatten: expected a sequence, got {}", value.kind())));
    }
    let mut flat = Vec::new();
    for item in value.try_iter()? {
        if matches!(item.kind(), ValueKind::Seq | ValueKind::Iterable) {
            flat.extend(item.try_iter()?);
        } else {
            flat.push(item);
        }
    }
    Ok(Value::from(flat))
}

/// Convert an evaluated template value back into a frontmatter value.
pub fn value_to_field(value: &Value) -> std::result::Result<FieldValue, Error> {
    Ok(match value.kind() {
        ValueKind::Undefined => {
            return Err(Error::new(
                ErrorKind::UndefinedError,
                "expression evaluated to an undefined value",
            ));
        }
        ValueKind::None => FieldValue::Null,
        ValueKind::Bool => FieldValue::Bool(value.is_true()),
        ValueKind::Number if value.is_integer() => FieldValue::Integer(i64::try_from(value.clone())?),
        ValueKind::Number => FieldValue::Float(f64::try_from(value.clone())?),
        ValueKind::String => FieldValue::String(value.to_string()),
        ValueKind::Seq | ValueKind::Iterable => FieldValue::List(
            value
                .try_iter()?
                .map(|item| value_to_field(&item))
                .collect::<std::result::Result<_, _>>()?,
        ),
        ValueKind::Map => {
            let mut fields = Fields::new();
            for key in value.try_iter()? {
                let item = value.get_item(&key)?;
                let key = key.as_str().map_or_else(|| key.to_string(), str::to_string);
                fields.insert(key, value_to_field(&item)?);
            }
            FieldValue::Map(fields)
        }
        _ => FieldValue::String(value.to_string()),
    })
}

/// Build a scope from resolved fields, the site configuration and extra bindings.
///
/// Extras override fields of the same name.
pub fn scope(site: &Value, fields: &Fields, extra: &[(&str, Value)]) -> Value {
    let mut map: BTreeMap<String, Value> = fields
        .iter()
        .filter(|(_, v)| !v.is_unresolved())
        .map(|(k, v)| (k.to_string(), Value::from_serialize(v)))
        .collect();
    map.insert("site".to_string(), site.clone());
    for (key, value) in extra {
        map.insert((*key).to_string(), value.clone());
    }
    Value::from_serialize(&map)
}

/// Configured template environment with registry access.
#[derive(Debug)]
pub struct TemplateEngine {
    env: Environment<'static>,
    site: Value,
    graph: Arc<PageGraph>,
}

impl TemplateEngine {
    /// Create an engine over `graph` with every snippet of `structural` registered.
    pub fn new(
        config: &Config,
        structural: &StructuralSet,
        graph: Arc<PageGraph>,
        assets: Arc<CacheBuster>,
    ) -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::SemiStrict);
        env.set_keep_trailing_newline(true);

        let pages_graph = Arc::clone(&graph);
        env.add_function("pages", move |kwargs: Kwargs| pages_graph.query(&kwargs));

        let tags_graph = Arc::clone(&graph);
        env.add_function("tags", move || {
            let tags: Vec<Value> = tags_graph.registry().tags().into_iter().map(Value::from).collect();
            Value::from(tags)
        });

        let prev_graph = Arc::clone(&graph);
        env.add_function("prev_page", move |state: &State, kwargs: Kwargs| {
            prev_graph.neighbor(state, &kwargs, false)
        });
        let next_graph = Arc::clone(&graph);
        env.add_function("next_page", move |state: &State, kwargs: Kwargs| {
            next_graph.neighbor(state, &kwargs, true)
        });

        let reading_speed = config.build.reading_speed;
        env.add_function("readtime", move |text: String| reading_time(&text, reading_speed));

        env.add_function("cache_bust", move |kwargs: Kwargs| {
            let path: String = kwargs.get("path")?;
            kwargs.assert_all_used()?;
            assets.bust(&path).map_err(|e| invalid(e.to_string()))
        });

        let default_locale = parse_locale(&config.site.language).unwrap_or(Locale::POSIX);
        env.add_filter("datefmt", datefmt_filter(default_locale));
        env.add_filter("flatten", flatten_filter);

        for snippet in &structural.snippets {
            let template_name = snippet.template_name();
            env.add_template_owned(template_name.clone(), snippet.body.clone())
                .map_err(|e| TemplateError::new(snippet.source.display().to_string(), &e))?;

            let name = snippet.name.clone();
            let defaults: Vec<(String, Value)> = snippet
                .params
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_serialize(v)))
                .collect();
            env.add_function(snippet.name.clone(), move |state: &State, kwargs: Kwargs| {
                call_snippet(state, &name, &template_name, &defaults, &kwargs)
            });
        }
        debug!(snippets = structural.snippets.len(), "template environment ready");

        Ok(Self {
            env,
            site: Value::from_serialize(&config.site),
            graph,
        })
    }

    /// Register a named template, e.g. a page body or a structural fragment.
    pub fn add_template(&mut self, name: impl Into<String>, source: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.env
            .add_template_owned(name.clone(), source.into())
            .map_err(|e| TemplateError::new(name, &e))
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    /// Render a registered template.
    pub fn render(&self, name: &str, ctx: &Value) -> std::result::Result<String, Error> {
        self.env.get_template(name)?.render(ctx)
    }

    /// Render a one-off template string; `name` appears in error messages.
    pub fn render_str(&self, name: &str, source: &str, ctx: &Value) -> std::result::Result<String, Error> {
        self.env.render_named_str(name, source, ctx)
    }

    /// Evaluate a frontmatter expression.
    ///
    /// A lone `{{ ... }}` block is compiled as an expression and keeps its
    /// type, so `{{ range(1, 4) }}` yields a list. Anything else is rendered
    /// as a template and yields a string.
    pub fn evaluate(
        &self,
        name: &str,
        expr: &Expression,
        ctx: &Value,
    ) -> std::result::Result<FieldValue, Error> {
        match expr.bare_expression() {
            Some(inner) => self.eval_expression(inner, ctx),
            None => Ok(FieldValue::String(self.render_str(name, expr.source(), ctx)?)),
        }
    }

    /// Compile and evaluate a bare expression such as `pages(within="/blog")`.
    pub fn eval_expression(&self, source: &str, ctx: &Value) -> std::result::Result<FieldValue, Error> {
        let compiled = self.env.compile_expression(source)?;
        value_to_field(&compiled.eval(ctx)?)
    }

    /// Site configuration as a template value.
    pub fn site(&self) -> &Value {
        &self.site
    }

    /// Template value for the page at `url`, as returned by `pages()`.
    pub fn page_view(&self, url: &str) -> Option<Value> {
        self.graph.view(url)
    }
}

/// Invoke a snippet: defaults merged with keyword arguments, the caller block
/// rendered in the caller's scope, the body rendered in a scope holding only
/// the parameters and `caller_content`.
fn call_snippet(
    state: &State,
    name: &str,
    template_name: &str,
    defaults: &[(String, Value)],
    kwargs: &Kwargs,
) -> std::result::Result<Value, Error> {
    let caller_content = match kwargs.get::<Option<Value>>("caller")? {
        Some(caller) => caller.call(state, &[])?.to_string(),
        None => String::new(),
    };

    let mut params: BTreeMap<String, Value> = defaults.iter().cloned().collect();
    for key in kwargs.args() {
        if key == "caller" {
            continue;
        }
        if !params.contains_key(key) {
            return Err(Error::new(
                ErrorKind::TooManyArguments,
                format!("snippet `{name}` has no parameter `{key}`"),
            ));
        }
        params.insert(key.to_string(), kwargs.get::<Value>(key)?);
    }
    kwargs.assert_all_used()?;

    params.insert(
        "caller_content".to_string(),
        Value::from_safe_string(caller_content.clone()),
    );
    params.insert(
        "caller".to_string(),
        Value::from_function(move || Value::from_safe_string(caller_content.clone())),
    );

    let rendered = state
        .env()
        .get_template(template_name)?
        .render(Value::from_serialize(&params))?;
    Ok(Value::from_safe_string(rendered))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use minijinja::context;
    use quire_core::frontmatter::REGISTRY_FUNCTIONS;

    use super::*;
    use crate::structural::Snippet;

    fn page(url: &str, source: &str, fields: &[(&str, FieldValue)]) -> Page {
        Page {
            url: url.to_string(),
            kind: PageKind::Ordinary,
            source: PathBuf::from(source),
            expansion_index: 0,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            body: String::new(),
        }
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::String(s.to_string())
    }

    fn engine_with(pages: Vec<Page>, structural: &StructuralSet) -> TemplateEngine {
        let mut config = Config::default();
        config.site.title = Some("Demo".to_string());
        let registry = Arc::new(FrozenRegistry::freeze(pages).expect("freeze"));
        TemplateEngine::new(
            &config,
            structural,
            Arc::new(PageGraph::new(registry)),
            Arc::new(CacheBuster::default()),
        )
        .expect("engine")
    }

    fn blog() -> Vec<Page> {
        vec![
            page("/blog/", "blog/index.md", &[("title", text("Blog"))]),
            page(
                "/blog/a",
                "blog/a.md",
                &[
                    ("title", text("A")),
                    ("order", FieldValue::Integer(1)),
                    ("tags", FieldValue::List(vec![text("rust")])),
                ],
            ),
            page(
                "/blog/b",
                "blog/b.md",
                &[("title", text("B")), ("order", FieldValue::Integer(2))],
            ),
            page("/about", "about.md", &[("title", text("About"))]),
        ]
    }

    fn render(engine: &TemplateEngine, source: &str, ctx: Value) -> String {
        engine.render_str("test", source, &ctx).expect("render")
    }

    #[test]
    fn test_pages_within_excludes_section_index() {
        let engine = engine_with(blog(), &StructuralSet::default());
        let out = render(
            &engine,
            r#"{% for p in pages(within="/blog") %}{{ p.url }} {% endfor %}"#,
            context! {},
        );
        assert_eq!(out, "/blog/a /blog/b ");
    }

    #[test]
    fn test_pages_sort_reverse_limit_and_tag() {
        let engine = engine_with(blog(), &StructuralSet::default());
        let out = render(
            &engine,
            r#"{{ pages(within="/blog", sort_by="order", reverse=true, limit=1)[0].title }}|{{ pages(tag="rust") | map(attribute="title") | join(",") }}|{{ tags() | join(",") }}"#,
            context! {},
        );
        assert_eq!(out, "B|A|rust");
    }

    #[test]
    fn test_prev_and_next_page() {
        let engine = engine_with(blog(), &StructuralSet::default());
        let ctx = scope(engine.site(), &Fields::new(), &[("url", Value::from("/blog/a"))]);
        let out = render(
            &engine,
            "{{ prev_page() is none }} {{ next_page(by=\"order\").url }}",
            ctx,
        );
        assert_eq!(out, "true /blog/b");
    }

    #[test]
    fn test_prev_page_requires_current_page() {
        let engine = engine_with(blog(), &StructuralSet::default());
        let err = engine
            .render_str("test", "{{ prev_page() }}", &context! {})
            .unwrap_err();
        assert!(describe_error(&err).contains("while rendering a page"));
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let engine = engine_with(Vec::new(), &StructuralSet::default());
        assert!(engine.render_str("test", "{{ missing }}", &context! {}).is_err());
        assert_eq!(
            render(&engine, "{% if missing %}x{% endif %}ok", context! {}),
            "ok"
        );
    }

    #[test]
    fn test_evaluate_keeps_types() {
        let engine = engine_with(Vec::new(), &StructuralSet::default());
        let ctx = context! {};

        let list = engine
            .evaluate("f", &Expression::new("{{ range(1, 4) }}"), &ctx)
            .expect("eval");
        assert_eq!(
            list,
            FieldValue::List(vec![
                FieldValue::Integer(1),
                FieldValue::Integer(2),
                FieldValue::Integer(3)
            ])
        );

        let rendered = engine
            .evaluate("f", &Expression::new("Hello {{ site.title }}!"), &scope(engine.site(), &Fields::new(), &[]))
            .expect("eval");
        assert_eq!(rendered, text("Hello Demo!"));
    }

    #[test]
    fn test_evaluate_undefined_expression_fails() {
        let engine = engine_with(Vec::new(), &StructuralSet::default());
        assert!(
            engine
                .evaluate("f", &Expression::new("{{ nope }}"), &context! {})
                .is_err()
        );
    }

    #[test]
    fn test_value_to_field_map() {
        let value = Value::from_serialize(serde_json::json!({"a": 1, "b": [true, null], "c": 1.5}));
        let FieldValue::Map(fields) = value_to_field(&value).expect("convert") else {
            panic!("expected map");
        };
        assert_eq!(fields.get("a"), Some(&FieldValue::Integer(1)));
        assert_eq!(
            fields.get("b"),
            Some(&FieldValue::List(vec![FieldValue::Bool(true), FieldValue::Null]))
        );
        assert_eq!(fields.get("c"), Some(&FieldValue::Float(1.5)));
    }

    #[test]
    fn test_datefmt_filter() {
        let engine = engine_with(Vec::new(), &StructuralSet::default());
        let ctx = Value::from_serialize(serde_json::json!({"d": "2024-01-15"}));
        assert_eq!(
            render(&engine, r#"{{ d | datefmt("%B %d, %Y") }}"#, ctx.clone()),
            "January 15, 2024"
        );
        assert_eq!(
            render(&engine, r#"{{ d | datefmt("%B", locale="fr-fr") }}"#, ctx.clone()),
            "janvier"
        );
        assert!(
            engine
                .render_str("t", r#"{{ "soon" | datefmt("%Y") }}"#, &ctx)
                .is_err()
        );
    }

    #[test]
    fn test_flatten_filter() {
        let engine = engine_with(Vec::new(), &StructuralSet::default());
        let ctx = Value::from_serialize(serde_json::json!({"items": [[1, 2], 3, ["x"]]}));
        assert_eq!(render(&engine, "{{ items | flatten | join(',') }}", ctx), "1,2,3,x");
    }

    #[test]
    fn test_readtime() {
        let engine = engine_with(Vec::new(), &StructuralSet::default());
        let words = vec!["word"; 450].join(" ");
        let ctx = Value::from_serialize(serde_json::json!({ "body": words }));
        assert_eq!(render(&engine, "{{ readtime(body) }}", ctx), "3");
        assert_eq!(reading_time("", 200), 1);
    }

    #[test]
    fn test_count_words_skips_code_and_markup() {
        let text = "# Title here\n\n<div class=\"x\">Some **bold** text</div>\n\n```rust\nfn main() {}\n```\n- item";
        assert_eq!(count_words(text), 6);
    }

    #[test]
    fn test_snippet_with_defaults_and_caller() {
        let structural = StructuralSet {
            snippets: vec![Snippet {
                name: "card".to_string(),
                params: vec![("heading".to_string(), text("Untitled"))],
                body: "<div class=\"card\"><h3>{{ heading }}</h3>{{ caller_content }}</div>".to_string(),
                source: PathBuf::from("_/macros/card.md"),
            }],
            ..StructuralSet::default()
        };
        let engine = engine_with(Vec::new(), &structural);
        let ctx = Value::from_serialize(serde_json::json!({"who": "world"}));

        assert_eq!(
            render(&engine, "{{ card() }}", ctx.clone()),
            "<div class=\"card\"><h3>Untitled</h3></div>"
        );
        assert_eq!(
            render(
                &engine,
                "{% call card(heading=\"Hi\") %}hello {{ who }}{% endcall %}",
                ctx.clone()
            ),
            "<div class=\"card\"><h3>Hi</h3>hello world</div>"
        );

        let err = engine
            .render_str("t", "{{ card(color=\"red\") }}", &ctx)
            .unwrap_err();
        assert!(describe_error(&err).contains("no parameter `color`"));
    }

    #[test]
    fn test_snippet_scope_is_isolated() {
        let structural = StructuralSet {
            snippets: vec![Snippet {
                name: "leak".to_string(),
                params: Vec::new(),
                body: "{{ who }}".to_string(),
                source: PathBuf::from("_/macros/leak.md"),
            }],
            ..StructuralSet::default()
        };
        let engine = engine_with(Vec::new(), &structural);
        let ctx = Value::from_serialize(serde_json::json!({"who": "world"}));
        assert!(engine.render_str("t", "{{ leak() }}", &ctx).is_err());
    }

    #[test]
    fn test_registry_functions_are_registered() {
        let engine = engine_with(blog(), &StructuralSet::default());
        let ctx = scope(engine.site(), &Fields::new(), &[("url", Value::from("/blog/a"))]);
        for name in REGISTRY_FUNCTIONS {
            let source = format!("{{{{ {name}() is defined }}}}");
            assert_eq!(render(&engine, &source, ctx.clone()), "true", "{name}");
        }
    }

    #[test]
    fn test_parse_locale() {
        assert_eq!(parse_locale("en-us"), Some(Locale::en_US));
        assert_eq!(parse_locale("fr_FR"), Some(Locale::fr_FR));
        assert!(parse_locale("zz-zz").is_none());
    }
}
