//! Page rendering.
//!
//! Runs each page through its templates: deferred fields, body template,
//! markdown, content wrapper and finally the root layout. Header, nav and
//! footer are rendered once per build and shared by every page.

use std::{fmt, path::PathBuf};

use minijinja::Value;
use quire_core::{Config, Page, content::NOT_FOUND_URL};
use quire_parser::MarkdownParser;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    diagnostics::Diagnostic,
    expand::{Stage, page_bindings, resolve_fields},
    registry::FrozenRegistry,
    structural::StructuralSet,
    template::{self, TemplateEngine, describe_error, scope},
};

/// Name of the root layout template.
pub const LAYOUT_TEMPLATE: &str = "layout.html";
/// Name under which the content wrapper is registered.
pub const WRAPPER_TEMPLATE: &str = "_/content.md";
/// Name under which `site.title_template` is registered.
pub const TITLE_TEMPLATE: &str = "_/title";

/// Built-in root layout, used unless `_/layout.html` exists.
pub const DEFAULT_LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="{{ site.language }}">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{ title }}</title>
{% if seo.description %}<meta name="description" content="{{ seo.description }}">
{% endif %}{% if seo.author %}<meta name="author" content="{{ seo.author }}">
{% endif %}{% if seo.canonical_url %}<link rel="canonical" href="{{ seo.canonical_url }}">
<meta property="og:url" content="{{ seo.canonical_url }}">
{% endif %}<meta property="og:title" content="{{ title }}">
<meta property="og:type" content="website">
{% if site.title %}<meta property="og:site_name" content="{{ site.title }}">
{% endif %}{% if seo.description %}<meta property="og:description" content="{{ seo.description }}">
{% endif %}{% if seo.image %}<meta property="og:image" content="{{ seo.image }}">
<meta name="twitter:image" content="{{ seo.image }}">
{% endif %}<meta name="twitter:card" content="{{ seo.twitter_card }}">
<meta name="twitter:title" content="{{ title }}">
{% if seo.twitter_handle %}<meta name="twitter:site" content="{{ seo.twitter_handle }}">
{% endif %}{% if theme_stylesheet %}<link rel="stylesheet" href="{{ cache_bust(path="/theme.css") }}">
{% endif %}{% if syntax_highlighting_enabled %}<link rel="stylesheet" href="{{ cache_bust(path="/highlight.css") }}">
{% endif %}</head>
<body class="{{ path_class }}">
{% if header %}<header>{{ header }}</header>
{% endif %}{% if nav %}<nav>{{ nav }}</nav>
{% endif %}<main>{{ main_content }}</main>
{% if footer %}<footer>{{ footer }}</footer>
{% endif %}</body>
</html>
"#;

/// Step of the page pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Fields,
    Body,
    Wrapper,
    Title,
    Layout,
    Fragment,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fields => "frontmatter",
            Self::Body => "body",
            Self::Wrapper => "content wrapper",
            Self::Title => "title template",
            Self::Layout => "layout",
            Self::Fragment => "fragment",
        };
        f.write_str(name)
    }
}

/// A page or fragment that failed to render.
#[derive(Debug, Error)]
#[error("{}: {stage} rendering failed: {detail}", path.display())]
pub struct RenderError {
    pub path: PathBuf,
    pub stage: RenderStage,
    pub detail: String,
}

impl RenderError {
    fn new(path: impl Into<PathBuf>, stage: RenderStage, err: &minijinja::Error) -> Self {
        Self {
            path: path.into(),
            stage,
            detail: describe_error(err),
        }
    }
}

/// Result type for rendering.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Social and search metadata for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeoContext {
    pub canonical_url: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub image: Option<String>,
    pub twitter_card: &'static str,
    pub twitter_handle: Option<String>,
}

impl SeoContext {
    /// Build the metadata for `page`, and a diagnostic when a social card
    /// is expected but no image is available.
    pub fn for_page(config: &Config, page: &Page) -> (Self, Option<Diagnostic>) {
        let site = &config.site;
        let field = |name: &str| {
            page.fields
                .get(name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };

        let image = field("image")
            .or_else(|| site.default_image.clone())
            .map(|img| absolute_url(config, &img));
        let twitter_handle = site.twitter_handle.clone().filter(|h| !h.is_empty());
        let diagnostic = (twitter_handle.is_some() && image.is_none()).then(|| {
            Diagnostic::for_file(
                &page.source,
                format!("{}: missing social image (set `image` or site.default_image)", page.url),
            )
        });

        let seo = Self {
            canonical_url: config.url_for(&page.url),
            description: field("description").or_else(|| site.description.clone()),
            author: field("author").or_else(|| site.author.clone()),
            twitter_card: if image.is_some() {
                "summary_large_image"
            } else {
                "summary"
            },
            image,
            twitter_handle,
        };
        (seo, diagnostic)
    }
}

fn absolute_url(config: &Config, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("//") {
        return url.to_string();
    }
    config.url_for(url).unwrap_or_else(|| url.to_string())
}

/// Template name of a page body: its source path with `/` separators.
pub fn body_template_name(page: &Page) -> String {
    page.source.to_string_lossy().replace('\\', "/")
}

/// Register page bodies, structural fragments and the layout with `engine`.
pub fn register_templates(
    engine: &mut TemplateEngine,
    config: &Config,
    structural: &StructuralSet,
    registry: &FrozenRegistry,
) -> template::Result<()> {
    for page in registry.pages() {
        let name = body_template_name(page);
        if !engine.has_template(&name) {
            engine.add_template(name, page.body.clone())?;
        }
    }

    let fragments = [
        ("_/header.md", &structural.header),
        ("_/nav.md", &structural.nav),
        ("_/footer.md", &structural.footer),
        (WRAPPER_TEMPLATE, &structural.content_wrapper),
    ];
    for (name, source) in fragments {
        if let Some(source) = source {
            engine.add_template(name, source.clone())?;
        }
    }
    if let Some(title) = &config.site.title_template {
        engine.add_template(TITLE_TEMPLATE, title.clone())?;
    }
    engine.add_template(
        LAYOUT_TEMPLATE,
        structural.layout.clone().unwrap_or_else(|| DEFAULT_LAYOUT.to_string()),
    )
}

/// The final HTML of one page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub source: PathBuf,
    pub html: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Header, nav and footer converted to HTML.
#[derive(Debug, Clone, Default)]
struct Fragments {
    header: String,
    nav: String,
    footer: String,
}

/// Renders pages once the registry is frozen.
#[derive(Debug)]
pub struct PageRenderer<'a> {
    config: &'a Config,
    engine: &'a TemplateEngine,
    markdown: &'a MarkdownParser,
    fragments: Fragments,
    has_wrapper: bool,
    has_theme: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> PageRenderer<'a> {
    /// Prepare a renderer; the shared fragments are rendered here.
    ///
    /// `engine` must have gone through [`register_templates`].
    pub fn new(
        config: &'a Config,
        engine: &'a TemplateEngine,
        markdown: &'a MarkdownParser,
        structural: &StructuralSet,
    ) -> Result<Self> {
        let mut renderer = Self {
            config,
            engine,
            markdown,
            fragments: Fragments::default(),
            has_wrapper: structural.content_wrapper.is_some(),
            has_theme: structural.theme_css.is_some(),
            diagnostics: Vec::new(),
        };

        let ctx = scope(engine.site(), &Default::default(), &[]);
        let mut render_fragment = |name: &str, present: bool| -> Result<String> {
            if !present {
                return Ok(String::new());
            }
            let text = engine
                .render(name, &ctx)
                .map_err(|e| RenderError::new(name, RenderStage::Fragment, &e))?;
            Ok(renderer_markdown(markdown, &text, name, &mut renderer.diagnostics))
        };
        let header = render_fragment("_/header.md", structural.header.is_some())?;
        let nav = render_fragment("_/nav.md", structural.nav.is_some())?;
        let footer = render_fragment("_/footer.md", structural.footer.is_some())?;
        renderer.fragments = Fragments { header, nav, footer };

        Ok(renderer)
    }

    /// Diagnostics recorded while rendering the shared fragments.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Render every page in parallel. The first failure in page order is returned.
    pub fn render_all(&self, pages: &[Page]) -> Result<Vec<RenderedPage>> {
        info!(count = pages.len(), "rendering pages");
        pages
            .par_iter()
            .map(|page| self.render_page(page))
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    /// Render one page to its final HTML.
    pub fn render_page(&self, page: &Page) -> Result<RenderedPage> {
        debug!(url = %page.url, "rendering page");
        let source = &page.source;
        let bindings = page_bindings(&page.url);

        let fields = resolve_fields(self.engine, source, &page.fields, Stage::Deferred, &bindings)
            .map_err(|e| RenderError {
                path: source.clone(),
                stage: RenderStage::Fields,
                detail: e.to_string(),
            })?;
        let mut resolved = page.clone();
        resolved.fields = fields;

        let (seo, seo_diagnostic) = SeoContext::for_page(self.config, &resolved);
        let mut diagnostics: Vec<Diagnostic> = seo_diagnostic.into_iter().collect();

        let seo_value = Value::from_serialize(&seo);
        let page_value = self.engine.page_view(&page.url).unwrap_or_else(|| Value::from(()));
        let mut extra: Vec<(&str, Value)> = bindings.to_vec();
        extra.push(("seo", seo_value));
        extra.push(("page", page_value));

        let body_ctx = scope(self.engine.site(), &resolved.fields, &extra);
        let body_md = self
            .engine
            .render(&body_template_name(page), &body_ctx)
            .map_err(|e| RenderError::new(source, RenderStage::Body, &e))?;
        let content = self.markdown_html(&body_md, source, &mut diagnostics);

        let main_content = if self.has_wrapper {
            let mut wrapper_extra = extra.clone();
            wrapper_extra.push(("content", Value::from_safe_string(content)));
            let ctx = scope(self.engine.site(), &resolved.fields, &wrapper_extra);
            let wrapped = self
                .engine
                .render(WRAPPER_TEMPLATE, &ctx)
                .map_err(|e| RenderError::new(source, RenderStage::Wrapper, &e))?;
            self.markdown_html(&wrapped, source, &mut diagnostics)
        } else {
            content
        };

        let title = self.title(&resolved)?;
        let mut layout_extra = extra;
        layout_extra.extend([
            ("title", Value::from(title)),
            ("header", Value::from_safe_string(self.fragments.header.clone())),
            ("nav", Value::from_safe_string(self.fragments.nav.clone())),
            ("footer", Value::from_safe_string(self.fragments.footer.clone())),
            ("main_content", Value::from_safe_string(main_content)),
            (
                "syntax_highlighting_enabled",
                Value::from(self.markdown.highlighter().is_some()),
            ),
            ("theme_stylesheet", Value::from(self.has_theme)),
        ]);
        let layout_ctx = scope(self.engine.site(), &resolved.fields, &layout_extra);
        let html = self
            .engine
            .render(LAYOUT_TEMPLATE, &layout_ctx)
            .map_err(|e| RenderError::new(source, RenderStage::Layout, &e))?;

        Ok(RenderedPage {
            url: page.url.clone(),
            source: source.clone(),
            html,
            diagnostics,
        })
    }

    /// The page title passed through `site.title_template`.
    ///
    /// A not-found page without a title falls back to the site title.
    fn title(&self, page: &Page) -> Result<String> {
        let site_title = self.config.site.title.clone().unwrap_or_default();
        let title = match page.title() {
            Some(title) => title.to_string(),
            None if page.url == NOT_FOUND_URL => site_title,
            None => String::new(),
        };
        if self.config.site.title_template.is_none() {
            return Ok(title);
        }
        let ctx = scope(self.engine.site(), &Default::default(), &[("title", Value::from(title))]);
        self.engine
            .render(TITLE_TEMPLATE, &ctx)
            .map_err(|e| RenderError::new(&page.source, RenderStage::Title, &e))
    }

    fn markdown_html(&self, text: &str, source: &std::path::Path, diagnostics: &mut Vec<Diagnostic>) -> String {
        renderer_markdown(self.markdown, text, &source.display().to_string(), diagnostics)
    }
}

fn renderer_markdown(
    markdown: &MarkdownParser,
    text: &str,
    source: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> String {
    let output = markdown.render_markdown(text);
    for warning in output.highlight_warnings {
        diagnostics.push(Diagnostic::for_file(
            source,
            format!("{warning}, rendered without highlighting"),
        ));
    }
    output.html
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quire_core::{FieldValue, Fields, PageKind};
    use quire_parser::SyntaxHighlighter;

    use super::*;
    use crate::{assets::CacheBuster, template::PageGraph};

    fn page(url: &str, source: &str, fields: &[(&str, &str)], body: &str) -> Page {
        Page {
            url: url.to_string(),
            kind: if url == NOT_FOUND_URL {
                PageKind::NotFound
            } else {
                PageKind::Ordinary
            },
            source: PathBuf::from(source),
            expansion_index: 0,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), FieldValue::from_text(*v)))
                .collect::<Fields>(),
            body: body.to_string(),
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.site.title = Some("Demo".to_string());
        config.site.url = Some("https://example.com".to_string());
        config
    }

    struct Fixture {
        config: Config,
        engine: TemplateEngine,
        structural: StructuralSet,
        pages: Vec<Page>,
    }

    fn fixture(config: Config, structural: StructuralSet, pages: Vec<Page>) -> Fixture {
        let registry = Arc::new(FrozenRegistry::freeze(pages).expect("freeze"));
        let buster = CacheBuster::new()
            .with_generated("/theme.css", "a{}")
            .with_generated("/highlight.css", ".hl{}");
        let mut engine = TemplateEngine::new(
            &config,
            &structural,
            Arc::new(PageGraph::new(Arc::clone(&registry))),
            Arc::new(buster),
        )
        .expect("engine");
        register_templates(&mut engine, &config, &structural, &registry).expect("register");
        Fixture {
            config,
            engine,
            structural,
            pages: registry.pages().to_vec(),
        }
    }

    fn render(fx: &Fixture, markdown: &MarkdownParser, url: &str) -> Result<RenderedPage> {
        let renderer = PageRenderer::new(&fx.config, &fx.engine, markdown, &fx.structural)?;
        let page = fx.pages.iter().find(|p| p.url == url).expect("page");
        renderer.render_page(page)
    }

    #[test]
    fn test_render_body_template_then_markdown() {
        let fx = fixture(
            config(),
            StructuralSet::default(),
            vec![page(
                "/about",
                "about.md",
                &[("title", "About")],
                "# {{ title }}\n\nOn {{ site.title }}.",
            )],
        );

        let out = render(&fx, &MarkdownParser::new(), "/about").expect("render");

        assert!(out.html.contains("<h1>About</h1>"));
        assert!(out.html.contains("<p>On Demo.</p>"));
        assert!(out.html.contains("<title>About</title>"));
        assert!(out.html.contains(r#"<link rel="canonical" href="https://example.com/about">"#));
        assert!(out.html.contains(r#"<body class="about">"#));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_wrapper_and_fragments() {
        let structural = StructuralSet {
            header: Some("**{{ site.title }}**".to_string()),
            content_wrapper: Some(
                "{% if path_class is startingwith(\"blog\") %}<h1>{{ title }}</h1>\n\n{% endif %}{{ content }}"
                    .to_string(),
            ),
            ..StructuralSet::default()
        };
        let fx = fixture(
            config(),
            structural,
            vec![
                page("/blog/a", "blog/a.md", &[("title", "Post")], "text"),
                page("/about", "about.md", &[("title", "About")], "text"),
            ],
        );
        let md = MarkdownParser::new();

        let post = render(&fx, &md, "/blog/a").expect("render");
        assert!(post.html.contains("<h1>Post</h1>"));
        assert!(post.html.contains("<header><p><strong>Demo</strong></p>\n</header>"));

        let about = render(&fx, &md, "/about").expect("render");
        assert!(!about.html.contains("<h1>About</h1>"));
    }

    #[test]
    fn test_title_template_and_escaping() {
        let mut config = config();
        config.site.title_template = Some("{{ title }} | {{ site.title }}".to_string());
        let fx = fixture(
            config,
            StructuralSet::default(),
            vec![page("/a", "a.md", &[("title", "Q&A")], "hi")],
        );

        let out = render(&fx, &MarkdownParser::new(), "/a").expect("render");
        assert!(out.html.contains("<title>Q&amp;A | Demo</title>"));
    }

    #[test]
    fn test_deferred_fields_resolved_before_body() {
        let fx = fixture(
            config(),
            StructuralSet::default(),
            vec![
                page(
                    "/blog/",
                    "blog/index.md",
                    &[("title", "Blog"), ("count", "{{ pages(within=\"/blog\") | length }}")],
                    "{{ count }} posts",
                ),
                page("/blog/a", "blog/a.md", &[("title", "A")], ""),
                page("/blog/b", "blog/b.md", &[("title", "B")], ""),
            ],
        );

        let out = render(&fx, &MarkdownParser::new(), "/blog/").expect("render");
        assert!(out.html.contains("<p>2 posts</p>"));
    }

    #[test]
    fn test_undefined_reference_reports_source() {
        let fx = fixture(
            config(),
            StructuralSet::default(),
            vec![page("/a", "a.md", &[("title", "A")], "{{ nope }}")],
        );

        let err = render(&fx, &MarkdownParser::new(), "/a").unwrap_err();
        assert_eq!(err.stage, RenderStage::Body);
        assert_eq!(err.path, PathBuf::from("a.md"));
        assert!(err.to_string().contains("a.md"));
    }

    #[test]
    fn test_seo_context() {
        let mut config = config();
        config.site.description = Some("Site description".to_string());
        config.site.twitter_handle = Some("@demo".to_string());
        let with_image = page("/a", "a.md", &[("title", "A"), ("image", "/img/a.png")], "");
        let without = page("/b", "b.md", &[("title", "B"), ("description", "Own")], "");

        let (seo, diagnostic) = SeoContext::for_page(&config, &with_image);
        assert_eq!(seo.image.as_deref(), Some("https://example.com/img/a.png"));
        assert_eq!(seo.twitter_card, "summary_large_image");
        assert_eq!(seo.description.as_deref(), Some("Site description"));
        assert!(diagnostic.is_none());

        let (seo, diagnostic) = SeoContext::for_page(&config, &without);
        assert!(seo.image.is_none());
        assert_eq!(seo.twitter_card, "summary");
        assert_eq!(seo.description.as_deref(), Some("Own"));
        assert!(diagnostic.is_some_and(|d| d.message.contains("missing social image")));
    }

    #[test]
    fn test_stylesheets_are_cache_busted() {
        let structural = StructuralSet {
            theme_css: Some("a{}".to_string()),
            ..StructuralSet::default()
        };
        let fx = fixture(
            config(),
            structural,
            vec![page("/a", "a.md", &[("title", "A")], "```nosuchlang\nx\n```\n")],
        );
        let md = MarkdownParser::with_highlighter(SyntaxHighlighter::default());

        let out = render(&fx, &md, "/a").expect("render");

        assert!(out.html.contains("/theme."));
        assert!(!out.html.contains("href=\"/theme.css\""));
        assert!(out.html.contains("/highlight."));
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn test_not_found_page_falls_back_to_site_title() {
        let fx = fixture(
            config(),
            StructuralSet::default(),
            vec![page(NOT_FOUND_URL, "[404].md", &[], "Nothing here")],
        );

        let out = render(&fx, &MarkdownParser::new(), NOT_FOUND_URL).expect("render");
        assert!(out.html.contains("<title>Demo</title>"));
        assert!(out.html.contains(r#"<body class="notfound">"#));
    }
}
