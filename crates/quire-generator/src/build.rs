//! Build orchestration.
//!
//! Coordinates the full site build: discovery, parsing, the two expansion
//! passes, the registry freeze, rendering, feeds, the sitemap and finally
//! the atomic output commit.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use quire_core::{Config, CoreError, Page, PageTemplate, TemplateKind};
use quire_parser::{MarkdownParser, ParserError, SyntaxError, markdown_parser};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    assets::{AssetError, CacheBuster, StaticAsset},
    collector::{CollectorError, ContentCollector},
    diagnostics::{Diagnostic, date_diagnostics},
    discover::{ContentDiscoverer, DiscoverError, Discovery},
    expand::{ExpandError, Expander},
    feed::{FeedError, FeedGenerator},
    html::{PageRenderer, RenderError, register_templates},
    minify::Minifier,
    output::{OutputError, OutputWriter, output_path},
    registry::{FrozenRegistry, RegistryError},
    sitemap::{SITEMAP_FILE, SitemapGenerator},
    structural::{StructuralError, StructuralSet},
    template::{PageGraph, TemplateEngine, TemplateError},
};

/// URL of the site stylesheet read from `_/theme.css`.
pub const THEME_CSS_URL: &str = "/theme.css";
/// URL of the generated highlighting stylesheet.
pub const HIGHLIGHT_CSS_URL: &str = "/highlight.css";

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] CoreError),

    /// Markdown or highlighter setup error.
    #[error(transparent)]
    Parser(#[from] ParserError),

    /// Walking the site root failed.
    #[error(transparent)]
    Discover(#[from] DiscoverError),

    /// Structural fragments could not be loaded.
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// A content file could not be parsed.
    #[error(transparent)]
    Collector(#[from] CollectorError),

    /// A template failed to compile.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Field evaluation or dynamic expansion failed.
    #[error(transparent)]
    Expand(#[from] ExpandError),

    /// Two pages share a URL.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A page failed to render.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Asset processing error.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Feed generation error.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Staging or committing the output failed.
    #[error(transparent)]
    Output(#[from] OutputError),
}

impl From<SyntaxError> for BuildError {
    fn from(err: SyntaxError) -> Self {
        Self::Parser(ParserError::Syntax(err))
    }
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Build statistics.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Number of pages rendered, dynamic and not-found pages included.
    pub pages: usize,

    /// Pages produced by dynamic templates.
    pub dynamic_pages: usize,

    /// Feed documents written (RSS and Atom count separately).
    pub feeds: usize,

    /// Static and generated assets written, busted copies included.
    pub assets: usize,

    /// Whether `sitemap.xml` was written.
    pub sitemap: bool,

    /// Non-fatal diagnostics.
    pub warnings: Vec<Diagnostic>,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

/// The registry and its inputs, prepared up to the freeze.
#[derive(Debug)]
pub struct Site {
    pub structural: StructuralSet,
    pub statics: Vec<StaticAsset>,
    /// Generated stylesheets by URL, with their output text.
    pub generated: Vec<(String, String)>,
    pub assets: Arc<CacheBuster>,
    pub registry: Arc<FrozenRegistry>,
    pub dynamic_pages: usize,
}

/// A fully rendered build that has not been written yet.
#[derive(Debug)]
pub struct BuildPlan {
    pub writer: OutputWriter,
    pub stats: BuildStats,
}

/// Site builder that orchestrates the build process.
#[derive(Debug)]
pub struct Builder {
    config: Config,
    site_root: PathBuf,
    output_dir: PathBuf,
    /// Configuration file the site was loaded from, kept out of the output.
    config_path: Option<PathBuf>,
}

impl Builder {
    /// Create a new builder.
    #[must_use]
    pub fn new(
        config: Config,
        site_root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            site_root: site_root.into(),
            output_dir: output_dir.into(),
            config_path: None,
        }
    }

    /// Record the file the configuration came from. When it lies inside the
    /// site root it is not published as a static asset.
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Override minification from the configuration.
    #[must_use]
    pub fn with_minify(mut self, minify: bool) -> Self {
        self.config.build.minify = minify;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute the full build process and replace the output directory.
    pub fn build(&self) -> Result<BuildStats> {
        let start = Instant::now();
        let BuildPlan { writer, mut stats } = self.plan()?;

        info!(output = %self.output_dir.display(), "writing output");
        writer.commit()?;

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            pages = stats.pages,
            dynamic_pages = stats.dynamic_pages,
            feeds = stats.feeds,
            assets = stats.assets,
            warnings = stats.warnings.len(),
            duration_ms = stats.duration_ms,
            "build complete"
        );
        Ok(stats)
    }

    /// Run every stage of the build without touching the output directory.
    pub fn check(&self) -> Result<BuildStats> {
        let start = Instant::now();
        let mut stats = self.plan()?.stats;
        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Discover, parse, expand and freeze the registry.
    pub fn prepare(&self, markdown: &MarkdownParser) -> Result<Site> {
        self.config.validate()?;
        let minifier = Minifier::new(self.config.build.minify);

        // 1. Discover
        let discovery = self.discover()?;

        // 2. Structural set, content templates and assets
        let structural_entries: Vec<_> = discovery.structural().collect();
        let structural = StructuralSet::load(&structural_entries)?;
        let content_entries: Vec<_> = discovery.content().collect();
        let templates = ContentCollector::new().collect(&content_entries)?;
        let statics: Vec<StaticAsset> = discovery.assets().map(StaticAsset::from_entry).collect();

        // Generated stylesheets are hashed with their final bytes.
        let mut generated = Vec::new();
        if let Some(css) = &structural.theme_css {
            generated.push((THEME_CSS_URL.to_string(), minifier.css(css).into_owned()));
        }
        if let Some(highlighter) = markdown.highlighter() {
            let css = highlighter.theme_css()?;
            generated.push((HIGHLIGHT_CSS_URL.to_string(), minifier.css(&css).into_owned()));
        }
        let assets = Arc::new(
            generated
                .iter()
                .fold(CacheBuster::new(), |buster, (url, css)| {
                    buster.with_generated(url.clone(), css.clone().into_bytes())
                })
                .with_statics(&statics),
        );

        let (dynamic, ordinary): (Vec<&PageTemplate>, Vec<&PageTemplate>) = templates
            .iter()
            .partition(|t| matches!(t.kind(), TemplateKind::Dynamic { .. }));

        // 3. Eager fields of ordinary pages, with no registry in scope
        info!(count = ordinary.len(), "resolving ordinary pages");
        let empty = self.engine(&structural, Arc::default(), &assets)?;
        let ordinary_pages = expand_all(&Expander::new(&empty), &ordinary)?;

        // 4. Dynamic templates, evaluated against the ordinary snapshot
        info!(count = dynamic.len(), "expanding dynamic templates");
        let snapshot = Arc::new(FrozenRegistry::freeze(ordinary_pages.clone())?);
        let snapshot_engine = self.engine(&structural, snapshot, &assets)?;
        let dynamic_pages = expand_all(&Expander::new(&snapshot_engine), &dynamic)?;
        let dynamic_count = dynamic_pages.len();

        // 5. Freeze
        let mut pages = ordinary_pages;
        pages.extend(dynamic_pages);
        let registry = Arc::new(FrozenRegistry::freeze(pages)?);

        Ok(Site {
            structural,
            statics,
            generated,
            assets,
            registry,
            dynamic_pages: dynamic_count,
        })
    }

    /// Render the site into an uncommitted [`OutputWriter`].
    pub fn plan(&self) -> Result<BuildPlan> {
        info!(
            site = %self.site_root.display(),
            output = %self.output_dir.display(),
            "starting build"
        );
        let minifier = Minifier::new(self.config.build.minify);
        let markdown = markdown_parser(&self.config.build.syntax_highlighting)?;
        let site = self.prepare(&markdown)?;

        // 6. Render against the frozen registry
        let mut engine = self.engine(&site.structural, Arc::clone(&site.registry), &site.assets)?;
        register_templates(&mut engine, &self.config, &site.structural, &site.registry)?;

        let renderer = PageRenderer::new(&self.config, &engine, &markdown, &site.structural)?;
        let rendered = renderer.render_all(site.registry.pages())?;

        let mut stats = BuildStats {
            pages: rendered.len(),
            dynamic_pages: site.dynamic_pages,
            ..BuildStats::default()
        };
        stats.warnings.extend(renderer.diagnostics().iter().cloned());
        stats.warnings.extend(date_diagnostics(site.registry.pages()));

        let mut writer = OutputWriter::new(&self.output_dir);
        for page in rendered {
            stats.warnings.extend(page.diagnostics);
            let origin = page.source.display().to_string();
            writer.add_bytes(output_path(&page.url), minifier.html(&page.html).as_bytes(), origin)?;
        }

        // 7. Feeds
        let feeds = FeedGenerator::new(&self.config).generate_all(&site.registry)?;
        stats.feeds = feeds.len();
        for feed in feeds {
            info!(feed = %feed.feed, path = %feed.path, "generated feed");
            writer.add_bytes(&feed.path, feed.xml, format!("feed {}", feed.feed))?;
        }

        // 8. Sitemap
        match SitemapGenerator::new(&self.config).generate(&site.registry) {
            Ok(xml) => {
                writer.add_bytes(SITEMAP_FILE, xml, "sitemap")?;
                stats.sitemap = true;
            }
            Err(diagnostic) => stats.warnings.push(diagnostic),
        }

        // 9. Assets
        stats.assets = stage_assets(&mut writer, &site.assets, &site.statics, &site.generated)?;

        debug!(files = writer.len(), "build planned");
        Ok(BuildPlan { writer, stats })
    }

    fn discover(&self) -> Result<Discovery> {
        let mut discoverer = ContentDiscoverer::new(&self.site_root);
        let skipped = std::iter::once(&self.output_dir).chain(self.config_path.as_ref());
        for path in skipped {
            if let Some(inside) = within_root(&self.site_root, path) {
                discoverer = discoverer.exclude(inside);
            }
        }
        Ok(discoverer.discover()?)
    }

    fn engine(
        &self,
        structural: &StructuralSet,
        registry: Arc<FrozenRegistry>,
        assets: &Arc<CacheBuster>,
    ) -> Result<TemplateEngine> {
        let graph = Arc::new(PageGraph::new(registry));
        Ok(TemplateEngine::new(
            &self.config,
            structural,
            graph,
            Arc::clone(assets),
        )?)
    }
}

fn expand_all(expander: &Expander<'_>, templates: &[&PageTemplate]) -> Result<Vec<Page>> {
    let pages = templates
        .par_iter()
        .map(|t| expander.expand(t))
        .collect::<Vec<_>>()
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(pages.into_iter().flatten().collect())
}

/// Add static files, generated stylesheets and busted copies to `writer`.
///
/// A busted static file is written under both names; a busted generated
/// stylesheet only under its busted name.
fn stage_assets(
    writer: &mut OutputWriter,
    assets: &CacheBuster,
    statics: &[StaticAsset],
    generated: &[(String, String)],
) -> Result<usize> {
    let manifest = assets.manifest();
    let mut count = 0;

    for asset in statics {
        writer.add_copy(
            asset.url.trim_start_matches('/'),
            &asset.source,
            asset.url.clone(),
        )?;
        count += 1;
        if let Some(busted) = manifest.get(&asset.url) {
            debug!(asset = %asset.url, busted, "writing busted copy");
            writer.add_copy(busted.trim_start_matches('/'), &asset.source, asset.url.clone())?;
            count += 1;
        }
    }

    for (url, css) in generated {
        let name = manifest.get(url).unwrap_or(url);
        writer.add_bytes(name.trim_start_matches('/'), css.as_bytes(), url.clone())?;
        count += 1;
    }

    Ok(count)
}

/// `path` as seen from the walk of `site_root`, if it lies inside it.
fn within_root(site_root: &Path, path: &Path) -> Option<PathBuf> {
    let root = std::path::absolute(site_root).ok()?;
    let path = std::path::absolute(path).ok()?;
    let relative = path.strip_prefix(&root).ok()?;
    (!relative.as_os_str().is_empty()).then(|| site_root.join(relative))
}
