//! Site configuration management.

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Name of the configuration file at the site root.
pub const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure for Quire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Site-wide settings.
    #[serde(default)]
    pub site: SiteConfig,

    /// Syndication feeds.
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,

    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,
}

/// Site-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site title.
    #[serde(default)]
    pub title: Option<String>,

    /// Site description for meta tags and feeds.
    #[serde(default)]
    pub description: Option<String>,

    /// Base URL for the site (e.g., "https://example.com").
    #[serde(default)]
    pub url: Option<String>,

    /// Site author name.
    #[serde(default)]
    pub author: Option<String>,

    /// Language code, also used as the locale for date formatting.
    #[serde(default = "default_language")]
    pub language: String,

    /// Twitter/X handle for social cards.
    #[serde(default)]
    pub twitter_handle: Option<String>,

    /// Image used when a page does not set one.
    #[serde(default)]
    pub default_image: Option<String>,

    /// Template applied to every page title, e.g. `"{{ title }} | {{ site.title }}"`.
    #[serde(default)]
    pub title_template: Option<String>,
}

/// A single RSS and/or Atom feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Unique feed name.
    pub name: String,

    /// Feed title, falls back to the site title.
    #[serde(default)]
    pub title: Option<String>,

    /// Feed description, falls back to the site description.
    #[serde(default)]
    pub description: Option<String>,

    /// URL prefix the items are taken from (e.g. "/blog"). All pages when unset.
    #[serde(default)]
    pub source: Option<String>,

    /// RSS output filename.
    #[serde(default)]
    pub output_rss: Option<String>,

    /// Atom output filename.
    #[serde(default)]
    pub output_atom: Option<String>,

    /// Maximum number of items.
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
}

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Whether to minify HTML and CSS output.
    #[serde(default = "default_true")]
    pub minify: bool,

    /// Syntax highlighting settings.
    #[serde(default)]
    pub syntax_highlighting: SyntaxHighlightingConfig,

    /// Words per minute used by `readtime`.
    #[serde(default = "default_reading_speed")]
    pub reading_speed: u32,
}

/// Syntax highlighting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxHighlightingConfig {
    /// Whether fenced code blocks are highlighted.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Syntect theme name.
    #[serde(default = "default_syntax_theme")]
    pub theme: String,
}

// Default value functions
fn default_language() -> String {
    "en-us".to_string()
}

fn default_true() -> bool {
    true
}

fn default_feed_limit() -> usize {
    20
}

fn default_reading_speed() -> u32 {
    200
}

fn default_syntax_theme() -> String {
    "base16-ocean.dark".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            url: None,
            author: None,
            language: default_language(),
            twitter_handle: None,
            default_image: None,
            title_template: None,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            minify: true,
            syntax_highlighting: SyntaxHighlightingConfig::default(),
            reading_speed: default_reading_speed(),
        }
    }
}

impl Default for SyntaxHighlightingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            theme: default_syntax_theme(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` from a site root, falling back to defaults when absent.
    pub fn load_or_default(site_root: &Path) -> Result<Self> {
        let path = site_root.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(?path, "no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration using the config crate, layering `QUIRE_` environment variables.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("QUIRE").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.feeds.is_empty() && self.base_url().is_none() {
            return Err(CoreError::config(
                "feeds: site.url is required when feeds are configured",
            ));
        }

        let mut names = HashSet::new();
        let mut outputs = HashSet::new();
        for feed in &self.feeds {
            if feed.name.is_empty() {
                return Err(CoreError::config("feeds: name cannot be empty"));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(CoreError::config(format!(
                    "feeds.{}: duplicate feed name",
                    feed.name
                )));
            }
            if feed.output_rss.is_none() && feed.output_atom.is_none() {
                return Err(CoreError::config(format!(
                    "feeds.{}: set output_rss and/or output_atom",
                    feed.name
                )));
            }
            for output in feed.output_rss.iter().chain(feed.output_atom.iter()) {
                if !outputs.insert(output.trim_start_matches('/')) {
                    return Err(CoreError::config(format!(
                        "feeds.{}: output file {output} is already used by another feed",
                        feed.name
                    )));
                }
            }
        }

        if self.build.reading_speed == 0 {
            return Err(CoreError::config(
                "build.reading_speed must be greater than zero",
            ));
        }

        if self.site.url.as_deref().is_some_and(|u| u.ends_with('/')) {
            tracing::warn!("site.url should not have a trailing slash");
        }

        Ok(())
    }

    /// The site base URL without a trailing slash, if configured.
    pub fn base_url(&self) -> Option<&str> {
        self.site
            .url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty())
    }

    /// Get the full URL for a path, if a base URL is configured.
    pub fn url_for(&self, path: &str) -> Option<String> {
        let base = self.base_url()?;
        let path = path.trim_start_matches('/');
        Some(format!("{base}/{path}"))
    }
}
