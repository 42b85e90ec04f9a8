//! Quire Generator Library
//!
//! Static site generation engine for Quire.
//!
//! # Modules
//!
//! - [`discover`] - Site root walk and file classification
//! - [`structural`] - Shared fragments under `_/`
//! - [`collector`] - Content parsing into page templates
//! - [`template`] - Template environment with registry queries
//! - [`expand`] - Field resolution and dynamic page expansion
//! - [`registry`] - Frozen page registry
//! - [`html`] - Page rendering
//! - [`feed`] - RSS and Atom feeds
//! - [`sitemap`] - XML sitemap generation
//! - [`assets`] - Static assets and cache busting
//! - [`minify`] - HTML and CSS minification
//! - [`output`] - Atomic output writer
//! - [`build`] - Build orchestration

pub mod assets;
pub mod build;
pub mod collector;
pub mod diagnostics;
pub mod discover;
pub mod expand;
pub mod feed;
pub mod html;
pub mod minify;
pub mod output;
pub mod registry;
pub mod sitemap;
pub mod structural;
pub mod template;

pub use assets::{AssetManifest, CacheBuster};
pub use build::{BuildError, BuildStats, Builder};
pub use collector::ContentCollector;
pub use diagnostics::Diagnostic;
pub use discover::ContentDiscoverer;
pub use expand::Expander;
pub use feed::FeedGenerator;
pub use html::PageRenderer;
pub use output::OutputWriter;
pub use registry::FrozenRegistry;
pub use sitemap::SitemapGenerator;
pub use structural::StructuralSet;
pub use template::TemplateEngine;
