//! Sitemap generation.
//!
//! Generates `sitemap.xml` over every page of the registry except the
//! not-found page.

use chrono::{DateTime, Utc};
use quire_core::{Config, Page, content::date_from_fields};
use tracing::debug;

use crate::{diagnostics::Diagnostic, registry::FrozenRegistry};

/// Output filename of the sitemap.
pub const SITEMAP_FILE: &str = "sitemap.xml";

/// Fields consulted, in order, for `<lastmod>`: `updated`, then the page date fields.
pub const LASTMOD_FIELDS: &[&str] = &["updated", "date", "published", "created", "pubDate"];

/// Change frequency for sitemap entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFreq {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl ChangeFreq {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

/// A sitemap URL entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapUrl {
    /// Absolute URL.
    pub loc: String,

    /// Last modification date.
    pub lastmod: Option<DateTime<Utc>>,

    pub changefreq: ChangeFreq,

    /// Priority (0.0 to 1.0).
    pub priority: f32,
}

/// Sitemap generator.
#[derive(Debug)]
pub struct SitemapGenerator<'a> {
    config: &'a Config,
}

impl<'a> SitemapGenerator<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Generate sitemap XML, or a diagnostic when `site.url` is not configured.
    pub fn generate(&self, registry: &FrozenRegistry) -> std::result::Result<String, Diagnostic> {
        let Some(base) = self.config.base_url() else {
            return Err(Diagnostic::site(
                "sitemap skipped: site.url is not configured",
            ));
        };

        let pages = registry.all();
        debug!(count = pages.len(), "generating sitemap");

        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
        xml.push('\n');

        for page in pages {
            xml.push_str(&url_to_xml(&page_to_url(base, page)));
        }

        xml.push_str("</urlset>\n");
        Ok(xml)
    }
}

/// Convert a page to a sitemap URL entry.
///
/// The home page changes daily, section indexes weekly, top-level pages
/// monthly and anything deeper yearly.
pub fn page_to_url(base: &str, page: &Page) -> SitemapUrl {
    let lastmod = date_from_fields(&page.fields, LASTMOD_FIELDS);

    let depth = page.url.split('/').filter(|s| !s.is_empty()).count();
    let (changefreq, priority) = match depth {
        0 => (ChangeFreq::Daily, 1.0),
        _ if page.url.ends_with('/') => (ChangeFreq::Weekly, 0.8),
        1 => (ChangeFreq::Monthly, 0.6),
        _ => (ChangeFreq::Yearly, 0.5),
    };

    SitemapUrl {
        loc: format!("{base}{}", page.url),
        lastmod,
        changefreq,
        priority,
    }
}

fn url_to_xml(url: &SitemapUrl) -> String {
    let mut xml = String::from("  <url>\n");

    xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&url.loc)));

    if let Some(lastmod) = &url.lastmod {
        xml.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            lastmod.format("%Y-%m-%d")
        ));
    }

    xml.push_str(&format!(
        "    <changefreq>{}</changefreq>\n",
        url.changefreq.as_str()
    ));
    xml.push_str(&format!("    <priority>{:.1}</priority>\n", url.priority));

    xml.push_str("  </url>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use quire_core::{FieldValue, Fields, PageKind};

    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.site.url = Some("https://example.com".to_string());
        config
    }

    fn page(url: &str, kind: PageKind, fields: &[(&str, &str)]) -> Page {
        Page {
            url: url.to_string(),
            kind,
            source: PathBuf::from(format!("{}.md", url.trim_matches('/'))),
            expansion_index: 0,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), FieldValue::String(v.to_string())))
                .collect::<Fields>(),
            body: String::new(),
        }
    }

    #[test]
    fn test_generate_sitemap() {
        let registry = FrozenRegistry::freeze(vec![
            page("/", PageKind::Ordinary, &[]),
            page(
                "/blog/hello",
                PageKind::Ordinary,
                &[("date", "2024-01-15"), ("updated", "2024-02-01")],
            ),
            page("/404", PageKind::NotFound, &[]),
        ])
        .expect("freeze");

        let config = test_config();
        let xml = SitemapGenerator::new(&config)
            .generate(&registry)
            .expect("sitemap");

        assert!(xml.contains(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<loc>https://example.com/</loc>"));
        assert!(xml.contains("<loc>https://example.com/blog/hello</loc>"));
        assert!(xml.contains("<lastmod>2024-02-01</lastmod>"));
        assert!(!xml.contains("/404"));
    }

    #[test]
    fn test_missing_base_url_is_a_diagnostic() {
        let registry = FrozenRegistry::freeze(vec![]).expect("freeze");
        let config = Config::default();
        let diagnostic = SitemapGenerator::new(&config)
            .generate(&registry)
            .unwrap_err();
        assert!(diagnostic.message.contains("site.url"));
    }

    #[test]
    fn test_heuristics_by_depth() {
        let home = page_to_url("https://x.io", &page("/", PageKind::Ordinary, &[]));
        assert_eq!((home.changefreq, home.priority), (ChangeFreq::Daily, 1.0));

        let section = page_to_url("https://x.io", &page("/blog/", PageKind::Ordinary, &[]));
        assert_eq!(section.changefreq, ChangeFreq::Weekly);

        let about = page_to_url("https://x.io", &page("/about", PageKind::Ordinary, &[]));
        assert_eq!(about.changefreq, ChangeFreq::Monthly);

        let post = page_to_url(
            "https://x.io",
            &page("/blog/post", PageKind::Ordinary, &[("published", "2023-03-04")]),
        );
        assert_eq!(post.changefreq, ChangeFreq::Yearly);
        assert_eq!(
            post.lastmod.map(|d| d.format("%Y-%m-%d").to_string()).as_deref(),
            Some("2023-03-04")
        );
    }

    #[test]
    fn test_unreadable_updated_leaves_lastmod_empty() {
        let url = page_to_url(
            "https://x.io",
            &page(
                "/blog/post",
                PageKind::Ordinary,
                &[("updated", "last week"), ("date", "2024-01-15")],
            ),
        );
        assert_eq!(url.lastmod, None);
    }

    #[test]
    fn test_lastmod_fields_extend_date_fields() {
        assert_eq!(LASTMOD_FIELDS[0], "updated");
        assert_eq!(&LASTMOD_FIELDS[1..], quire_core::content::DATE_FIELDS);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a&b<c>"), "a&amp;b&lt;c&gt;");
        assert_eq!(escape_xml("\"'"), "&quot;&apos;");
    }
}
