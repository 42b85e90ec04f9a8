//! Syndication feeds.
//!
//! Every configured feed is rendered as RSS 2.0 and/or Atom from the frozen
//! registry. Items are the pages under the feed's source prefix, newest
//! first, capped at the feed limit.

use atom_syndication::{
    Category as AtomCategory, Entry, Feed, Generator, Link, Person, Text,
};
use chrono::{DateTime, Utc};
use quire_core::{Config, Page, config::FeedConfig};
use rss::{Category, ChannelBuilder, GuidBuilder, Item, ItemBuilder};
use thiserror::Error;
use tracing::debug;

use crate::registry::FrozenRegistry;

/// Fields tried, in order, for an item description.
const DESCRIPTION_FIELDS: &[&str] = &["description", "summary", "excerpt"];

const GENERATOR: &str = "quire";

/// Feed generation errors.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Absolute item links cannot be built without `site.url`.
    #[error("feeds.{feed}: site.url is required to generate feeds")]
    MissingSiteUrl { feed: String },
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// A serialized feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOutput {
    /// Feed name from the configuration.
    pub feed: String,
    /// Output path relative to the output directory.
    pub path: String,
    pub xml: String,
}

/// One feed entry with every fallback applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    /// Absolute URL.
    pub link: String,
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
}

/// Feed generator.
#[derive(Debug)]
pub struct FeedGenerator<'a> {
    config: &'a Config,
}

impl<'a> FeedGenerator<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Generate every configured feed.
    pub fn generate_all(&self, registry: &FrozenRegistry) -> Result<Vec<FeedOutput>> {
        let mut outputs = Vec::new();
        for feed in &self.config.feeds {
            outputs.extend(self.generate(feed, registry)?);
        }
        Ok(outputs)
    }

    /// Generate the RSS and Atom documents of one feed.
    pub fn generate(&self, feed: &FeedConfig, registry: &FrozenRegistry) -> Result<Vec<FeedOutput>> {
        let base = self
            .config
            .base_url()
            .ok_or_else(|| FeedError::MissingSiteUrl {
                feed: feed.name.clone(),
            })?;

        let items = self.items(feed, registry, base);
        debug!(feed = %feed.name, count = items.len(), limit = feed.limit, "generating feed");

        let mut outputs = Vec::new();
        if let Some(path) = &feed.output_rss {
            outputs.push(FeedOutput {
                feed: feed.name.clone(),
                path: path.trim_start_matches('/').to_string(),
                xml: self.rss(feed, &items, base),
            });
        }
        if let Some(path) = &feed.output_atom {
            outputs.push(FeedOutput {
                feed: feed.name.clone(),
                path: path.trim_start_matches('/').to_string(),
                xml: self.atom(feed, &items, base, path),
            });
        }
        Ok(outputs)
    }

    /// Pages of `feed`, newest first with undated pages last, truncated to the limit.
    pub fn items(&self, feed: &FeedConfig, registry: &FrozenRegistry, base: &str) -> Vec<FeedItem> {
        let mut pages = match &feed.source {
            Some(prefix) => registry.within(prefix),
            None => registry.all(),
        };
        // Stable: equal dates keep registry order.
        pages.sort_by(|a, b| match (a.date(), b.date()) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        pages.truncate(feed.limit);

        pages.into_iter().map(|page| self.item(page, base)).collect()
    }

    fn item(&self, page: &Page, base: &str) -> FeedItem {
        let site = &self.config.site;
        let field = |name: &str| page.fields.get(name).and_then(|v| v.as_str());

        FeedItem {
            title: page.title().unwrap_or(&page.url).to_string(),
            link: format!("{base}{}", page.url),
            date: page.date(),
            description: DESCRIPTION_FIELDS
                .iter()
                .find_map(|name| field(name))
                .map(str::to_string)
                .or_else(|| site.description.clone()),
            author: field("author")
                .map(str::to_string)
                .or_else(|| site.author.clone()),
            tags: page.fields.tags().into_iter().map(str::to_string).collect(),
        }
    }

    fn title(&self, feed: &FeedConfig) -> String {
        feed.title
            .clone()
            .or_else(|| self.config.site.title.clone())
            .unwrap_or_else(|| feed.name.clone())
    }

    fn description(&self, feed: &FeedConfig) -> String {
        feed.description
            .clone()
            .or_else(|| self.config.site.description.clone())
            .unwrap_or_default()
    }

    fn rss(&self, feed: &FeedConfig, items: &[FeedItem], base: &str) -> String {
        let rss_items: Vec<Item> = items.iter().map(rss_item).collect();

        let channel = ChannelBuilder::default()
            .title(self.title(feed))
            .link(base)
            .description(self.description(feed))
            .language(Some(self.config.site.language.clone()))
            .generator(Some(GENERATOR.to_string()))
            .last_build_date(Some(newest(items).to_rfc2822()))
            .items(rss_items)
            .build();

        channel.to_string()
    }

    fn atom(&self, feed: &FeedConfig, items: &[FeedItem], base: &str, path: &str) -> String {
        let entries: Vec<Entry> = items.iter().map(atom_entry).collect();

        let mut atom = Feed::default();
        atom.set_title(Text::plain(self.title(feed)));
        atom.set_id(format!("{base}/"));
        atom.set_updated(newest(items).fixed_offset());
        atom.set_links(vec![
            Link {
                href: format!("{base}/{}", path.trim_start_matches('/')),
                rel: "self".to_string(),
                mime_type: Some("application/atom+xml".to_string()),
                ..Default::default()
            },
            Link {
                href: format!("{base}/"),
                rel: "alternate".to_string(),
                ..Default::default()
            },
        ]);
        let description = self.description(feed);
        if !description.is_empty() {
            atom.set_subtitle(Some(Text::plain(description)));
        }
        if let Some(author) = &self.config.site.author {
            atom.set_authors(vec![person(author)]);
        }
        atom.set_lang(Some(self.config.site.language.clone()));
        atom.set_generator(Some(Generator {
            value: GENERATOR.to_string(),
            ..Default::default()
        }));
        atom.set_entries(entries);

        atom.to_string()
    }
}

/// Date of the newest item, or the Unix epoch for a feed without dated items.
fn newest(items: &[FeedItem]) -> DateTime<Utc> {
    items
        .iter()
        .filter_map(|item| item.date)
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn rss_item(item: &FeedItem) -> Item {
    let guid = GuidBuilder::default()
        .value(&item.link)
        .permalink(true)
        .build();

    let mut builder = ItemBuilder::default();
    builder.title(Some(item.title.clone()));
    builder.link(Some(item.link.clone()));
    builder.guid(Some(guid));

    if let Some(date) = item.date {
        builder.pub_date(Some(date.to_rfc2822()));
    }
    if let Some(description) = &item.description {
        builder.description(Some(description.clone()));
    }
    if let Some(author) = &item.author {
        builder.author(Some(author.clone()));
    }

    let categories: Vec<_> = item
        .tags
        .iter()
        .map(|tag| Category {
            name: tag.clone(),
            domain: None,
        })
        .collect();
    if !categories.is_empty() {
        builder.categories(categories);
    }

    builder.build()
}

fn atom_entry(item: &FeedItem) -> Entry {
    let mut entry = Entry::default();
    entry.set_title(Text::plain(item.title.clone()));
    entry.set_id(item.link.clone());
    entry.set_links(vec![Link {
        href: item.link.clone(),
        rel: "alternate".to_string(),
        ..Default::default()
    }]);

    let updated = item.date.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    entry.set_updated(updated.fixed_offset());
    if let Some(date) = item.date {
        entry.set_published(Some(date.fixed_offset()));
    }
    if let Some(description) = &item.description {
        entry.set_summary(Some(Text::plain(description.clone())));
    }
    if let Some(author) = &item.author {
        entry.set_authors(vec![person(author)]);
    }
    entry.set_categories(
        item.tags
            .iter()
            .map(|tag| AtomCategory {
                term: tag.clone(),
                ..Default::default()
            })
            .collect::<Vec<_>>(),
    );

    entry
}

fn person(name: &str) -> Person {
    Person {
        name: name.to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use quire_core::{FieldValue, Fields, PageKind};

    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.site.title = Some("Test Blog".to_string());
        config.site.url = Some("https://example.com".to_string());
        config.site.description = Some("A test blog".to_string());
        config.site.author = Some("Ada".to_string());
        config
    }

    fn blog_feed(limit: usize) -> FeedConfig {
        FeedConfig {
            name: "blog".to_string(),
            title: None,
            description: None,
            source: Some("/blog".to_string()),
            output_rss: Some("blog.xml".to_string()),
            output_atom: Some("blog.atom".to_string()),
            limit,
        }
    }

    fn page(url: &str, fields: &[(&str, &str)]) -> Page {
        Page {
            url: url.to_string(),
            kind: PageKind::Ordinary,
            source: PathBuf::from(format!("{}.md", url.trim_matches('/'))),
            expansion_index: 0,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), FieldValue::String(v.to_string())))
                .collect::<Fields>(),
            body: String::new(),
        }
    }

    fn blog_registry() -> FrozenRegistry {
        let mut pages: Vec<Page> = (1..=5)
            .map(|day| {
                page(
                    &format!("/blog/post-{day}"),
                    &[
                        ("title", &format!("Post {day}")),
                        ("date", &format!("2024-01-0{day}")),
                    ],
                )
            })
            .collect();
        pages.push(page("/blog/", &[("title", "Blog")]));
        pages.push(page("/about", &[("title", "About")]));
        FrozenRegistry::freeze(pages).expect("freeze")
    }

    #[test]
    fn test_items_newest_first_and_capped() {
        let config = test_config();
        let generator = FeedGenerator::new(&config);
        let items = generator.items(&blog_feed(3), &blog_registry(), "https://example.com");

        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["Post 5", "Post 4", "Post 3"]);
        assert_eq!(items[0].link, "https://example.com/blog/post-5");
    }

    #[test]
    fn test_undated_items_sort_last() {
        let registry = FrozenRegistry::freeze(vec![
            page("/blog/a-undated", &[("title", "Undated")]),
            page("/blog/b", &[("title", "Old"), ("published", "2023-05-01")]),
            page("/blog/c", &[("title", "New"), ("pubDate", "2024-05-01")]),
        ])
        .expect("freeze");
        let config = test_config();
        let items = FeedGenerator::new(&config).items(&blog_feed(10), &registry, "https://example.com");

        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["New", "Old", "Undated"]);
    }

    #[test]
    fn test_item_fallbacks() {
        let registry = FrozenRegistry::freeze(vec![
            page("/blog/untitled", &[]),
            page(
                "/blog/own",
                &[("title", "Own"), ("summary", "Short"), ("author", "Grace")],
            ),
        ])
        .expect("freeze");
        let config = test_config();
        let items = FeedGenerator::new(&config).items(&blog_feed(10), &registry, "https://example.com");

        let own = items.iter().find(|i| i.title == "Own").expect("own");
        assert_eq!(own.description.as_deref(), Some("Short"));
        assert_eq!(own.author.as_deref(), Some("Grace"));

        let untitled = items.iter().find(|i| i.title == "/blog/untitled").expect("untitled");
        assert_eq!(untitled.description.as_deref(), Some("A test blog"));
        assert_eq!(untitled.author.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_generate_rss_and_atom() {
        let config = test_config();
        let outputs = FeedGenerator::new(&config)
            .generate(&blog_feed(3), &blog_registry())
            .expect("generate");

        assert_eq!(outputs.len(), 2);
        let rss = &outputs[0];
        assert_eq!(rss.path, "blog.xml");
        assert!(rss.xml.contains("<title>Test Blog</title>"));
        assert!(rss.xml.contains("<link>https://example.com/blog/post-5</link>"));
        assert!(rss.xml.contains("Fri, 05 Jan 2024 00:00:00 +0000"));
        assert!(!rss.xml.contains("Post 2"));

        let atom = &outputs[1];
        assert_eq!(atom.path, "blog.atom");
        assert!(atom.xml.contains("<feed"));
        assert!(atom.xml.contains("https://example.com/blog.atom"));
        assert!(atom.xml.contains("2024-01-05T00:00:00+00:00"));
    }

    #[test]
    fn test_empty_feed_uses_epoch() {
        let config = test_config();
        let registry = FrozenRegistry::freeze(vec![]).expect("freeze");
        let outputs = FeedGenerator::new(&config)
            .generate(&blog_feed(3), &registry)
            .expect("generate");

        assert!(outputs[0].xml.contains("Thu, 01 Jan 1970 00:00:00 +0000"));
        assert!(outputs[1].xml.contains("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn test_missing_site_url() {
        let mut config = test_config();
        config.site.url = None;
        let err = FeedGenerator::new(&config)
            .generate(&blog_feed(3), &blog_registry())
            .unwrap_err();
        assert!(err.to_string().contains("site.url is required"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let config = test_config();
        let generator = FeedGenerator::new(&config);
        let a = generator.generate(&blog_feed(3), &blog_registry()).expect("a");
        let b = generator.generate(&blog_feed(3), &blog_registry()).expect("b");
        assert_eq!(a, b);
    }
}
