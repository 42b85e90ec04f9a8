//! Quire Core Library
//!
//! Core types, configuration, frontmatter model and error handling for the Quire static site generator.

pub mod config;
pub mod content;
pub mod error;
pub mod frontmatter;

pub use config::{BuildConfig, Config, FeedConfig, SiteConfig, SyntaxHighlightingConfig};
pub use content::{DerivedUrl, Page, PageKind, PageTemplate, TemplateKind, derive_url};
pub use error::{CoreError, Result};
pub use frontmatter::{Expression, FieldValue, Fields, parse_frontmatter};
