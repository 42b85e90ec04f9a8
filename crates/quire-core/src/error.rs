//! Error types for the Quire core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types for Quire.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration loading, parsing or validation error.
    #[error("invalid configuration: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The header of a content file is malformed.
    #[error("{path}: invalid frontmatter: {message}")]
    Frontmatter { path: PathBuf, message: String },

    /// A source path that cannot be mapped to a URL.
    #[error("{path}: cannot derive a URL: {message}")]
    UrlDerivation { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Layering file and environment sources failed.
    #[error("failed to layer configuration sources: {0}")]
    ConfigCrate(#[from] config::ConfigError),
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// A configuration error caused by `source`.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn frontmatter(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Frontmatter {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn url_derivation(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::UrlDerivation {
            path: path.into(),
            message: message.into(),
        }
    }
}
