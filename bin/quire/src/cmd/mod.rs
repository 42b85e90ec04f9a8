//! Command implementations.

pub mod build;
pub mod check;
pub mod new;

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr, bail};
use quire_core::{Config, config::CONFIG_FILE};
use quire_generator::Diagnostic;

/// Load the site configuration.
///
/// An explicit `--config` path must exist. Otherwise `config.toml` at the
/// site root is used when present, and the defaults when it is not.
/// `QUIRE_` environment variables are layered on top of the file. Returns
/// the file that was read alongside the configuration.
pub fn load_config(site: &Path, config: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    let path = match config {
        Some(path) => {
            if !path.exists() {
                bail!("configuration file not found: {}", path.display());
            }
            path.to_path_buf()
        }
        None => {
            let path = site.join(CONFIG_FILE);
            if !path.exists() {
                tracing::debug!(?path, "no configuration file, using defaults");
                return Ok((Config::default(), None));
            }
            path
        }
    };

    tracing::debug!(?path, "loading configuration");
    let config = Config::load_with_env(&path)
        .wrap_err_with(|| format!("failed to load {}", path.display()))?;
    Ok((config, Some(path)))
}

fn print_warnings(warnings: &[Diagnostic]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("  Warnings:");
    for warning in warnings {
        println!("  ⚠ {warning}");
    }
}
