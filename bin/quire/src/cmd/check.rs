//! Check command - runs the whole pipeline without writing output

use std::path::Path;

use color_eyre::eyre::{Result, bail};
use quire_generator::Builder;

use super::{load_config, print_warnings};

/// Run the check command.
///
/// Loads and validates the configuration, then discovers, parses, expands
/// and renders every page without touching any output directory. With
/// `strict`, warnings fail the check.
pub fn run(site: &Path, config_path: Option<&Path>, strict: bool) -> Result<()> {
    tracing::info!(?site, strict, "Checking site");

    println!("Checking configuration...");
    let (config, config_file) = match load_config(site, config_path) {
        Ok(loaded) => {
            println!("  ✓ Configuration valid");
            loaded
        }
        Err(e) => {
            println!("  ✗ Configuration invalid: {e:#}");
            return Err(e);
        }
    };

    println!("\nChecking content...");
    // The output directory is never written by `check`.
    let mut builder = Builder::new(config, site, site.join("dist"));
    if let Some(config_file) = config_file {
        builder = builder.with_config_path(config_file);
    }
    let stats = match builder.check() {
        Ok(stats) => stats,
        Err(e) => {
            println!("  ✗ {e}");
            bail!("Check failed: {e}");
        }
    };
    println!(
        "  ✓ {} page(s), {} generated from dynamic templates",
        stats.pages, stats.dynamic_pages
    );

    println!();
    println!("Summary:");
    println!("  Errors:   0");
    println!("  Warnings: {}", stats.warnings.len());
    print_warnings(&stats.warnings);

    if strict && !stats.warnings.is_empty() {
        bail!(
            "Check failed with {} warning(s) (strict mode)",
            stats.warnings.len()
        );
    }

    println!();
    println!("✓ All checks passed");

    Ok(())
}
