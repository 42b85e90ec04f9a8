//! Build command - generates the static site

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use quire_generator::Builder;

use super::{load_config, print_warnings};

/// Run the build command.
///
/// Builds the site rooted at `site` into `output`, replacing the previous
/// output only when every stage succeeds. A relative `output` is resolved
/// against the site root.
pub fn run(site: &Path, config_path: Option<&Path>, output: &Path, no_minify: bool) -> Result<()> {
    let output = site.join(output);
    let output = output.as_path();
    tracing::info!(?site, ?output, no_minify, "Starting build");

    let (config, config_file) = load_config(site, config_path)?;
    tracing::debug!(?config, "Loaded configuration");

    let mut builder = Builder::new(config, site, output);
    if let Some(config_file) = config_file {
        builder = builder.with_config_path(config_file);
    }
    if no_minify {
        builder = builder.with_minify(false);
    }

    let stats = builder.build().wrap_err("Build failed")?;

    println!();
    println!("  Build completed successfully!");
    println!();
    println!("  Pages:         {}", stats.pages);
    println!("  Dynamic pages: {}", stats.dynamic_pages);
    println!("  Feeds:         {}", stats.feeds);
    println!("  Assets:        {}", stats.assets);
    println!(
        "  Sitemap:       {}",
        if stats.sitemap { "yes" } else { "no" }
    );
    print_warnings(&stats.warnings);
    println!();
    println!("  Duration:      {:.2}s", stats.duration_ms as f64 / 1000.0);
    println!("  Output:        {}", output.display());
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_build_writes_output() {
        let dir = TempDir::new().unwrap();
        let site = dir.path().join("site");
        fs::create_dir_all(&site).unwrap();
        fs::write(site.join("index.md"), "---\ntitle: Home\n---\nHello").unwrap();

        let output = dir.path().join("dist");
        run(&site, None, &output, true).unwrap();

        let html = fs::read_to_string(output.join("index.html")).unwrap();
        assert!(html.contains("Hello"));
    }

    #[test]
    fn test_explicit_config_inside_site_is_not_copied() {
        let dir = TempDir::new().unwrap();
        let site = dir.path().join("site");
        fs::create_dir_all(&site).unwrap();
        fs::write(site.join("index.md"), "---\ntitle: Home\n---\nHello").unwrap();
        fs::write(site.join("other.toml"), "[site]\ntitle = \"Other\"\n").unwrap();

        let output = dir.path().join("dist");
        run(&site, Some(&site.join("other.toml")), &output, true).unwrap();

        assert!(output.join("index.html").exists());
        assert!(!output.join("other.toml").exists());
    }
}
