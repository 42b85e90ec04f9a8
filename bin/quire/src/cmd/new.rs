//! New command - create a content file with a frontmatter skeleton

use std::{fs, path::Path};

use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr, bail};

/// Run the new command.
///
/// Creates `path` (relative to the site root, `.md` appended when there is
/// no extension) with a title derived from the file stem. Existing files
/// are never overwritten.
pub fn run(site: &Path, path: &Path) -> Result<()> {
    tracing::info!(?site, ?path, "Creating new content");

    let full_path = site.join(path);
    let file_path = if full_path.extension().is_some() {
        full_path
    } else {
        full_path.with_extension("md")
    };

    if file_path.exists() {
        bail!("{} already exists", file_path.display());
    }

    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).wrap_err("Failed to create directories")?;
    }

    fs::write(&file_path, frontmatter_skeleton(&file_path)).wrap_err("Failed to write file")?;

    tracing::info!(?file_path, "Created new content file");
    println!("Created: {}", file_path.display());

    Ok(())
}

fn frontmatter_skeleton(path: &Path) -> String {
    let title = title_from_stem(path);
    let date = Utc::now().format("%Y-%m-%d").to_string();

    format!(
        r#"---
title: "{title}"
date: {date}
tags: []
---

Write your content here.
"#
    )
}

/// `my-first_post` becomes `My first post`.
fn title_from_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .replace(['-', '_'], " ");
    let stem = stem.trim();

    let mut chars = stem.chars();
    let title = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Untitled".to_string(),
    };
    title.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_title_from_stem() {
        assert_eq!(title_from_stem(Path::new("blog/my-first_post.md")), "My first post");
        assert_eq!(title_from_stem(Path::new("about")), "About");
        assert_eq!(title_from_stem(Path::new("-.md")), "Untitled");
    }

    #[test]
    fn test_creates_markdown_file() {
        let dir = TempDir::new().unwrap();
        run(dir.path(), Path::new("blog/hello-world")).unwrap();

        let text = fs::read_to_string(dir.path().join("blog/hello-world.md")).unwrap();
        assert!(text.starts_with("---\ntitle: \"Hello world\"\n"));
        assert!(text.contains("date: "));
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("about.md"), "keep").unwrap();

        assert!(run(dir.path(), Path::new("about.md")).is_err());
        assert_eq!(fs::read_to_string(dir.path().join("about.md")).unwrap(), "keep");
    }
}
