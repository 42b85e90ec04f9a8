//! Output writer.
//!
//! Artifacts are collected in memory (or as files to copy) and committed in
//! one step: everything is written to a staging directory beside the output
//! directory, which then replaces the previous output by rename. A failed
//! build leaves the existing output in place, or, if it cannot be moved
//! back, in a retained `.quire-old-` directory next to it.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use quire_core::content::NOT_FOUND_URL;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Output errors.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Two artifacts map to the same output file.
    #[error("output conflict: {path} is produced by both {first} and {second}")]
    Conflict {
        path: String,
        first: String,
        second: String,
    },

    /// A path escapes the output directory.
    #[error("invalid output path: {0}")]
    InvalidPath(String),

    /// The new output could not be moved into place and the previous output
    /// could not be moved back. The previous output is kept at `kept`.
    #[error(
        "failed to replace {}: {source}; restoring the previous output also failed ({restore}), it is kept at {}",
        path.display(),
        kept.display()
    )]
    Restore {
        path: PathBuf,
        kept: PathBuf,
        #[source]
        source: std::io::Error,
        restore: std::io::Error,
    },

    /// Filesystem error while staging or committing.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for output operations.
pub type Result<T> = std::result::Result<T, OutputError>;

fn io_err(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> OutputError {
    let path = path.into();
    move |source| OutputError::Io { path, source }
}

/// On-disk location of a page, relative to the output directory.
///
/// - `/` → `index.html`
/// - `/about` → `about/index.html`
/// - `/blog/` → `blog/index.html`
/// - `/404` → `404.html`
pub fn output_path(url: &str) -> PathBuf {
    if url == NOT_FOUND_URL {
        return PathBuf::from("404.html");
    }
    let dir = url.trim_matches('/');
    if dir.is_empty() {
        PathBuf::from("index.html")
    } else {
        Path::new(dir).join("index.html")
    }
}

/// Content of one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Bytes(Vec<u8>),
    /// Copied from a source file at commit time.
    Copy(PathBuf),
}

#[derive(Debug)]
struct Entry {
    artifact: Artifact,
    /// What produced the artifact, for conflict reports.
    origin: String,
}

/// Collects build artifacts and commits them atomically.
#[derive(Debug)]
pub struct OutputWriter {
    output_dir: PathBuf,
    entries: BTreeMap<PathBuf, Entry>,
}

impl OutputWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Add a file with the given bytes.
    pub fn add_bytes(
        &mut self,
        relative: impl AsRef<Path>,
        bytes: impl Into<Vec<u8>>,
        origin: impl Into<String>,
    ) -> Result<()> {
        self.insert(relative.as_ref(), Artifact::Bytes(bytes.into()), origin.into())
    }

    /// Add a file copied from `source`.
    pub fn add_copy(
        &mut self,
        relative: impl AsRef<Path>,
        source: impl Into<PathBuf>,
        origin: impl Into<String>,
    ) -> Result<()> {
        self.insert(relative.as_ref(), Artifact::Copy(source.into()), origin.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, relative: &Path, artifact: Artifact, origin: String) -> Result<()> {
        let relative = sanitize(relative)?;
        if let Some(existing) = self.entries.get(&relative) {
            return Err(OutputError::Conflict {
                path: relative.display().to_string(),
                first: existing.origin.clone(),
                second: origin,
            });
        }
        self.entries.insert(relative, Entry { artifact, origin });
        Ok(())
    }

    /// Stage every artifact and swap the stage into place.
    ///
    /// Returns the number of files written.
    pub fn commit(self) -> Result<usize> {
        let parent = match self.output_dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(io_err(&parent))?;

        let holder = tempfile::Builder::new()
            .prefix(".quire-stage-")
            .tempdir_in(&parent)
            .map_err(io_err(&parent))?;
        let stage = holder.path().join("site");
        fs::create_dir(&stage).map_err(io_err(&stage))?;

        for (relative, entry) in &self.entries {
            let dest = stage.join(relative);
            if let Some(dir) = dest.parent() {
                fs::create_dir_all(dir).map_err(io_err(dir))?;
            }
            match &entry.artifact {
                Artifact::Bytes(bytes) => fs::write(&dest, bytes).map_err(io_err(&dest))?,
                Artifact::Copy(source) => {
                    fs::copy(source, &dest).map_err(io_err(source))?;
                }
            }
            debug!(path = %relative.display(), "staged");
        }

        self.swap(&parent, &stage)?;
        info!(
            files = self.entries.len(),
            output = %self.output_dir.display(),
            "output committed"
        );
        // Dropping the holder removes the emptied stage and the previous output.
        drop(holder);
        Ok(self.entries.len())
    }

    fn swap(&self, parent: &Path, stage: &Path) -> Result<()> {
        swap_into_place(&self.output_dir, parent, stage, |from, to| fs::rename(from, to))
    }
}

/// Replace `output_dir` with `stage` using `rename`.
///
/// The previous output is moved into a `.quire-old-` directory under
/// `parent` and removed once the stage is in place. If the stage cannot be
/// moved in, the previous output is moved back; if that fails too, the
/// retired directory is kept and its path reported.
fn swap_into_place(
    output_dir: &Path,
    parent: &Path,
    stage: &Path,
    mut rename: impl FnMut(&Path, &Path) -> std::io::Result<()>,
) -> Result<()> {
    if !output_dir.exists() {
        return rename(stage, output_dir).map_err(io_err(output_dir));
    }

    let retired = tempfile::Builder::new()
        .prefix(".quire-old-")
        .tempdir_in(parent)
        .map_err(io_err(parent))?;
    let old = retired.path().join("site");
    rename(output_dir, &old).map_err(io_err(output_dir))?;

    let Err(source) = rename(stage, output_dir) else {
        return Ok(());
    };
    match rename(&old, output_dir) {
        Ok(()) => Err(OutputError::Io {
            path: output_dir.to_path_buf(),
            source,
        }),
        Err(restore) => {
            let kept = retired.keep().join("site");
            warn!(kept = %kept.display(), "previous output could not be restored");
            Err(OutputError::Restore {
                path: output_dir.to_path_buf(),
                kept,
                source,
                restore,
            })
        }
    }
}

fn sanitize(relative: &Path) -> Result<PathBuf> {
    use std::path::Component;

    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir | Component::RootDir => {}
            _ => return Err(OutputError::InvalidPath(relative.display().to_string())),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath(relative.display().to_string()));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_output_path() {
        assert_eq!(output_path("/"), PathBuf::from("index.html"));
        assert_eq!(output_path("/about"), PathBuf::from("about/index.html"));
        assert_eq!(output_path("/blog/"), PathBuf::from("blog/index.html"));
        assert_eq!(
            output_path("/blog/tags/rust"),
            PathBuf::from("blog/tags/rust/index.html")
        );
        assert_eq!(output_path("/404"), PathBuf::from("404.html"));
    }

    #[test]
    fn test_commit_replaces_previous_output() {
        let dir = TempDir::new().expect("tempdir");
        let out = dir.path().join("dist");
        fs::create_dir_all(&out).expect("mkdir");
        fs::write(out.join("stale.html"), "old").expect("write");

        let source = dir.path().join("logo.svg");
        fs::write(&source, "<svg/>").expect("write");

        let mut writer = OutputWriter::new(&out);
        writer
            .add_bytes("index.html", "<p>home</p>", "index.md")
            .expect("add");
        writer
            .add_copy("img/logo.svg", &source, "img/logo.svg")
            .expect("add");
        assert_eq!(writer.commit().expect("commit"), 2);

        assert_eq!(fs::read_to_string(out.join("index.html")).expect("read"), "<p>home</p>");
        assert_eq!(fs::read_to_string(out.join("img/logo.svg")).expect("read"), "<svg/>");
        assert!(!out.join("stale.html").exists());

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".quire-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_commit_keeps_previous_output() {
        let dir = TempDir::new().expect("tempdir");
        let out = dir.path().join("dist");
        fs::create_dir_all(&out).expect("mkdir");
        fs::write(out.join("index.html"), "old").expect("write");

        let mut writer = OutputWriter::new(&out);
        writer
            .add_copy("missing.txt", dir.path().join("does-not-exist"), "missing.txt")
            .expect("add");
        assert!(writer.commit().is_err());

        assert_eq!(fs::read_to_string(out.join("index.html")).expect("read"), "old");
    }

    fn swap_fixture() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let out = dir.path().join("dist");
        fs::create_dir_all(&out).expect("mkdir");
        fs::write(out.join("index.html"), "old").expect("write");
        let stage = dir.path().join("stage");
        fs::create_dir_all(&stage).expect("mkdir");
        fs::write(stage.join("index.html"), "new").expect("write");
        (dir, out, stage)
    }

    /// A rename that refuses the calls numbered in `failing` (from 1).
    fn rename_failing_on(failing: &'static [usize]) -> impl FnMut(&Path, &Path) -> std::io::Result<()> {
        let mut calls = 0;
        move |from, to| {
            calls += 1;
            if failing.contains(&calls) {
                Err(std::io::Error::other("rename refused"))
            } else {
                fs::rename(from, to)
            }
        }
    }

    #[test]
    fn test_swap_restores_previous_output() {
        let (dir, out, stage) = swap_fixture();

        // The stage cannot be moved in; moving the old output back works.
        let err = swap_into_place(&out, dir.path(), &stage, rename_failing_on(&[2])).unwrap_err();

        assert!(matches!(err, OutputError::Io { .. }));
        assert_eq!(fs::read_to_string(out.join("index.html")).expect("read"), "old");
    }

    #[test]
    fn test_swap_keeps_previous_output_when_restore_fails() {
        let (dir, out, stage) = swap_fixture();

        let err = swap_into_place(&out, dir.path(), &stage, rename_failing_on(&[2, 3])).unwrap_err();

        let OutputError::Restore { kept, .. } = &err else {
            panic!("expected a restore error, got {err}");
        };
        assert_eq!(fs::read_to_string(kept.join("index.html")).expect("kept"), "old");
        assert!(err.to_string().contains(&kept.display().to_string()));
    }

    #[test]
    fn test_conflicting_artifacts() {
        let mut writer = OutputWriter::new("dist");
        writer.add_bytes("about/index.html", "a", "about.md").expect("add");
        let err = writer
            .add_bytes("/about/index.html", "b", "about/index.html")
            .unwrap_err();
        assert!(matches!(err, OutputError::Conflict { .. }));
        assert!(err.to_string().contains("about.md"));
    }

    #[test]
    fn test_invalid_paths() {
        let mut writer = OutputWriter::new("dist");
        assert!(writer.add_bytes("../escape.html", "x", "x").is_err());
        assert!(writer.add_bytes("", "x", "x").is_err());
        assert!(writer.is_empty());
    }
}
