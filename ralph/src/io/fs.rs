//! Filesystem collaborator.
//!
//! Every path handed to a [`ProjectFs`] is relative to the project root. The
//! state store and the gates only ever see the project through this trait, so
//! tests can swap in an in-memory tree.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;
use walkdir::WalkDir;

pub trait ProjectFs {
    fn read_file(&self, path: &Path) -> Result<String>;

    /// Replace the file's contents. Must not leave a partially written file behind.
    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// Append to the file, creating it if missing.
    fn append_file(&self, path: &Path, contents: &str) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Create a directory and its parents.
    fn mkdir(&self, path: &Path) -> Result<()>;

    /// All regular files below `dir`, relative to the project root, sorted.
    ///
    /// A missing directory yields an empty list.
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

/// [`ProjectFs`] backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            return Err(anyhow!(
                "project path must be relative (got {})",
                path.display()
            ));
        }
        Ok(self.root.join(path))
    }
}

impl ProjectFs for LocalFs {
    fn read_file(&self, path: &Path) -> Result<String> {
        let full = self.resolve(path)?;
        fs::read_to_string(&full).with_context(|| format!("read {}", full.display()))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        let full = self.resolve(path)?;
        debug!(path = %full.display(), bytes = contents.len(), "writing file");
        write_atomic(&full, contents)
    }

    fn append_file(&self, path: &Path, contents: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .with_context(|| format!("open {} for append", full.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("append {}", full.display()))?;
        file.sync_data()
            .with_context(|| format!("sync {}", full.display()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).map(|full| full.exists()).unwrap_or(false)
    }

    fn mkdir(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).with_context(|| format!("create directory {}", full.display()))
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let full = self.resolve(dir)?;
        if !full.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&full).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walk {}", full.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .with_context(|| format!("relativize {}", entry.path().display()))?;
            files.push(relative.to_path_buf());
        }
        Ok(files)
    }
}

/// Write via temp file + rename so readers never observe a torn file.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
