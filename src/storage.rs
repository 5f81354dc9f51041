//! Storage and finder abstractions.
//!
//! The pipeline only ever talks to a named root through [`Storage`]; the
//! filesystem implementation is the one shipped here. Source lookups go
//! through a [`Finder`], which searches the configured source roots in
//! order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use jwalk::WalkDir;

/// A named root that assets are read from and written to.
///
/// Names are `/`-separated logical paths relative to the root.
pub trait Storage: Send + Sync {
    fn exists(&self, name: &str) -> bool;
    fn read(&self, name: &str) -> io::Result<Vec<u8>>;
    /// Write `data` under `name`, creating parent directories.
    fn save(&self, name: &str, data: &[u8]) -> io::Result<()>;
    fn delete(&self, name: &str) -> io::Result<()>;
    /// Physical location of `name`.
    fn path(&self, name: &str) -> PathBuf;
    /// Public URL of `name` (no fingerprint lookup).
    fn url(&self, name: &str) -> String;
    fn modified_time(&self, name: &str) -> io::Result<SystemTime>;
    /// All file names under the root, sorted.
    fn list(&self) -> Vec<String>;
}

/// Storage backed by a local directory.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    location: PathBuf,
    base_url: String,
}

impl FileSystemStorage {
    pub fn new(location: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            base_url: base_url.into(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl Storage for FileSystemStorage {
    fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path(name))
    }

    fn save(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.path(name)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.location.join(name.trim_start_matches('/'))
    }

    fn url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name.trim_start_matches('/'))
    }

    fn modified_time(&self, name: &str) -> io::Result<SystemTime> {
        self.path(name).metadata()?.modified()
    }

    fn list(&self) -> Vec<String> {
        list_files(&self.location)
    }
}

/// Walk `root` and return `/`-separated relative file names, sorted.
pub fn list_files(root: &Path) -> Vec<String> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut names: Vec<String> = WalkDir::new(root)
        .skip_hidden(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let path = e.path();
            let rel = path.strip_prefix(root).ok()?;
            Some(to_logical(rel))
        })
        .collect();
    names.sort();
    names
}

/// Convert a relative filesystem path to a `/`-separated logical name.
pub fn to_logical(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Finder
// ============================================================================

/// Locates logical paths among the source roots.
pub trait Finder: Send + Sync {
    /// Physical path of the first root containing `name`.
    fn find(&self, name: &str) -> Option<PathBuf>;
}

/// Finder over an ordered list of source directories.
#[derive(Debug, Clone)]
pub struct SourceFinder {
    roots: Vec<FileSystemStorage>,
}

impl SourceFinder {
    pub fn new(roots: Vec<FileSystemStorage>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[FileSystemStorage] {
        &self.roots
    }

    /// Storage owning `name`, first root wins.
    pub fn storage_for(&self, name: &str) -> Option<&FileSystemStorage> {
        self.roots.iter().find(|root| root.path(name).is_file())
    }
}

impl Finder for SourceFinder {
    fn find(&self, name: &str) -> Option<PathBuf> {
        let name = name.trim_start_matches('/');
        if name.is_empty() {
            return None;
        }
        self.storage_for(name).map(|root| root.path(name))
    }
}
