//! Content-addressed fingerprint store.
//!
//! Maps cache keys (logical paths without fragment) to fingerprinted names
//! (`css/site.css` -> `css/site.0a1b2c3d4e5f.css`), copies files under
//! their fingerprinted names, and garbage-collects superseded copies.
//!
//! The table is read once when the store is opened. A build starts a fresh
//! table with [`ContentStore::begin_build`] and fills it with every key it
//! publishes; [`ContentStore::persist`] then deletes the copies of keys that
//! dropped out and writes the new table atomically. A crash mid-build leaves
//! the previous table untouched.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::storage::{FileSystemStorage, Storage};
use crate::utils::hash::fingerprint;
use crate::utils::url::{UrlParts, strip_fragment};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read fingerprint table `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write fingerprint table `{}`", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to publish `{name}`")]
    Copy {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Result of [`ContentStore::copy_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Copied {
    pub key: String,
    pub hashed: String,
    /// True when bytes were physically written this call.
    pub processed: bool,
}

/// Fingerprint table plus the output storage it describes.
#[derive(Debug)]
pub struct ContentStore {
    storage: FileSystemStorage,
    location: PathBuf,
    entries: BTreeMap<String, String>,
    /// Table as loaded, while a build is filling `entries`.
    previous: BTreeMap<String, String>,
    enabled: bool,
}

impl ContentStore {
    /// Open the store, loading the table persisted at `location`.
    ///
    /// A missing table is empty. An unreadable one is an error; one that
    /// fails to parse is discarded with a warning and rebuilt.
    pub fn open(
        storage: FileSystemStorage,
        location: impl Into<PathBuf>,
        enabled: bool,
    ) -> Result<Self, StoreError> {
        let location = location.into();
        let entries = load_table(&location)?;
        crate::debug!("store"; "loaded {} entries from {}", entries.len(), location.display());
        Ok(Self {
            storage,
            location,
            entries,
            previous: BTreeMap::new(),
            enabled,
        })
    }

    pub fn storage(&self) -> &FileSystemStorage {
        &self.storage
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Hashed name `key` had before this build.
    pub fn previous(&self, key: &str) -> Option<&str> {
        self.previous.get(key).map(String::as_str)
    }

    /// Start an empty table for a new build, keeping the loaded one to
    /// compare against.
    pub fn begin_build(&mut self) {
        self.previous = std::mem::take(&mut self.entries);
    }

    /// Copy `source` into the output storage under its fingerprinted name.
    ///
    /// Bytes are written when `force` is set or nothing exists at the
    /// hashed name yet. A different hashed name previously recorded for
    /// the same key is deleted along with its gzip sidecar.
    pub fn copy_file(&mut self, source: &Path, name: &str, force: bool) -> Result<Copied, StoreError> {
        let copy_err = |source| StoreError::Copy {
            name: name.to_string(),
            source,
        };

        let content = fs::read(source).map_err(copy_err)?;
        let key = cache_key(name).to_string();
        let hashed = hashed_name(&key, &content);

        let processed = force || !self.storage.exists(&hashed);
        if processed {
            self.storage.delete(&hashed).map_err(copy_err)?;
            self.storage.save(&hashed, &content).map_err(copy_err)?;
        }

        let old = self
            .entries
            .insert(key.clone(), hashed.clone())
            .or_else(|| self.previous.get(&key).cloned());
        if let Some(old) = old
            && old != hashed
        {
            crate::debug!("store"; "dropping superseded {}", old);
            self.storage.delete(&old).map_err(copy_err)?;
            self.storage.delete(&format!("{old}.gz")).map_err(copy_err)?;
        }

        Ok(Copied {
            key,
            hashed,
            processed,
        })
    }

    /// Public URL of `name`.
    ///
    /// When enabled, a name whose key is in the table resolves to its
    /// fingerprinted URL; anything else falls through to the plain URL.
    /// A query or fragment on `name` is carried over.
    pub fn url(&self, name: &str) -> String {
        let parts = UrlParts::split(name);
        if self.enabled
            && let Some(hashed) = self.entries.get(cache_key(parts.path))
        {
            return format!("{}{}", self.storage.url(hashed), parts.suffix);
        }
        self.storage.url(name)
    }

    /// Delete the published copies of keys that were in the loaded table
    /// but not published this build. Returns the dropped keys.
    pub fn prune(&mut self) -> Result<Vec<String>, StoreError> {
        let dropped: Vec<(String, String)> = std::mem::take(&mut self.previous)
            .into_iter()
            .filter(|(key, _)| !self.entries.contains_key(key))
            .collect();

        let mut keys = Vec::with_capacity(dropped.len());
        for (key, hashed) in dropped {
            let delete_err = |source| StoreError::Copy {
                name: key.clone(),
                source,
            };
            crate::debug!("store"; "dropping orphaned {}", hashed);
            self.storage.delete(&hashed).map_err(delete_err)?;
            self.storage.delete(&format!("{hashed}.gz")).map_err(delete_err)?;
            keys.push(key);
        }
        Ok(keys)
    }

    /// Write the table atomically. An unchanged table is not rewritten.
    pub fn persist(&self) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.location.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| write_err(e.into()))?;
        if fs::read_to_string(&self.location).is_ok_and(|existing| existing == json) {
            crate::debug!("store"; "fingerprint table unchanged, skipping write");
            return Ok(());
        }

        if let Some(parent) = self.location.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let tmp = self.location.with_extension("json.tmp");
        fs::write(&tmp, &json).map_err(write_err)?;
        fs::rename(&tmp, &self.location).map_err(write_err)?;

        crate::debug!("store"; "saved {} entries", self.entries.len());
        Ok(())
    }
}

fn load_table(location: &Path) -> Result<BTreeMap<String, String>, StoreError> {
    let json = match fs::read_to_string(location) {
        Ok(json) => json,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: location.to_path_buf(),
                source,
            });
        }
    };

    match serde_json::from_str(&json) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            crate::log!("warn"; "ignoring corrupt fingerprint table {}: {}", location.display(), e);
            Ok(BTreeMap::new())
        }
    }
}

/// Canonical key of a logical path: the path without URL fragment.
pub fn cache_key(path: &str) -> &str {
    strip_fragment(path)
}

/// `path` with the content fingerprint inserted before the extension.
pub fn hashed_name(path: &str, content: &[u8]) -> String {
    let digest = fingerprint(content);
    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let (base, ext) = path.split_at(file_start + dot);
            format!("{base}.{digest}{ext}")
        }
        _ => format!("{path}.{digest}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::hash::FINGERPRINT_LEN;
    use tempfile::TempDir;

    struct Fixture {
        src: TempDir,
        out: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                src: TempDir::new().unwrap(),
                out: TempDir::new().unwrap(),
            }
        }

        fn write(&self, name: &str, body: &str) -> PathBuf {
            let path = self.src.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, body).unwrap();
            path
        }

        fn table(&self) -> PathBuf {
            self.out.path().join("assets.json")
        }

        fn open(&self) -> ContentStore {
            self.open_with(true)
        }

        fn open_with(&self, enabled: bool) -> ContentStore {
            let storage = FileSystemStorage::new(self.out.path().join("static"), "/static/");
            ContentStore::open(storage, self.table(), enabled).unwrap()
        }
    }

    #[test]
    fn test_hashed_name_deterministic() {
        let a = hashed_name("css/site.css", b"body{}");
        assert_eq!(a, hashed_name("css/site.css", b"body{}"));
        assert_ne!(a, hashed_name("css/site.css", b"body{ }"));

        let digest = &a["css/site.".len()..a.len() - ".css".len()];
        assert_eq!(digest.len(), FINGERPRINT_LEN);
        assert!(a.starts_with("css/site.") && a.ends_with(".css"));
    }

    #[test]
    fn test_hashed_name_without_extension() {
        let name = hashed_name("dir.v2/LICENSE", b"x");
        assert!(name.starts_with("dir.v2/LICENSE."));
        assert_eq!(name.len(), "dir.v2/LICENSE.".len() + FINGERPRINT_LEN);
        assert!(hashed_name(".htaccess", b"x").starts_with(".htaccess."));
    }

    #[test]
    fn test_cache_key_strips_fragment() {
        assert_eq!(cache_key("fonts/icons.svg#glyph"), "fonts/icons.svg");
        assert_eq!(cache_key("css/a.css"), "css/a.css");
    }

    #[test]
    fn test_copy_file_writes_once() {
        let fx = Fixture::new();
        let source = fx.write("css/a.css", "body{}");
        let mut store = fx.open();

        let first = store.copy_file(&source, "css/a.css", false).unwrap();
        assert!(first.processed);
        assert!(store.storage().exists(&first.hashed));

        let second = store.copy_file(&source, "css/a.css", false).unwrap();
        assert!(!second.processed);
        assert_eq!(first.hashed, second.hashed);

        let forced = store.copy_file(&source, "css/a.css", true).unwrap();
        assert!(forced.processed);
    }

    #[test]
    fn test_copy_file_collects_superseded() {
        let fx = Fixture::new();
        let source = fx.write("css/a.css", "body{}");
        let mut store = fx.open();

        let old = store.copy_file(&source, "css/a.css", false).unwrap();
        store.storage().save(&format!("{}.gz", old.hashed), b"gz").unwrap();

        fs::write(&source, "body{color:red}").unwrap();
        let new = store.copy_file(&source, "css/a.css", false).unwrap();

        assert_ne!(old.hashed, new.hashed);
        assert!(new.processed);
        assert!(!store.storage().exists(&old.hashed));
        assert!(!store.storage().exists(&format!("{}.gz", old.hashed)));
        assert_eq!(store.get("css/a.css"), Some(new.hashed.as_str()));
    }

    #[test]
    fn test_url_enabled_and_disabled() {
        let fx = Fixture::new();
        let source = fx.write("fonts/icons.svg", "<svg/>");
        let mut store = fx.open();
        let copied = store.copy_file(&source, "fonts/icons.svg", false).unwrap();

        assert_eq!(
            store.url("fonts/icons.svg#glyph"),
            format!("/static/{}#glyph", copied.hashed)
        );
        assert_eq!(store.url("missing.css"), "/static/missing.css");
        store.persist().unwrap();

        let disabled = fx.open_with(false);
        assert_eq!(disabled.get("fonts/icons.svg"), Some(copied.hashed.as_str()));
        assert_eq!(disabled.url("fonts/icons.svg"), "/static/fonts/icons.svg");
    }

    #[test]
    fn test_prune_drops_unpublished_keys() {
        let fx = Fixture::new();
        let a = fx.write("js/a.js", "a");
        let b = fx.write("js/b.js", "b");
        let mut store = fx.open();
        let old_a = store.copy_file(&a, "js/a.js", false).unwrap();
        store.copy_file(&b, "js/b.js", false).unwrap();
        store.storage().save(&format!("{}.gz", old_a.hashed), b"gz").unwrap();
        store.persist().unwrap();

        let mut store = fx.open();
        store.begin_build();
        assert_eq!(store.previous("js/a.js"), Some(old_a.hashed.as_str()));
        let b_again = store.copy_file(&b, "js/b.js", false).unwrap();
        assert!(!b_again.processed);

        assert_eq!(store.prune().unwrap(), ["js/a.js"]);
        assert!(!store.storage().exists(&old_a.hashed));
        assert!(!store.storage().exists(&format!("{}.gz", old_a.hashed)));
        assert!(store.storage().exists(&b_again.hashed));
        assert_eq!(store.entries().keys().collect::<Vec<_>>(), ["js/b.js"]);
    }

    #[test]
    fn test_superseded_across_builds() {
        let fx = Fixture::new();
        let source = fx.write("css/a.css", "body{}");
        let mut store = fx.open();
        let old = store.copy_file(&source, "css/a.css", false).unwrap();
        store.persist().unwrap();

        fs::write(&source, "body{color:red}").unwrap();
        let mut store = fx.open();
        store.begin_build();
        let new = store.copy_file(&source, "css/a.css", false).unwrap();

        assert_ne!(old.hashed, new.hashed);
        assert!(!store.storage().exists(&old.hashed));
        assert!(store.prune().unwrap().is_empty());
    }

    #[test]
    fn test_persist_roundtrip() {
        let fx = Fixture::new();
        let source = fx.write("js/app.js", "x");
        let mut store = fx.open();
        let copied = store.copy_file(&source, "js/app.js", false).unwrap();
        store.persist().unwrap();

        let reopened = fx.open();
        assert_eq!(reopened.entries(), store.entries());
        assert_eq!(reopened.get("js/app.js"), Some(copied.hashed.as_str()));
        assert!(!fx.out.path().join("assets.json.tmp").exists());
    }

    #[test]
    fn test_persist_unchanged_skips_write() {
        let fx = Fixture::new();
        let store = fx.open();
        store.persist().unwrap();
        let before = fs::metadata(fx.table()).unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        store.persist().unwrap();
        assert_eq!(fs::metadata(fx.table()).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn test_corrupt_table_starts_empty() {
        let fx = Fixture::new();
        fs::write(fx.table(), "{not json").unwrap();
        assert!(fx.open().entries().is_empty());
    }
}
