//! Reverse dependency index between stylesheets and what they reference.
//!
//! - `DependencyGraph`: forward (asset → referenced keys) and reverse
//!   (referenced key → assets) mappings
//! - `linked_files`: scans a CSS working set and builds the graph
//!
//! The graph is recomputed from scratch every build; nothing here is
//! persisted or incremental.

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs;
use std::path::PathBuf;

use crate::normalize::UrlNormalizer;
use crate::utils::url::dir_of;

type KeySet = FxHashSet<String>;
type KeySetMap = FxHashMap<String, KeySet>;

/// Bidirectional dependency graph keyed by cache key.
///
/// # Invariants
/// - Forward and reverse mappings are always consistent
/// - Self-references are excluded
/// - Only direct references are recorded
#[derive(Debug, Default)]
pub struct DependencyGraph {
    forward: KeySetMap,
    reverse: KeySetMap,
}

impl DependencyGraph {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the references of `asset`, replacing earlier ones.
    pub fn record<I, S>(&mut self, asset: &str, references: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_asset(asset);

        let refs: KeySet = references
            .into_iter()
            .map(Into::into)
            .filter(|r| r != asset)
            .collect();

        for r in &refs {
            self.reverse
                .entry(r.clone())
                .or_default()
                .insert(asset.to_string());
        }
        self.forward.insert(asset.to_string(), refs);
    }

    /// Assets that reference `key` directly, sorted.
    pub fn dependents(&self, key: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .reverse
            .get(key)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    /// Number of referenced keys with at least one dependent.
    #[inline]
    pub fn reverse_count(&self) -> usize {
        self.reverse.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    fn remove_asset(&mut self, asset: &str) {
        let Some(old) = self.forward.remove(asset) else {
            return;
        };

        for r in old {
            if let Some(dependents) = self.reverse.get_mut(&r) {
                dependents.remove(asset);
                if dependents.is_empty() {
                    self.reverse.remove(&r);
                }
            }
        }
    }
}

/// Build the reverse index for every `.css` file of the working set.
///
/// `files` maps logical names to physical locations. References resolving
/// outside `root_url` are ignored. Unreadable files are skipped.
pub fn linked_files(files: &[(String, PathBuf)], root_url: &str) -> DependencyGraph {
    let normalizer = UrlNormalizer::css(root_url);

    let scanned: Vec<(&str, Vec<String>)> = files
        .par_iter()
        .filter(|(name, _)| name.ends_with(".css"))
        .filter_map(|(name, path)| {
            let bytes = fs::read(path).ok()?;
            let text = String::from_utf8_lossy(&bytes);
            let mut refs = Vec::new();
            normalizer.normalize(&text, dir_of(name), |r| {
                if let Some(key) = r.key {
                    refs.push(key.to_string());
                }
                r.url.to_string()
            });
            Some((name.as_str(), refs))
        })
        .collect();

    let mut graph = DependencyGraph::new();
    for (name, refs) in scanned {
        graph.record(name, refs);
    }

    crate::debug!("deps"; "{} referenced assets", graph.reverse_count());
    graph
}
