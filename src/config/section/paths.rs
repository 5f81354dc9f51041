//! `[paths]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [paths]
//! sources = ["static", "vendor/static"]   # searched in order, first wins
//! output = "public/static"
//! store = "public/assets.json"
//! static_url = "/static/"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::util::resolve_path;
use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Ordered source roots.
    pub sources: Vec<PathBuf>,
    /// Output storage location.
    pub output: PathBuf,
    /// Persisted fingerprint table.
    pub store: PathBuf,
    /// URL prefix the output directory is served under.
    pub static_url: String,
}

impl PathsConfig {
    pub const SOURCES: FieldPath = FieldPath::new("paths.sources");
    pub const OUTPUT: FieldPath = FieldPath::new("paths.output");
    pub const STATIC_URL: FieldPath = FieldPath::new("paths.static_url");
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sources: vec!["static".into()],
            output: "public/static".into(),
            store: "public/assets.json".into(),
            static_url: "/static/".into(),
        }
    }
}

impl PathsConfig {
    /// Resolve every path against `root`.
    pub fn normalize(&mut self, root: &Path) {
        for source in &mut self.sources {
            *source = resolve_path(source, root);
        }
        self.output = resolve_path(&self.output, root);
        self.store = resolve_path(&self.store, root);
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.sources.is_empty() {
            diag.error_with_hint(
                Self::SOURCES,
                "at least one source root is required",
                "sources = [\"static\"]",
            );
        }

        for source in &self.sources {
            if self.output.starts_with(source) || source.starts_with(&self.output) {
                diag.error(
                    Self::OUTPUT,
                    format!(
                        "output `{}` overlaps source root `{}`",
                        self.output.display(),
                        source.display()
                    ),
                );
            } else if !source.is_dir() {
                diag.warn(
                    Self::SOURCES,
                    format!("source root `{}` does not exist", source.display()),
                );
            }
        }

        if !self.static_url.ends_with('/') {
            diag.error_with_hint(
                Self::STATIC_URL,
                format!("`{}` must end with `/`", self.static_url),
                format!("static_url = \"{}/\"", self.static_url),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_inside_source_rejected() {
        let mut paths = PathsConfig {
            sources: vec!["static".into()],
            output: "static/out".into(),
            ..PathsConfig::default()
        };
        paths.normalize(Path::new("/site"));
        assert_eq!(paths.output, Path::new("/site/static/out"));

        let mut diag = ConfigDiagnostics::new();
        paths.validate(&mut diag);
        assert_eq!(diag.len(), 1);
        assert_eq!(diag.errors().next().unwrap().field, PathsConfig::OUTPUT);
    }

    #[test]
    fn test_static_url_needs_slash() {
        let paths = PathsConfig {
            sources: vec!["/site/static".into()],
            output: "/site/public".into(),
            static_url: "/static".into(),
            ..PathsConfig::default()
        };
        let mut diag = ConfigDiagnostics::new();
        paths.validate(&mut diag);
        assert!(diag.errors().any(|e| e.field == PathsConfig::STATIC_URL));
    }
}
