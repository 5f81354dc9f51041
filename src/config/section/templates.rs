//! `[templates]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [templates]
//! dirs = ["templates"]
//! extensions = ["html"]
//!
//! [templates.context]   # static values for `{{ NAME }}`
//! SITE = "example"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::util::resolve_path;
use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Template search paths scanned for media collections.
    pub dirs: Vec<PathBuf>,
    /// File extensions treated as templates, without dot.
    pub extensions: Vec<String>,
    /// Static render context; `STATIC_URL` is always present.
    pub context: BTreeMap<String, String>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dirs: vec!["templates".into()],
            extensions: vec!["html".into()],
            context: BTreeMap::new(),
        }
    }
}

impl TemplatesConfig {
    pub const EXTENSIONS: FieldPath = FieldPath::new("templates.extensions");

    pub fn normalize(&mut self, root: &Path) {
        for dir in &mut self.dirs {
            *dir = resolve_path(dir, root);
        }
        for ext in &mut self.extensions {
            *ext = ext.trim_start_matches('.').to_string();
        }
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if !self.dirs.is_empty() && self.extensions.is_empty() {
            diag.warn(Self::EXTENSIONS, "no template extensions, collections will not be found");
        }
    }

    pub fn is_template(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x == e))
    }
}
