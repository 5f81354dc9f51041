//! Build configuration from `hashmark.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [paths], [build], [templates], handler lists
//! ├── types/         # ConfigError, diagnostics, field paths
//! ├── util.rs        # config file lookup, path resolution
//! └── mod.rs         # Config (this file)
//! ```
//!
//! The loaded [`Config`] is immutable and handed down by reference; nothing
//! reads configuration from global state.

pub mod section;
pub mod types;
mod util;

pub use section::{
    BuildConfig, CompilerEntry, CompilerKind, PathsConfig, ProcessorEntry, ProcessorKind,
    TemplatesConfig,
};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::log;
use util::find_config_file;

/// Default config file name.
pub const CONFIG_FILE: &str = "hashmark.toml";

/// Root configuration structure representing hashmark.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory relative paths resolve against (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub compilers: Vec<CompilerEntry>,

    #[serde(default = "default_processors")]
    pub processors: Vec<ProcessorEntry>,
}

fn default_processors() -> Vec<ProcessorEntry> {
    vec![ProcessorEntry::new(ProcessorKind::CssUrls)]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            root: PathBuf::new(),
            paths: PathsConfig::default(),
            build: BuildConfig::default(),
            templates: TemplatesConfig::default(),
            compilers: Vec::new(),
            processors: default_processors(),
        }
    }
}

impl Config {
    /// Locate, parse, resolve and validate the config.
    ///
    /// `path` overrides the upward search for `hashmark.toml`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let name = path.unwrap_or(Path::new(CONFIG_FILE));
        let config_path =
            find_config_file(name).ok_or_else(|| ConfigError::NotFound(name.to_path_buf()))?;

        let mut config = Self::from_path(&config_path)?;
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.config_path = config_path;
        config.finalize(&root);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path, warning about unknown fields.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            let display_path = path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_else(|| path.to_string_lossy());
            log!("warning"; "unknown fields in {} are ignored: {}", display_path, ignored.join(", "));
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Resolve every relative path against `root`.
    pub fn finalize(&mut self, root: &Path) {
        self.root = root.to_path_buf();
        self.paths.normalize(root);
        self.templates.normalize(root);
    }

    /// Collect all validation errors and return them at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();

        self.paths.validate(&mut diag);
        self.build.validate(&mut diag);
        self.templates.validate(&mut diag);
        for (i, entry) in self.compilers.iter().enumerate() {
            entry.validate(i, &mut diag);
        }
        for (i, entry) in self.processors.iter().enumerate() {
            entry.validate(i, &mut diag);
        }

        diag.print_warnings();
        Ok(diag.into_result()?)
    }
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(matches!(
            Config::from_str("[paths\nsources = []"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.paths.static_url, "/static/");
        assert!(config.build.enabled);
        assert!(config.compilers.is_empty());
        assert_eq!(config.processors, [ProcessorEntry::new(ProcessorKind::CssUrls)]);
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_str(
            r#"
            [paths]
            sources = ["assets", "vendor"]
            output = "out"
            store = "out/assets.json"
            static_url = "/s/"

            [build]
            enabled = false
            timeout = 5

            [templates.context]
            SITE = "demo"

            [[compilers]]
            kind = "less"
            program = "node_modules/.bin/lessc"

            [[processors]]
            kind = "gzip"
            level = 9
            match = '\.css$'
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.sources.len(), 2);
        assert!(!config.build.enabled);
        assert_eq!(config.templates.context["SITE"], "demo");
        assert_eq!(config.compilers[0].kind, CompilerKind::Less);
        assert_eq!(config.processors.len(), 1);
        assert_eq!(config.processors[0].pattern(), r"\.css$");
        assert_eq!(config.processors[0].priority(), 1000);
    }

    #[test]
    fn test_unknown_fields_detected() {
        let (_, ignored) = Config::parse_with_ignored("[paths]\nsourcez = []\n[extra]\nx = 1").unwrap();
        assert!(ignored.iter().any(|f| f.contains("sourcez")));
        assert!(ignored.iter().any(|f| f.contains("extra")));
    }

    #[test]
    fn test_load_resolves_relative_to_config() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("static")).unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[paths]\noutput = \"public\"\n").unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.paths.sources, [dir.path().join("static")]);
        assert_eq!(config.paths.output, dir.path().join("public"));
    }

    #[test]
    fn test_load_reports_all_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "[paths]\nsources = []\nstatic_url = \"/s\"\n[[processors]]\nkind = \"css-min\"\nmatch = \"(\"\n",
        )
        .unwrap();

        match Config::load(Some(path.as_path())) {
            Err(ConfigError::Diagnostics(diag)) => assert_eq!(diag.len(), 3),
            other => panic!("expected diagnostics, got {other:?}"),
        }
    }
}
