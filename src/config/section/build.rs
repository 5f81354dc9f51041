//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! enabled = true        # resolve fingerprinted URLs
//! timeout = 120         # seconds per external program, 0 = no limit
//! ignore = ["*.map", "src/**"]
//! ```

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Active mode: `url()` resolves through the fingerprint table.
    pub enabled: bool,
    /// Per-invocation limit for external programs, in seconds.
    pub timeout: u64,
    /// Glob patterns of logical names skipped at discovery.
    pub ignore: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: 120,
            ignore: Vec::new(),
        }
    }
}

impl BuildConfig {
    pub const IGNORE: FieldPath = FieldPath::new("build.ignore");

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    /// Compiled ignore patterns; invalid ones are reported by `validate`.
    pub fn ignore_patterns(&self) -> Vec<Regex> {
        self.ignore.iter().filter_map(|g| glob_to_regex(g).ok()).collect()
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        for glob in &self.ignore {
            if let Err(e) = glob_to_regex(glob) {
                diag.error(Self::IGNORE, format!("invalid pattern `{glob}`: {e}"));
            }
        }
    }
}

/// Translate a glob into an anchored regex.
///
/// `**` crosses directories, `*` and `?` stay within one segment. A pattern
/// without `/` matches the file name at any depth.
pub fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from(if glob.contains('/') { "^" } else { "(^|/)" });
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                re.push_str(".*");
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}
