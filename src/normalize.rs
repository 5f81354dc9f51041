//! Rewriting of URL references embedded in stylesheets.
//!
//! A [`UrlNormalizer`] finds `url(...)` and `@import` references, resolves
//! each one against `root_url + asset directory`, and substitutes whatever
//! the caller's callback returns. External references (scheme or network
//! location) and pure fragments are left byte-identical; any query or
//! fragment suffix of a rewritten reference is carried over verbatim.
//!
//! | Syntax | Rewritten forms |
//! |--------|-----------------|
//! | `Css`  | `url(...)`, `@import "..."` |
//! | `Less` | `@import (kw) "..."`, except `.css` targets and `(css)` imports |
//! | `Sass` | line-level `@import "a", "b";` lists of `.scss`/`.sass`/extensionless targets |
//!
//! [`ImportResolver`] builds on it for preprocessor sources: imports are
//! turned into physical paths through a [`Finder`] (probing Sass partials)
//! and every file found is recorded as a dependency.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::storage::Finder;
use crate::utils::url::{self, UrlParts};

/// Source language whose reference grammar is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Css,
    Less,
    Sass,
}

#[derive(Debug, Clone, Copy)]
enum RuleKind {
    Url,
    CssImport,
    LessImport,
    SassImport,
}

struct Rule {
    kind: RuleKind,
    regex: &'static Regex,
}

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(?P<q>["']?)(?P<url>[^"')]*?)["']?\s*\)"#).unwrap()
});

static CSS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?P<q>["'])(?P<url>[^"']*)["']"#).unwrap()
});

static LESS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s*(?P<kw>\([a-z, ]+\))?\s*(?P<q>["'])\s*(?P<url>[^"']*?)\s*["']"#)
        .unwrap()
});

static SASS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^(?P<indent>[ \t]*)@import[ \t]*(?P<spec>["'][^\n;]*["'])[ \t]*(?:;|$)"#)
        .unwrap()
});

static SASS_SPEC_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']\s*(?P<url>[^"']*?)\s*["']"#).unwrap());

impl Syntax {
    fn rules(self) -> Vec<Rule> {
        match self {
            Self::Css => vec![
                Rule {
                    kind: RuleKind::Url,
                    regex: &CSS_URL,
                },
                Rule {
                    kind: RuleKind::CssImport,
                    regex: &CSS_IMPORT,
                },
            ],
            Self::Less => vec![Rule {
                kind: RuleKind::LessImport,
                regex: &LESS_IMPORT,
            }],
            Self::Sass => vec![Rule {
                kind: RuleKind::SassImport,
                regex: &SASS_IMPORT,
            }],
        }
    }
}

/// A resolved in-scope reference handed to the rewrite callback.
#[derive(Debug, Clone, Copy)]
pub struct Reference<'a> {
    /// Reference path resolved against `root_url + dir` (no query/fragment).
    pub url: &'a str,
    /// `url` relative to the root URL, when it lies under it.
    pub key: Option<&'a str>,
}

/// Reference rewriter for one source syntax.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    syntax: Syntax,
    root_url: String,
}

impl UrlNormalizer {
    pub fn new(syntax: Syntax, root_url: impl Into<String>) -> Self {
        Self {
            syntax,
            root_url: root_url.into(),
        }
    }

    /// Stylesheet normalizer rooted at the static URL.
    pub fn css(root_url: impl Into<String>) -> Self {
        Self::new(Syntax::Css, root_url)
    }

    /// Rewrite every in-scope reference of `text`.
    ///
    /// `dir` is the asset's directory relative to the root (`css` or `css/`).
    pub fn normalize<F>(&self, text: &str, dir: &str, mut resolve: F) -> String
    where
        F: FnMut(&Reference<'_>) -> String,
    {
        let base = format!("{}{}", self.root_url, with_slash(dir));
        let mut out = Cow::Borrowed(text);

        for rule in self.syntax.rules() {
            let replaced = rule.regex.replace_all(&out, |caps: &Captures<'_>| {
                self.rewrite(rule.kind, caps, &base, &mut resolve)
            });
            if let Cow::Owned(s) = replaced {
                out = Cow::Owned(s);
            }
        }

        out.into_owned()
    }

    fn rewrite<F>(&self, kind: RuleKind, caps: &Captures<'_>, base: &str, resolve: &mut F) -> String
    where
        F: FnMut(&Reference<'_>) -> String,
    {
        let whole = caps[0].to_string();
        match kind {
            RuleKind::Url | RuleKind::CssImport => {
                let q = &caps["q"];
                let Some(new) = self.resolve_one(&caps["url"], base, resolve) else {
                    return whole;
                };
                match kind {
                    RuleKind::Url => format!("url({q}{new}{q})"),
                    _ => format!("@import {q}{new}{q}"),
                }
            }
            RuleKind::LessImport => {
                let target = &caps["url"];
                let kw = caps.name("kw").map(|m| m.as_str());
                // Passthrough imports stay for lessc itself.
                if target.ends_with(".css") || kw == Some("(css)") {
                    return whole;
                }
                let Some(new) = self.resolve_one(target, base, resolve) else {
                    return whole;
                };
                let kw = kw.map(|k| format!("{k} ")).unwrap_or_default();
                let q = &caps["q"];
                format!("@import {kw}{q}{new}{q}")
            }
            RuleKind::SassImport => {
                let targets: Vec<&str> = SASS_SPEC_ITEM
                    .captures_iter(&caps["spec"])
                    .filter_map(|c| c.name("url").map(|m| m.as_str()))
                    .collect();

                let importable = |t: &&str| {
                    let ext = extension(UrlParts::split(t).path);
                    matches!(ext, "" | "scss" | "sass") && !url::is_external(t)
                };
                if targets.is_empty() || !targets.iter().all(importable) {
                    return whole;
                }

                let mut rewritten = Vec::with_capacity(targets.len());
                for target in targets {
                    match self.resolve_one(target, base, resolve) {
                        Some(new) => rewritten.push(format!("\"{new}\"")),
                        None => return whole,
                    }
                }
                format!("{}@import {};", &caps["indent"], rewritten.join(", "))
            }
        }
    }

    /// Resolve one reference; `None` leaves the match untouched.
    fn resolve_one<F>(&self, raw: &str, base: &str, resolve: &mut F) -> Option<String>
    where
        F: FnMut(&Reference<'_>) -> String,
    {
        let raw = raw.trim();
        let parts = UrlParts::split(raw);
        if parts.path.is_empty() || url::is_external(raw) {
            return None;
        }

        let resolved = url::join(base, parts.path);
        let key = resolved.strip_prefix(self.root_url.as_str());
        let new = resolve(&Reference {
            url: &resolved,
            key,
        });
        Some(format!("{new}{}", parts.suffix))
    }
}

fn with_slash(dir: &str) -> Cow<'_, str> {
    let dir = dir.trim_start_matches('/');
    if dir.is_empty() || dir.ends_with('/') {
        Cow::Borrowed(dir)
    } else {
        Cow::Owned(format!("{dir}/"))
    }
}

/// Extension of the last path segment, without dot.
fn extension(path: &str) -> &str {
    let base = path.rsplit('/').next().unwrap_or(path);
    match base.rfind('.') {
        Some(i) if i > 0 => &base[i + 1..],
        _ => "",
    }
}

// ============================================================================
// Preprocessor imports
// ============================================================================

/// Preprocessor source with imports rewritten to physical paths.
#[derive(Debug, Clone, Default)]
pub struct NormalizedSource {
    pub text: String,
    /// Physical files the source imports.
    pub dependencies: BTreeSet<PathBuf>,
}

/// Resolves LESS/Sass imports through a [`Finder`].
pub struct ImportResolver<'a> {
    syntax: Syntax,
    finder: &'a dyn Finder,
    dependencies: BTreeSet<PathBuf>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(syntax: Syntax, finder: &'a dyn Finder) -> Self {
        Self {
            syntax,
            finder,
            dependencies: BTreeSet::new(),
        }
    }

    /// Rewrite imports of `text` (logical directory `dir`) and collect deps.
    pub fn normalize(mut self, text: &str, dir: &str) -> NormalizedSource {
        let normalizer = UrlNormalizer::new(self.syntax, "");
        let text = normalizer.normalize(text, dir, |r| self.lookup(r.url));
        NormalizedSource {
            text,
            dependencies: self.dependencies,
        }
    }

    fn lookup(&mut self, path: &str) -> String {
        match self.syntax {
            Syntax::Less => self.lookup_less(path),
            Syntax::Sass => self.lookup_sass(path),
            Syntax::Css => path.to_string(),
        }
    }

    fn lookup_less(&mut self, path: &str) -> String {
        let found = self.finder.find(path).or_else(|| {
            if path.ends_with(".less") {
                None
            } else {
                self.finder.find(&format!("{path}.less"))
            }
        });

        match found {
            Some(full) => {
                let public = full.to_string_lossy().into_owned();
                self.dependencies.insert(full);
                public
            }
            None => path.to_string(),
        }
    }

    /// Probe Sass partial conventions: `_name.scss`, `name.scss`,
    /// `_name.sass`, `name.sass` for extensionless imports.
    fn lookup_sass(&mut self, path: &str) -> String {
        let (dir, base) = match path.rsplit_once('/') {
            Some((dir, base)) => (format!("{dir}/"), base),
            None => (String::new(), path),
        };

        let lookup: Vec<(String, bool)> = if extension(path).is_empty() {
            vec![
                (format!("{dir}_{base}.scss"), true),
                (format!("{path}.scss"), false),
                (format!("{dir}_{base}.sass"), true),
                (format!("{path}.sass"), false),
            ]
        } else {
            vec![(path.to_string(), false), (format!("{dir}_{base}"), true)]
        };

        for (candidate, partial) in lookup {
            let Some(full) = self.finder.find(&candidate) else {
                continue;
            };
            let public = if partial {
                // Import path drops the underscore; the dependency keeps it.
                let name = full
                    .file_name()
                    .map(|n| n.to_string_lossy().trim_start_matches('_').to_string())
                    .unwrap_or_default();
                full.with_file_name(name)
            } else {
                full.clone()
            };
            self.dependencies.insert(full);
            return public.to_string_lossy().into_owned();
        }

        path.to_string()
    }
}
