//! Media collections: groups of `<link>` or `<script>` tags declared in
//! templates and published as one concatenated bundle.
//!
//! - [`MediaCollection`]: one validated block (output path, shared
//!   attributes, ordered member URLs)
//! - [`CollectionSet`]: deduplicated collections, rejecting two different
//!   blocks that claim the same output path
//! - [`resolve_templates`]: static scan of every configured template

use std::collections::BTreeMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::PathBuf;

use jwalk::WalkDir;
use thiserror::Error;

use crate::config::TemplatesConfig;
use crate::normalize::UrlNormalizer;
use crate::template::{StaticContext, Template, TemplateParseError, render_static};
use crate::utils::url::{UrlParts, dir_of};

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("collection `{path}` may only contain elements")]
    NonElement { path: String },

    #[error("collection `{path}` declares no members")]
    Empty { path: String },

    #[error("collection `{path}` contains <{expected}> elements only, found <{found}>")]
    MixedTags {
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("collection `{path}`: all `{attr}` attributes should be the same (`{expected}` != `{found}`)")]
    AttributeMismatch {
        path: String,
        attr: &'static str,
        expected: String,
        found: String,
    },

    #[error("collection `{path}`: <{tag}> without `{attr}` attribute")]
    MissingAttribute {
        path: String,
        tag: &'static str,
        attr: &'static str,
    },

    #[error("collection `{path}`: <{tag}> cannot be collected")]
    UnsupportedTag { path: String, tag: String },

    #[error("different collections claim `{path}`")]
    PathCollision { path: String },

    #[error("collection `{path}` has the name of an existing asset")]
    AssetCollision { path: String },

    #[error("collection `{path}`: member `{member}` is not served from `{static_url}`")]
    NonStaticMember {
        path: String,
        member: String,
        static_url: String,
    },
}

/// A collection block that cannot be resolved without request data.
#[derive(Debug, Error)]
#[error("{}: skipping collection `{collection}`, depends on runtime data: {reason}", template.display())]
pub struct RuntimeDependentError {
    pub template: PathBuf,
    pub collection: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Link,
    Script,
}

impl TagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Script => "script",
        }
    }

    fn url_attr(self) -> &'static str {
        match self {
            Self::Link => "href",
            Self::Script => "src",
        }
    }

    /// `(attribute, default)` pairs shared by every member.
    fn shared_attrs(self) -> &'static [(&'static str, Option<&'static str>)] {
        match self {
            Self::Link => &[("rel", Some("stylesheet")), ("type", Some("text/css")), ("media", Some("screen"))],
            Self::Script => &[("type", Some("text/javascript"))],
        }
    }
}

/// One resolved collection block.
///
/// Equality and hashing cover the output path and the ordered member
/// list only; the same bundle declared in two templates is one collection.
#[derive(Debug, Clone)]
pub struct MediaCollection {
    pub path: String,
    pub kind: TagKind,
    pub attrs: BTreeMap<&'static str, String>,
    /// Member URLs in declaration order, as written in the template.
    pub media: Vec<String>,
}

impl PartialEq for MediaCollection {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.media == other.media
    }
}

impl Eq for MediaCollection {}

impl Hash for MediaCollection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.media.hash(state);
        self.path.hash(state);
    }
}

impl MediaCollection {
    /// Parse and validate the rendered body of a collection block.
    pub fn parse(path: &str, html: &str) -> Result<Self, CollectionError> {
        let dom = tl::parse(html, tl::ParserOptions::default()).map_err(|_| CollectionError::NonElement {
            path: path.to_string(),
        })?;
        let parser = dom.parser();

        let mut kind: Option<TagKind> = None;
        let mut attrs: BTreeMap<&'static str, String> = BTreeMap::new();
        let mut media = Vec::new();

        for handle in dom.children() {
            let Some(node) = handle.get(parser) else {
                continue;
            };
            let tag = match node {
                tl::Node::Tag(tag) => tag,
                tl::Node::Raw(text) if text.as_utf8_str().trim().is_empty() => continue,
                _ => {
                    return Err(CollectionError::NonElement {
                        path: path.to_string(),
                    });
                }
            };

            let name = tag.name().as_utf8_str().to_ascii_lowercase();
            let this = match name.as_str() {
                "link" => TagKind::Link,
                "script" => TagKind::Script,
                _ => {
                    return Err(CollectionError::UnsupportedTag {
                        path: path.to_string(),
                        tag: name,
                    });
                }
            };
            if let Some(expected) = kind
                && expected != this
            {
                return Err(CollectionError::MixedTags {
                    path: path.to_string(),
                    expected: expected.as_str(),
                    found: name,
                });
            }
            kind = Some(this);

            let attr = |key: &str| -> Option<String> {
                tag.attributes()
                    .get(key)
                    .flatten()
                    .map(|v| v.as_utf8_str().into_owned())
            };

            for &(key, default) in this.shared_attrs() {
                let Some(value) = attr(key).or_else(|| default.map(str::to_string)) else {
                    continue;
                };
                if let Some(expected) = attrs.get(key)
                    && *expected != value
                {
                    return Err(CollectionError::AttributeMismatch {
                        path: path.to_string(),
                        attr: key,
                        expected: expected.clone(),
                        found: value,
                    });
                }
                attrs.insert(key, value);
            }

            let Some(url) = attr(this.url_attr()) else {
                return Err(CollectionError::MissingAttribute {
                    path: path.to_string(),
                    tag: this.as_str(),
                    attr: this.url_attr(),
                });
            };
            media.push(url);
        }

        let Some(kind) = kind else {
            return Err(CollectionError::Empty {
                path: path.to_string(),
            });
        };

        Ok(Self {
            path: path.to_string(),
            kind,
            attrs,
            media,
        })
    }

    /// The single tag replacing the collection, pointing at `url`.
    pub fn html(&self, url: &str) -> String {
        let mut attrs: Vec<(&str, &str)> = self.attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        attrs.push((self.kind.url_attr(), url));
        let rendered = attrs
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_attr(v)))
            .collect::<Vec<_>>()
            .join(" ");

        match self.kind {
            TagKind::Link => format!("<link {rendered} />"),
            TagKind::Script => format!("<script {rendered}></script>"),
        }
    }

    /// Logical names of the members, relative to `static_url`.
    ///
    /// Query strings and fragments are dropped.
    pub fn member_names(&self, static_url: &str) -> Result<Vec<String>, CollectionError> {
        self.media
            .iter()
            .map(|member| {
                let path = UrlParts::split(member).path;
                path.strip_prefix(static_url)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| CollectionError::NonStaticMember {
                        path: self.path.clone(),
                        member: member.clone(),
                        static_url: static_url.to_string(),
                    })
            })
            .collect()
    }

    /// Concatenate member texts into the bundle.
    ///
    /// Script members are isolated in their own function scope. Stylesheet
    /// members get their relative URLs made absolute against their own
    /// directory so they survive the move.
    pub fn render_bundle(&self, members: &[(String, String)], static_url: &str) -> String {
        let normalizer = UrlNormalizer::css(static_url);
        let mut out = String::new();

        for (name, text) in members {
            match self.kind {
                TagKind::Script => {
                    out.push_str(";(function(){\n");
                    out.push_str(text);
                    out.push_str("\n})();\n");
                }
                TagKind::Link => {
                    out.push_str(&normalizer.normalize(text, dir_of(name), |r| r.url.to_string()));
                    out.push('\n');
                }
            }
        }
        out
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
        .replace('>', "&gt;")
}

// ============================================================================
// Collection set
// ============================================================================

/// Collections keyed by output path.
#[derive(Debug, Default)]
pub struct CollectionSet {
    by_path: BTreeMap<String, MediaCollection>,
}

impl CollectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `collection`. Returns `false` when an equal one is already present.
    pub fn insert(&mut self, collection: MediaCollection) -> Result<bool, CollectionError> {
        match self.by_path.get(&collection.path) {
            Some(existing) if *existing == collection => Ok(false),
            Some(_) => Err(CollectionError::PathCollision { path: collection.path }),
            None => {
                self.by_path.insert(collection.path.clone(), collection);
                Ok(true)
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&MediaCollection> {
        self.by_path.get(path)
    }

    /// Collections sorted by output path.
    pub fn iter(&self) -> impl Iterator<Item = &MediaCollection> {
        self.by_path.values()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }
}

// ============================================================================
// Template scan
// ============================================================================

/// A template problem that does not stop the scan.
#[derive(Debug, Error)]
pub enum TemplateIssue {
    #[error("failed to read template `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Parse(#[from] TemplateParseError),

    #[error(transparent)]
    RuntimeDependent(#[from] RuntimeDependentError),
}

/// Outcome of [`resolve_templates`].
#[derive(Debug, Default)]
pub struct Resolution {
    pub collections: CollectionSet,
    pub issues: Vec<TemplateIssue>,
    pub templates: usize,
}

/// Scan every template under the configured dirs for collections.
///
/// Parse failures and runtime-dependent blocks are collected as issues;
/// invalid or colliding collections abort the scan.
pub fn resolve_templates(
    templates: &TemplatesConfig,
    ctx: &StaticContext,
) -> Result<Resolution, CollectionError> {
    let mut resolution = Resolution::default();

    for path in template_files(templates) {
        resolution.templates += 1;
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(source) => {
                resolution.issues.push(TemplateIssue::Read { path, source });
                continue;
            }
        };
        let template = match Template::parse(&path, &source) {
            Ok(template) => template,
            Err(e) => {
                resolution.issues.push(e.into());
                continue;
            }
        };

        for block in template.collections() {
            match render_static(block.body, ctx) {
                Ok(html) => {
                    let collection = MediaCollection::parse(block.path, &html)?;
                    resolution.collections.insert(collection)?;
                }
                Err(reason) => resolution.issues.push(
                    RuntimeDependentError {
                        template: path.clone(),
                        collection: block.path.to_string(),
                        reason,
                    }
                    .into(),
                ),
            }
        }
    }

    Ok(resolution)
}

/// Template files under every dir, sorted per dir.
fn template_files(templates: &TemplatesConfig) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in templates.dirs.iter().filter(|d| d.is_dir()) {
        let mut found: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path())
            .filter(|p| templates.is_template(p))
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}
