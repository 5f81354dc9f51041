//! Minimal reader for page templates.
//!
//! Only as much of the template language as collection discovery needs:
//! text, `{{ variables }}`, `{% tags %}`, `{% x %}…{% endx %}` blocks and
//! `{# comments #}`. Rendering is static: anything that would need request
//! or view data fails with a reason instead of guessing.
//!
//! ```text
//! {% mediacollection "css/site.css" %}
//!   <link rel="stylesheet" href="{{ STATIC_URL }}css/a.css">
//!   <link rel="stylesheet" href="{% static "css/b.less" %}">
//! {% endmediacollection %}
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use rustc_hash::FxHashSet;
use thiserror::Error;

/// Tag opening a media collection block.
pub const COLLECTION_TAG: &str = "mediacollection";

#[derive(Debug, Error)]
#[error("{}:{line}: {message}", template.display())]
pub struct TemplateParseError {
    pub template: PathBuf,
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Variable(String),
    Tag {
        name: String,
        args: Vec<String>,
    },
    Block {
        name: String,
        args: Vec<String>,
        line: usize,
        children: Vec<Node>,
    },
    Comment,
}

/// Parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    pub path: PathBuf,
    pub nodes: Vec<Node>,
}

/// A `{% mediacollection "path" %}` block found in a template.
#[derive(Debug, Clone, Copy)]
pub struct CollectionBlock<'t> {
    /// Declared output path, quotes removed.
    pub path: &'t str,
    pub line: usize,
    pub body: &'t [Node],
}

impl Template {
    pub fn parse(path: impl Into<PathBuf>, source: &str) -> Result<Self, TemplateParseError> {
        let path = path.into();
        let tokens = tokenize(source).map_err(|(line, message)| TemplateParseError {
            template: path.clone(),
            line,
            message,
        })?;
        let nodes = build_tree(tokens).map_err(|(line, message)| TemplateParseError {
            template: path.clone(),
            line,
            message,
        })?;
        Ok(Self { path, nodes })
    }

    /// Every collection block, outer blocks first.
    pub fn collections(&self) -> Vec<CollectionBlock<'_>> {
        let mut found = Vec::new();
        visit_collections(&self.nodes, &mut found);
        found
    }
}

fn visit_collections<'t>(nodes: &'t [Node], found: &mut Vec<CollectionBlock<'t>>) {
    for node in nodes {
        if let Node::Block {
            name,
            args,
            line,
            children,
        } = node
        {
            if name == COLLECTION_TAG
                && let Some(path) = args.first()
            {
                found.push(CollectionBlock {
                    path: unquote(path).unwrap_or(path),
                    line: *line,
                    body: children,
                });
            }
            visit_collections(children, found);
        }
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Variable(&'a str),
    Tag(&'a str),
    Comment,
}

type Located<'a> = (usize, Token<'a>);
type ParseResult<T> = Result<T, (usize, String)>;

fn tokenize(source: &str) -> ParseResult<Vec<Located<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut line = 1;

    while !rest.is_empty() {
        let Some(start) = find_open(rest) else {
            tokens.push((line, Token::Text(rest)));
            break;
        };
        if start > 0 {
            tokens.push((line, Token::Text(&rest[..start])));
            line += count_lines(&rest[..start]);
        }

        let open = &rest[start..start + 2];
        let close = match open {
            "{{" => "}}",
            "{%" => "%}",
            _ => "#}",
        };
        let inner_start = start + 2;
        let Some(len) = rest[inner_start..].find(close) else {
            return Err((line, format!("unclosed `{open}`")));
        };
        let inner = rest[inner_start..inner_start + len].trim();

        let token = match open {
            "{{" if inner.is_empty() => return Err((line, "empty variable".into())),
            "{{" => Token::Variable(inner),
            "{%" if inner.is_empty() => return Err((line, "empty tag".into())),
            "{%" => Token::Tag(inner),
            _ => Token::Comment,
        };
        tokens.push((line, token));

        let end = inner_start + len + 2;
        line += count_lines(&rest[start..end]);
        rest = &rest[end..];
    }

    Ok(tokens)
}

fn find_open(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    (0..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i] == b'{' && matches!(bytes[i + 1], b'{' | b'%' | b'#'))
}

fn count_lines(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'\n').count()
}

/// Split tag contents on whitespace, keeping quoted strings whole.
fn split_contents(contents: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote = None;

    for c in contents.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Contents of a `"…"` or `'…'` literal.
pub fn unquote(s: &str) -> Option<&str> {
    let first = s.chars().next()?;
    (s.len() >= 2 && (first == '"' || first == '\'') && s.ends_with(first)).then(|| &s[1..s.len() - 1])
}

// ============================================================================
// Tree
// ============================================================================

struct Frame {
    name: String,
    args: Vec<String>,
    line: usize,
    children: Vec<Node>,
}

fn build_tree(tokens: Vec<Located<'_>>) -> ParseResult<Vec<Node>> {
    // A tag opens a block when its `end` tag appears somewhere.
    let closers: FxHashSet<&str> = tokens
        .iter()
        .filter_map(|&(_, token)| match token {
            Token::Tag(contents) => contents.split_whitespace().next()?.strip_prefix("end"),
            _ => None,
        })
        .collect();

    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for (line, token) in tokens {
        let node = match token {
            Token::Text(text) => Node::Text(text.to_string()),
            Token::Variable(name) => Node::Variable(name.to_string()),
            Token::Comment => Node::Comment,
            Token::Tag(contents) => {
                let mut args = split_contents(contents);
                let name = args.remove(0);

                if let Some(closed) = name.strip_prefix("end") {
                    let Some(frame) = stack.pop() else {
                        return Err((line, format!("unexpected `{{% {name} %}}`")));
                    };
                    if frame.name != closed {
                        return Err((
                            line,
                            format!("expected `{{% end{} %}}`, found `{{% {name} %}}`", frame.name),
                        ));
                    }
                    Node::Block {
                        name: frame.name,
                        args: frame.args,
                        line: frame.line,
                        children: frame.children,
                    }
                } else if closers.contains(name.as_str()) || name == COLLECTION_TAG {
                    if name == COLLECTION_TAG
                        && (args.len() != 1 || unquote(&args[0]).is_none())
                    {
                        return Err((line, format!("`{COLLECTION_TAG}` takes one quoted path")));
                    }
                    stack.push(Frame {
                        name,
                        args,
                        line,
                        children: Vec::new(),
                    });
                    continue;
                } else {
                    Node::Tag { name, args }
                }
            }
        };

        match stack.last_mut() {
            Some(frame) => frame.children.push(node),
            None => root.push(node),
        }
    }

    if let Some(frame) = stack.pop() {
        return Err((frame.line, format!("unclosed `{{% {} %}}`", frame.name)));
    }
    Ok(root)
}

// ============================================================================
// Static rendering
// ============================================================================

/// Context available without a request.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    pub vars: BTreeMap<String, String>,
    pub static_url: String,
}

impl StaticContext {
    pub fn new(static_url: impl Into<String>, vars: BTreeMap<String, String>) -> Self {
        Self {
            vars,
            static_url: static_url.into(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "STATIC_URL" => Some(&self.static_url),
            _ => self.vars.get(name).map(String::as_str),
        }
    }
}

/// Render `nodes` without runtime data.
///
/// The error is the reason the output cannot be known statically.
pub fn render_static(nodes: &[Node], ctx: &StaticContext) -> Result<String, String> {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Comment => {}
            Node::Variable(expr) => match ctx.lookup(expr) {
                Some(value) => out.push_str(value),
                None => return Err(format!("variable `{expr}` is not in the static context")),
            },
            Node::Tag { name, args } => match (name.as_str(), args.as_slice()) {
                ("load", _) => {}
                ("static", [path]) => {
                    let Some(path) = unquote(path) else {
                        return Err(format!("`static {path}` needs a literal path"));
                    };
                    out.push_str(&ctx.static_url);
                    out.push_str(path.trim_start_matches('/'));
                }
                _ => return Err(format!("tag `{name}` needs runtime data")),
            },
            Node::Block { name, children, .. } => match name.as_str() {
                COLLECTION_TAG | "spaceless" | "block" => out.push_str(&render_static(children, ctx)?),
                "comment" => {}
                _ => return Err(format!("block `{name}` needs runtime data")),
            },
        }
    }
    Ok(out)
}
