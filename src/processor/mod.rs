//! In-place transforms of published (fingerprinted) files.
//!
//! A [`Processor`] is selected by a regex over the hashed logical name and
//! runs in ascending priority order: URL rewriting first so minifiers see
//! final URLs, gzip last so it compresses final bytes.
//!
//! | Processor | Match | Priority |
//! |-----------|-------|----------|
//! | css-urls | `\.css$` | -1000 |
//! | css-min, yui-css | `\.css$` | 0 |
//! | js-min, yui-js, uglifyjs, closure | `\.js$` | 0 |
//! | optipng, advpng | `\.png$` | 0 |
//! | jpegtran, jpegoptim | `\.jpe?g$` | 0 |
//! | gifsicle | `\.gif$` | 0 |
//! | gzip | `\.(htm\|html\|js\|css\|txt\|eot\|ttf\|svg)` | 1000 |

pub mod css;
pub mod gzip;
pub mod images;
pub mod js;
pub mod minify;

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::storage::Storage;
use crate::utils::exec::{Cmd, ExecError, render_template};

/// Failure of a single processor on a single file.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Command(#[from] ExecError),

    #[error("minification failed: {0}")]
    Minify(String),

    #[error("I/O error on `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProcessorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result of a handler that ran without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `output` (the file itself or a sidecar) was written.
    Applied { output: String },
    /// Nothing to do for this file.
    Skipped,
}

/// The file a processor works on and what it may consult.
pub struct ProcessContext<'a> {
    /// Hashed logical name inside `storage`.
    pub name: &'a str,
    pub storage: &'a dyn Storage,
    /// Current fingerprint table, cache key -> hashed name.
    pub table: &'a BTreeMap<String, String>,
    /// Static URL prefix (`/static/`).
    pub root_url: &'a str,
    pub timeout: Option<Duration>,
}

impl ProcessContext<'_> {
    pub fn read(&self) -> Result<Vec<u8>, ProcessorError> {
        self.storage
            .read(self.name)
            .map_err(|e| ProcessorError::io(self.storage.path(self.name), e))
    }

    pub fn read_text(&self) -> Result<String, ProcessorError> {
        Ok(String::from_utf8_lossy(&self.read()?).into_owned())
    }

    /// Replace the file with `contents`.
    pub fn save(&self, contents: &[u8]) -> Result<Outcome, ProcessorError> {
        let io_err = |e| ProcessorError::io(self.storage.path(self.name), e);
        self.storage.delete(self.name).map_err(io_err)?;
        self.storage.save(self.name, contents).map_err(io_err)?;
        Ok(Outcome::Applied {
            output: self.name.to_string(),
        })
    }
}

/// Which files a processor handles, and when it runs.
#[derive(Debug, Clone)]
pub struct Selector {
    pub pattern: Regex,
    pub priority: i32,
}

impl Selector {
    pub fn new(pattern: Regex, priority: i32) -> Self {
        Self { pattern, priority }
    }
}

pub trait Processor: Send + Sync {
    fn label(&self) -> &str;

    fn selector(&self) -> &Selector;

    fn priority(&self) -> i32 {
        self.selector().priority
    }

    fn applies_to(&self, name: &str) -> bool {
        self.selector().pattern.is_match(name)
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<Outcome, ProcessorError>;
}

// ============================================================================
// External program processors
// ============================================================================

/// Where a command processor's result ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutput {
    /// Result read from stdout and written back over the file.
    Stdout,
    /// The program rewrites `{infile}` (or `{outfile}`, the same path) itself.
    InPlace,
}

/// Defaults of a command-driven processor.
#[derive(Debug)]
pub struct ProcessorSpec {
    pub label: &'static str,
    pub program: &'static str,
    pub command: &'static str,
    pub output: CommandOutput,
}

/// Processor driven by an external program.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    spec: &'static ProcessorSpec,
    selector: Selector,
    program: String,
    command: String,
    options: String,
}

impl CommandProcessor {
    pub fn new(spec: &'static ProcessorSpec, selector: Selector) -> Self {
        Self {
            spec,
            selector,
            program: spec.program.to_string(),
            command: spec.command.to_string(),
            options: String::new(),
        }
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }
}

impl Processor for CommandProcessor {
    fn label(&self) -> &str {
        self.spec.label
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<Outcome, ProcessorError> {
        let path = ctx.storage.path(ctx.name);
        let file = path.to_string_lossy();
        let argv = render_template(
            &self.command,
            &[
                ("program", self.program.as_str()),
                ("infile", file.as_ref()),
                ("outfile", file.as_ref()),
                ("options", self.options.as_str()),
            ],
        )?;
        let output = Cmd::from_argv(&argv)?.timeout(ctx.timeout).run()?;

        match self.spec.output {
            CommandOutput::Stdout if output.stdout.is_empty() => Ok(Outcome::Skipped),
            CommandOutput::Stdout => ctx.save(&output.stdout),
            CommandOutput::InPlace => Ok(Outcome::Applied {
                output: ctx.name.to_string(),
            }),
        }
    }
}
