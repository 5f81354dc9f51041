//! External command execution utilities.
//!
//! Provides a Builder-based API for running compilers, minifiers and image
//! optimizers with stdin piping, captured stderr and a per-run timeout,
//! plus the `{program} {infile}` style argv templates handlers are
//! configured with.
//!
//! # Examples
//!
//! ```ignore
//! use crate::utils::exec::{Cmd, render_template};
//!
//! // Template expanded into argv, program resolved on PATH when needed
//! let argv = render_template("{program} -c --print {infile}", &[
//!     ("program", "coffee"),
//!     ("infile", "/abs/app.coffee"),
//! ])?;
//! let output = Cmd::from_argv(&argv)?.timeout(timeout).run()?;
//!
//! // With stdin piping (lessc, sassc, stylus...)
//! let output = Cmd::new("lessc").arg("-").stdin(source).run()?;
//! ```

use crate::debug;
use regex::Regex;
use std::{
    ffi::{OsStr, OsString},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Output, Stdio},
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;

/// Poll interval while waiting on a child with a timeout.
const WAIT_POLL: Duration = Duration::from_millis(10);

/// How long pipe threads get to finish after a timed-out child is killed.
const REAP_GRACE: Duration = Duration::from_millis(500);

// ============================================================================
// Errors
// ============================================================================

/// Failure of an external program invocation.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command template is empty")]
    EmptyCommand,

    #[error("unknown placeholder `{{{0}}}` in command template")]
    Template(String),

    #[error("program `{0}` not found (not an executable file and not on PATH)")]
    NotFound(String),

    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to communicate with `{program}`")]
    Pipe {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("command `{program}` failed with {status}\n{stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

pub type ExecResult<T> = std::result::Result<T, ExecError>;

// ============================================================================
// Argv templates
// ============================================================================

/// Expand a command template into argv.
///
/// The template is split on whitespace first, then placeholders are
/// substituted, so values containing spaces stay a single argument.
/// `{program}` and `{options}` are the exception: when they form a whole
/// token they expand to their own whitespace-separated words, which lets
/// `program = "java -jar yui.jar"` work.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> ExecResult<Vec<String>> {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

    let lookup = |name: &str| vars.iter().find(|(k, _)| *k == name).map(|(_, v)| *v);

    let mut argv = Vec::new();
    for token in template.split_whitespace() {
        if let Some(name) = token.strip_prefix('{').and_then(|t| t.strip_suffix('}'))
            && matches!(name, "program" | "options")
        {
            let value = lookup(name).ok_or_else(|| ExecError::Template(name.to_string()))?;
            argv.extend(value.split_whitespace().map(str::to_string));
            continue;
        }

        let mut missing = None;
        let rendered = re.replace_all(token, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            lookup(name).map(str::to_string).unwrap_or_else(|| {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            })
        });
        if let Some(name) = missing {
            return Err(ExecError::Template(name));
        }
        if !rendered.is_empty() {
            argv.push(rendered.into_owned());
        }
    }

    if argv.is_empty() {
        return Err(ExecError::EmptyCommand);
    }
    Ok(argv)
}

/// Resolve a program to an executable path.
///
/// A configured path that is a direct executable file is made absolute
/// (commands may run in another directory); anything else falls back to a
/// PATH search.
pub fn resolve_program(program: &str) -> ExecResult<PathBuf> {
    let path = Path::new(program);
    if is_executable(path) {
        return Ok(std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()));
    }
    which::which(program).map_err(|_| ExecError::NotFound(program.to_string()))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ============================================================================
// Builder API
// ============================================================================

/// Command builder for external process execution.
#[derive(Default)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    stdin_data: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    /// Create from rendered argv, resolving the program.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> ExecResult<Self> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
        let program = resolve_program(program.as_ref())?;
        Ok(Self::new(program).args(args.iter().map(AsRef::as_ref)))
    }

    /// Add a single argument.
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        let arg = arg.as_ref();
        if !arg.is_empty() {
            self.args.push(arg.to_owned());
        }
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            let arg = arg.as_ref();
            if !arg.is_empty() {
                self.args.push(arg.to_owned());
            }
        }
        self
    }

    /// Set working directory.
    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Set stdin data to pipe to the process.
    pub fn stdin<D: AsRef<[u8]>>(mut self, data: D) -> Self {
        self.stdin_data = Some(data.as_ref().to_vec());
        self
    }

    /// Kill the process when it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the program name for error messages.
    fn program_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .unwrap_or(&self.program)
            .to_string_lossy()
            .to_string()
    }

    /// Execute the command and return its output.
    ///
    /// Non-zero exit is always an error carrying the captured stderr.
    pub fn run(self) -> ExecResult<Output> {
        let name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: name.clone(),
            source,
        })?;

        // Feed stdin and drain both pipes on their own threads so a chatty
        // child never blocks on a full pipe while we wait on it.
        let stdin_handle = match (child.stdin.take(), self.stdin_data) {
            (Some(mut stdin), Some(data)) => Some(thread::spawn(move || stdin.write_all(&data))),
            _ => None,
        };
        let stdout_handle = child.stdout.take().map(spawn_reader);
        let stderr_handle = child.stderr.take().map(spawn_reader);

        let status = match self.timeout {
            Some(limit) => match wait_with_timeout(&mut child, limit, &name) {
                Ok(status) => status,
                Err(e) => {
                    // A grandchild may still hold the pipes open.
                    let deadline = Instant::now() + REAP_GRACE;
                    let joined = [
                        join_within(stdin_handle, deadline),
                        join_within(stdout_handle, deadline),
                        join_within(stderr_handle, deadline),
                    ];
                    let stuck = joined.iter().filter(|j| !**j).count();
                    if stuck > 0 {
                        debug!(&name; "{} pipe threads still blocked after kill", stuck);
                    }
                    return Err(e);
                }
            },
            None => child.wait().map_err(|source| ExecError::Pipe {
                program: name.clone(),
                source,
            })?,
        };

        let pipe_err = |source| ExecError::Pipe {
            program: name.clone(),
            source,
        };
        if let Some(handle) = stdin_handle {
            match handle.join() {
                // Child exiting before reading all input is its own business.
                Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => return Err(pipe_err(e)),
                _ => {}
            }
        }
        let stdout = join_reader(stdout_handle).map_err(pipe_err)?;
        let stderr = join_reader(stderr_handle).map_err(pipe_err)?;

        let output = Output {
            status,
            stdout,
            stderr,
        };

        if !output.status.success() {
            return Err(ExecError::Failed {
                program: name,
                status: output.status,
                stderr: strip_ansi(String::from_utf8_lossy(&output.stderr).trim()).into_owned(),
            });
        }

        log_stderr(&name, &output.stderr);
        Ok(output)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_reader(handle: Option<thread::JoinHandle<io::Result<Vec<u8>>>>) -> io::Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::other("output reader thread panicked"))?,
        None => Ok(Vec::new()),
    }
}

/// Join `handle` if it finishes before `deadline`. Returns false when the
/// thread is still running and has been left detached.
fn join_within<T>(handle: Option<thread::JoinHandle<T>>, deadline: Instant) -> bool {
    let Some(handle) = handle else {
        return true;
    };
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(WAIT_POLL);
    }
    handle.join().is_ok()
}

fn wait_with_timeout(
    child: &mut std::process::Child,
    limit: Duration,
    name: &str,
) -> ExecResult<ExitStatus> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if start.elapsed() >= limit => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecError::Timeout {
                    program: name.to_string(),
                    timeout: limit,
                });
            }
            Ok(None) => thread::sleep(WAIT_POLL),
            Err(source) => {
                return Err(ExecError::Pipe {
                    program: name.to_string(),
                    source,
                });
            }
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Chatter a successful tool wrote to stderr, shown only in verbose mode.
fn log_stderr(name: &str, stderr: &[u8]) {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = strip_ansi(&stderr);
    let lines: Vec<_> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if !lines.is_empty() {
        debug!(name; "{}", lines.join("\n"));
    }
}

/// Strip ANSI escape codes from string.
fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}

// ============================================================================
// Tests
// ============================================================================
