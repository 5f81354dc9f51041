//! Terminal output: prefixed log lines and a transient progress counter.
//!
//! ```ignore
//! log!("compile"; "css/site.less -> css/site.css");
//! debug!("store"; "fingerprint table unchanged");
//!
//! let progress = Progress::new("copy", names.len());
//! progress.tick();
//! progress.finish();
//! ```
//!
//! Warnings and errors go to stderr, everything else to stdout. While a
//! [`Progress`] is on screen, log lines clear it first and it is redrawn on
//! the next tick.

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{self, IsTerminal, Write},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set by a live [`Progress`]; log lines must clear its line first.
static PROGRESS_ACTIVE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Log a message with a colored module prefix
///
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like `log!`, but only with `--verbose`.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

/// Prefix styles by module name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Done,
    Store,
    Warn,
    Error,
    Plain,
}

impl Tone {
    fn of(module: &str) -> Self {
        match module.to_ascii_lowercase().as_str() {
            "done" => Self::Done,
            "store" => Self::Store,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Plain,
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, Self::Warn | Self::Error)
    }

    fn paint(self, module: &str) -> String {
        let prefix = format!("[{module}]");
        match self {
            Self::Done => prefix.bright_green().bold().to_string(),
            Self::Store => prefix.bright_blue().bold().to_string(),
            Self::Warn => prefix.bright_magenta().bold().to_string(),
            Self::Error => prefix.bright_red().bold().to_string(),
            Self::Plain => prefix.bright_yellow().bold().to_string(),
        }
    }
}

pub fn log(module: &str, message: &str) {
    let tone = Tone::of(module);
    let line = format!("{} {message}", tone.paint(module));

    if PROGRESS_ACTIVE.load(Ordering::Acquire) {
        clear_line(&mut io::stdout().lock());
    }
    if tone.to_stderr() {
        let mut err = io::stderr().lock();
        writeln!(err, "{line}").ok();
    } else {
        let mut out = io::stdout().lock();
        writeln!(out, "{line}").ok();
        out.flush().ok();
    }
}

fn clear_line(out: &mut impl Write) {
    execute!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
}

/// In-place `[build] copy(42/69)` counter for one stage.
///
/// Draws nothing when stdout is not a terminal or there is no work.
pub struct Progress {
    stage: &'static str,
    total: usize,
    current: AtomicUsize,
    draw: Mutex<()>,
    enabled: bool,
}

impl Progress {
    pub fn new(stage: &'static str, total: usize) -> Self {
        let enabled = total > 0 && io::stdout().is_terminal();
        if enabled {
            PROGRESS_ACTIVE.store(true, Ordering::Release);
        }
        let progress = Self {
            stage,
            total,
            current: AtomicUsize::new(0),
            draw: Mutex::new(()),
            enabled,
        };
        progress.redraw();
        progress
    }

    pub fn tick(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
        // Skip the redraw if another thread is already drawing.
        if let Some(_guard) = self.draw.try_lock() {
            self.redraw();
        }
    }

    fn line(&self) -> String {
        format!(
            "{}({}/{})",
            self.stage,
            self.current.load(Ordering::Relaxed),
            self.total
        )
    }

    fn redraw(&self) {
        if !self.enabled {
            return;
        }
        let mut out = io::stdout().lock();
        clear_line(&mut out);
        write!(out, "{} {}", Tone::Plain.paint("build"), self.line()).ok();
        out.flush().ok();
    }

    /// Remove the counter from the terminal.
    pub fn finish(self) {
        drop(self);
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        PROGRESS_ACTIVE.store(false, Ordering::Release);
        let _guard = self.draw.lock();
        let mut out = io::stdout().lock();
        clear_line(&mut out);
        out.flush().ok();
    }
}
