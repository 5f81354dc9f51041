//! Configuration errors and batched validation diagnostics.

use super::FieldPath;
use owo_colors::OwoColorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file `{0}` not found")]
    NotFound(PathBuf),

    #[error("config file parsing error")]
    Toml(#[from] toml::de::Error),

    // No #[from]: a source() would print every diagnostic twice.
    #[error("{0}")]
    Diagnostics(ConfigDiagnostics),
}

impl From<ConfigDiagnostics> for ConfigError {
    fn from(diag: ConfigDiagnostics) -> Self {
        Self::Diagnostics(diag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One finding against a config field.
#[derive(Debug, Clone)]
pub struct ConfigDiagnostic {
    pub severity: Severity,
    pub field: FieldPath,
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n    {} {}", "hint:".yellow(), hint)?;
        }
        Ok(())
    }
}

/// Every problem found in one validation pass.
///
/// Sections push into a shared instance so the user sees all errors at
/// once rather than fixing them one run at a time.
#[derive(Debug, Default)]
pub struct ConfigDiagnostics {
    items: Vec<ConfigDiagnostic>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, severity: Severity, field: FieldPath, message: String, hint: Option<String>) {
        self.items.push(ConfigDiagnostic {
            severity,
            field,
            message,
            hint,
        });
    }

    pub fn error(&mut self, field: FieldPath, message: impl Into<String>) {
        self.push(Severity::Error, field, message.into(), None);
    }

    pub fn error_with_hint(
        &mut self,
        field: FieldPath,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.push(Severity::Error, field, message.into(), Some(hint.into()));
    }

    pub fn warn(&mut self, field: FieldPath, message: impl Into<String>) {
        self.push(Severity::Warning, field, message.into(), None);
    }

    pub fn errors(&self) -> impl Iterator<Item = &ConfigDiagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConfigDiagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// Number of errors; warnings don't count.
    pub fn len(&self) -> usize {
        self.errors().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn print_warnings(&self) {
        for warning in self.warnings() {
            crate::log!("warn"; "{} {}", warning.field.as_str(), warning.message);
        }
    }

    /// `Err(self)` when any error was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.len();
        write!(f, "{}", "invalid configuration:".red().bold())?;
        for err in self.errors() {
            write!(f, "\n  {} {err}", "→".red())?;
        }
        if count > 1 {
            write!(f, "\n{}", format!("{count} errors").dimmed())?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigDiagnostics {}
