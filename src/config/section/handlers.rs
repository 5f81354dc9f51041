//! `[[compilers]]` and `[[processors]]` handler lists.
//!
//! # Example
//!
//! ```toml
//! [[compilers]]
//! kind = "less"
//! program = "node_modules/.bin/lessc"
//!
//! [[processors]]
//! kind = "css-urls"
//!
//! [[processors]]
//! kind = "gzip"
//! level = 9
//! ```
//!
//! Every entry may override the handler's external `program`, its argv
//! `command` template and the `{options}` it substitutes. Processors may
//! also override `match` and `priority`.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompilerKind {
    Less,
    Sassc,
    SassNative,
    Stylus,
    Coffee,
    Livescript,
    Dart,
}

impl CompilerKind {
    /// True for compilers that never spawn a program.
    pub fn is_native(self) -> bool {
        matches!(self, Self::SassNative)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerEntry {
    pub kind: CompilerKind,
    pub program: Option<String>,
    pub command: Option<String>,
    pub options: Option<String>,
    pub remove_original: Option<bool>,
}

impl CompilerEntry {
    pub fn new(kind: CompilerKind) -> Self {
        Self {
            kind,
            program: None,
            command: None,
            options: None,
            remove_original: None,
        }
    }

    pub fn validate(&self, index: usize, diag: &mut ConfigDiagnostics) {
        if self.kind.is_native() {
            for (field, value) in [("program", &self.program), ("command", &self.command)] {
                if value.is_some() {
                    diag.warn(
                        FieldPath::indexed("compilers", index, field),
                        "ignored by the in-process compiler",
                    );
                }
            }
        }
        if self.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
            diag.error(FieldPath::indexed("compilers", index, "command"), "command is empty");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessorKind {
    CssUrls,
    CssMin,
    JsMin,
    YuiCss,
    YuiJs,
    Uglifyjs,
    Closure,
    Optipng,
    Advpng,
    Jpegtran,
    Jpegoptim,
    Gifsicle,
    Gzip,
}

impl ProcessorKind {
    pub fn default_match(self) -> &'static str {
        match self {
            Self::CssUrls | Self::CssMin | Self::YuiCss => r"\.css$",
            Self::JsMin | Self::YuiJs | Self::Uglifyjs | Self::Closure => r"\.js$",
            Self::Optipng | Self::Advpng => r"\.png$",
            Self::Jpegtran | Self::Jpegoptim => r"\.jpe?g$",
            Self::Gifsicle => r"\.gif$",
            Self::Gzip => r"\.(htm|html|js|css|txt|eot|ttf|svg)$",
        }
    }

    pub fn default_priority(self) -> i32 {
        match self {
            Self::CssUrls => -1000,
            Self::Gzip => 1000,
            _ => 0,
        }
    }

    pub fn is_native(self) -> bool {
        matches!(self, Self::CssUrls | Self::CssMin | Self::JsMin | Self::Gzip)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorEntry {
    pub kind: ProcessorKind,
    #[serde(rename = "match")]
    pub pattern: Option<String>,
    pub priority: Option<i32>,
    pub program: Option<String>,
    pub command: Option<String>,
    pub options: Option<String>,
    /// Gzip compression level.
    pub level: Option<u32>,
}

impl ProcessorEntry {
    pub fn new(kind: ProcessorKind) -> Self {
        Self {
            kind,
            pattern: None,
            priority: None,
            program: None,
            command: None,
            options: None,
            level: None,
        }
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_deref().unwrap_or(self.kind.default_match())
    }

    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or(self.kind.default_priority())
    }

    pub fn validate(&self, index: usize, diag: &mut ConfigDiagnostics) {
        if let Err(e) = regex::Regex::new(self.pattern()) {
            diag.error(FieldPath::indexed("processors", index, "match"), e.to_string());
        }

        if let Some(level) = self.level {
            if self.kind != ProcessorKind::Gzip {
                diag.warn(
                    FieldPath::indexed("processors", index, "level"),
                    "only used by gzip",
                );
            } else if level > 9 {
                diag.error_with_hint(
                    FieldPath::indexed("processors", index, "level"),
                    format!("compression level {level} is out of range"),
                    "use a level between 0 and 9",
                );
            }
        }

        if self.kind.is_native() && (self.program.is_some() || self.command.is_some()) {
            diag.warn(
                FieldPath::indexed("processors", index, "program"),
                "ignored by in-process processors",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let entry: ProcessorEntry = toml::from_str("kind = \"css-urls\"").unwrap();
        assert_eq!(entry.kind, ProcessorKind::CssUrls);
        assert_eq!(entry.priority(), -1000);

        let entry: CompilerEntry = toml::from_str("kind = \"sass-native\"").unwrap();
        assert_eq!(entry.kind, CompilerKind::SassNative);
    }

    #[test]
    fn test_processor_validation() {
        let mut entry = ProcessorEntry::new(ProcessorKind::Gzip);
        entry.level = Some(12);
        entry.pattern = Some("(".into());

        let mut diag = ConfigDiagnostics::new();
        entry.validate(3, &mut diag);
        let fields: Vec<_> = diag.errors().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["processors[3].match", "processors[3].level"]);
    }
}
