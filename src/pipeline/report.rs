//! Build report types and formatting.

use owo_colors::OwoColorize;

use crate::log;
use crate::utils::plural_count;

/// One published file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFile {
    /// Logical source name (or collection path).
    pub input: String,
    /// Fingerprinted name in the output storage.
    pub output: String,
    /// Written this pass, as opposed to reused.
    pub changed: bool,
}

/// Everything a build touched.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub files: Vec<ProcessedFile>,
    pub warnings: Vec<String>,
    pub collections: usize,
    /// Keys dropped from the table because nothing published them.
    pub removed: Vec<String>,
}

impl BuildReport {
    /// Record `input`, upgrading an earlier entry for the same input.
    pub fn record(&mut self, input: &str, output: &str, changed: bool) {
        match self.files.iter_mut().find(|f| f.input == input) {
            Some(file) => {
                file.output = output.to_string();
                file.changed |= changed;
            }
            None => self.files.push(ProcessedFile {
                input: input.to_string(),
                output: output.to_string(),
                changed,
            }),
        }
    }

    pub fn warn(&mut self, message: String) {
        log!("warn"; "{}", message);
        self.warnings.push(message);
    }

    /// Files written this pass.
    pub fn processed(&self) -> impl Iterator<Item = &ProcessedFile> {
        self.files.iter().filter(|f| f.changed)
    }

    /// Print every file (unchanged ones only when `verbose`) and a summary.
    pub fn print(&self, verbose: bool) {
        for file in &self.files {
            if file.changed {
                println!("  {} -> {}", file.input, file.output.green());
            } else if verbose {
                println!("  {} -> {} {}", file.input, file.output, "(unchanged)".dimmed());
            }
        }

        for key in &self.removed {
            println!("  {} {}", key, "(removed)".red());
        }

        let processed = self.processed().count();
        log!(
            "done";
            "{}, {} processed, {} removed, {}, {}",
            plural_count(self.files.len(), "file"),
            processed,
            self.removed.len(),
            plural_count(self.collections, "collection"),
            plural_count(self.warnings.len(), "warning")
        );
    }
}
