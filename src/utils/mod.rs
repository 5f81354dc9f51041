//! Shared helpers.

pub mod exec;
pub mod hash;
pub mod url;

/// `"1 file"`, `"3 files"`.
pub fn plural_count(count: usize, noun: &str) -> String {
    let suffix = if count == 1 { "" } else { "s" };
    format!("{count} {noun}{suffix}")
}
