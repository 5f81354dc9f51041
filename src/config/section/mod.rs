//! Configuration section definitions.
//!
//! | Section | Purpose |
//! |---------|---------|
//! | `[paths]` | Source roots, output storage, persisted table, static URL |
//! | `[build]` | Active mode, timeouts, ignore patterns |
//! | `[templates]` | Template search paths and static context |
//! | `[[compilers]]`, `[[processors]]` | Handler registration |

mod build;
mod handlers;
mod paths;
mod templates;

pub use build::BuildConfig;
pub use handlers::{CompilerEntry, CompilerKind, ProcessorEntry, ProcessorKind};
pub use paths::PathsConfig;
pub use templates::TemplatesConfig;
