//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Fingerprinting static asset pipeline
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: hashmark.toml, searched upward)
    #[arg(short = 'C', long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Show debug output and unchanged files
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile, fingerprint and process every asset
    #[command(visible_alias = "b")]
    Build {
        /// Rewrite every file, fresh or not
        #[arg(short, long)]
        clean: bool,
    },

    /// Print the URL a logical asset path resolves to
    #[command(visible_alias = "u")]
    Url {
        /// Logical path, e.g. `css/site.less`
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Compile one source if stale and print the compiled file
    #[command(visible_alias = "c")]
    Compile {
        /// Logical path, e.g. `css/site.less`
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Print the tag that replaces a template collection
    #[command(visible_alias = "t")]
    Tag {
        /// Collection output path, e.g. `js/all.js`
        #[arg(value_name = "COLLECTION")]
        path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_clean() {
        let cli = Cli::try_parse_from(["hashmark", "-C", "site/hashmark.toml", "build", "--clean", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("site/hashmark.toml")));
        assert!(matches!(cli.command, Commands::Build { clean: true }));
    }

    #[test]
    fn test_parse_url() {
        let cli = Cli::try_parse_from(["hashmark", "url", "css/site.less"]).unwrap();
        assert!(matches!(cli.command, Commands::Url { ref path } if path == "css/site.less"));
    }

    #[test]
    fn test_parse_tag_alias() {
        let cli = Cli::try_parse_from(["hashmark", "t", "js/all.js"]).unwrap();
        assert!(matches!(cli.command, Commands::Tag { ref path } if path == "js/all.js"));
    }
}
