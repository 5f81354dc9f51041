//! hashmark - fingerprinting static asset pipeline.

mod cli;
mod collection;
mod compiler;
mod config;
mod deps;
mod handlers;
mod logger;
mod normalize;
mod pipeline;
mod processor;
mod storage;
mod store;
mod template;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::{Config, ConfigError};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(ConfigError::Diagnostics(diag)) => {
            eprintln!("{diag}");
            anyhow::bail!("invalid configuration");
        }
        Err(e) => return Err(e.into()),
    };

    match &cli.command {
        Commands::Build { clean } => cli::build(&config, *clean),
        Commands::Url { path } => cli::url(&config, path),
        Commands::Compile { path } => cli::compile(&config, path),
        Commands::Tag { path } => cli::tag(&config, path),
    }
}
