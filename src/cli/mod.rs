//! Command handlers.

mod args;

pub use args::{Cli, Commands};

use anyhow::{Context, Result, bail};

use crate::config::Config;
use crate::logger::is_verbose;
use crate::pipeline::Pipeline;

/// Run one build and print its report.
pub fn build(config: &Config, clean: bool) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let report = pipeline.run(clean).context("build failed")?;
    report.print(is_verbose());
    Ok(())
}

pub fn url(config: &Config, path: &str) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    println!("{}", pipeline.url(path)?);
    Ok(())
}

pub fn tag(config: &Config, path: &str) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    println!("{}", pipeline.tag(path)?);
    Ok(())
}

pub fn compile(config: &Config, path: &str) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let output = pipeline.compile_one(path)?;
    if !output.is_file() {
        bail!("`{}` was not produced", output.display());
    }
    println!("{}", output.display());
    Ok(())
}
