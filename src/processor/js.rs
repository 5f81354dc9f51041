//! Script processors.

use super::minify::minify_js;
use super::{CommandOutput, Outcome, ProcessContext, Processor, ProcessorError, ProcessorSpec, Selector};

pub static YUI_JS: ProcessorSpec = ProcessorSpec {
    label: "yui-js",
    program: "yuicompressor",
    command: "{program} {options} {infile}",
    output: CommandOutput::Stdout,
};

pub static UGLIFYJS: ProcessorSpec = ProcessorSpec {
    label: "uglifyjs",
    program: "uglifyjs",
    command: "{program} {infile} --ascii -m -c -o {outfile}",
    output: CommandOutput::InPlace,
};

pub static CLOSURE: ProcessorSpec = ProcessorSpec {
    label: "closure",
    program: "google-closure-compiler",
    command: "{program} {options} {infile}",
    output: CommandOutput::Stdout,
};

/// In-process JavaScript minifier.
#[derive(Debug, Clone)]
pub struct JsMin {
    selector: Selector,
}

impl JsMin {
    pub fn new(selector: Selector) -> Self {
        Self { selector }
    }
}

impl Processor for JsMin {
    fn label(&self) -> &str {
        "js-min"
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<Outcome, ProcessorError> {
        let text = ctx.read_text()?;
        if text.trim().is_empty() {
            return Ok(Outcome::Skipped);
        }
        ctx.save(minify_js(&text)?.as_bytes())
    }
}
