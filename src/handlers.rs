//! Handler registry: file extension -> compiler, path regex -> processors.
//!
//! Built once from the typed handler lists of the config and passed down
//! by reference.

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::compiler::css::{LESS, NativeSass, SASSC, STYLUS};
use crate::compiler::js::{COFFEE, DART, LIVESCRIPT};
use crate::compiler::{CommandCompiler, Compiler, CompilerSpec};
use crate::config::{
    CompilerEntry, CompilerKind, ConfigDiagnostics, FieldPath, ProcessorEntry, ProcessorKind,
};
use crate::processor::css::{CssMin, CssUrls, YUI_CSS};
use crate::processor::gzip::{DEFAULT_LEVEL, Gzip};
use crate::processor::images::{ADVPNG, GIFSICLE, JPEGOPTIM, JPEGTRAN, OPTIPNG};
use crate::processor::js::{CLOSURE, JsMin, UGLIFYJS, YUI_JS};
use crate::processor::{CommandProcessor, Processor, ProcessorSpec, Selector};

pub struct Handlers {
    compilers: Vec<Box<dyn Compiler>>,
    by_extension: FxHashMap<&'static str, usize>,
    /// Sorted by ascending priority, registration order breaking ties.
    processors: Vec<Box<dyn Processor>>,
}

impl Handlers {
    /// Build the registry. Duplicate extensions and bad patterns are
    /// reported together.
    pub fn from_config(
        compilers: &[CompilerEntry],
        processors: &[ProcessorEntry],
    ) -> Result<Self, ConfigDiagnostics> {
        let mut diag = ConfigDiagnostics::new();
        let mut handlers = Self {
            compilers: Vec::new(),
            by_extension: FxHashMap::default(),
            processors: Vec::new(),
        };

        for (i, entry) in compilers.iter().enumerate() {
            let compiler = build_compiler(entry);
            for &ext in compiler.extensions() {
                if handlers.by_extension.insert(ext, handlers.compilers.len()).is_some() {
                    diag.error(
                        FieldPath::indexed("compilers", i, "kind"),
                        format!("extension `.{ext}` already has a compiler"),
                    );
                }
            }
            handlers.compilers.push(compiler);
        }

        for (i, entry) in processors.iter().enumerate() {
            match Regex::new(entry.pattern()) {
                Ok(pattern) => {
                    let selector = Selector::new(pattern, entry.priority());
                    handlers.processors.push(build_processor(entry, selector));
                }
                Err(e) => diag.error(FieldPath::indexed("processors", i, "match"), e.to_string()),
            }
        }
        handlers.processors.sort_by_key(|p| p.priority());

        diag.into_result().map(|()| handlers)
    }

    /// Compiler registered for the extension of `name`.
    pub fn compiler_for(&self, name: &str) -> Option<&dyn Compiler> {
        let file = name.rsplit('/').next().unwrap_or(name);
        let (stem, ext) = file.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        self.by_extension
            .get(ext)
            .map(|&i| self.compilers[i].as_ref())
    }

    /// Name `name` is published under once compiled.
    pub fn public_name(&self, name: &str) -> String {
        match self.compiler_for(name) {
            Some(compiler) => compiler.new_name(name),
            None => name.to_string(),
        }
    }

    /// Processors applying to `name`, in run order.
    pub fn processors_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a dyn Processor> + 'a {
        self.processors
            .iter()
            .filter(move |p| p.applies_to(name))
            .map(|p| p.as_ref())
    }

    pub fn compiler_count(&self) -> usize {
        self.compilers.len()
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }
}

fn compiler_spec(kind: CompilerKind) -> Option<&'static CompilerSpec> {
    match kind {
        CompilerKind::Less => Some(&LESS),
        CompilerKind::Sassc => Some(&SASSC),
        CompilerKind::Stylus => Some(&STYLUS),
        CompilerKind::Coffee => Some(&COFFEE),
        CompilerKind::Livescript => Some(&LIVESCRIPT),
        CompilerKind::Dart => Some(&DART),
        CompilerKind::SassNative => None,
    }
}

fn build_compiler(entry: &CompilerEntry) -> Box<dyn Compiler> {
    let remove_original = entry.remove_original.unwrap_or(true);
    let Some(spec) = compiler_spec(entry.kind) else {
        return Box::new(NativeSass::new(remove_original));
    };

    let mut compiler = CommandCompiler::new(spec).with_remove_original(remove_original);
    if let Some(program) = &entry.program {
        compiler = compiler.program(program);
    }
    if let Some(command) = &entry.command {
        compiler = compiler.command(command);
    }
    if let Some(options) = &entry.options {
        compiler = compiler.options(options);
    }
    Box::new(compiler)
}

fn processor_spec(kind: ProcessorKind) -> Option<&'static ProcessorSpec> {
    match kind {
        ProcessorKind::YuiCss => Some(&YUI_CSS),
        ProcessorKind::YuiJs => Some(&YUI_JS),
        ProcessorKind::Uglifyjs => Some(&UGLIFYJS),
        ProcessorKind::Closure => Some(&CLOSURE),
        ProcessorKind::Optipng => Some(&OPTIPNG),
        ProcessorKind::Advpng => Some(&ADVPNG),
        ProcessorKind::Jpegtran => Some(&JPEGTRAN),
        ProcessorKind::Jpegoptim => Some(&JPEGOPTIM),
        ProcessorKind::Gifsicle => Some(&GIFSICLE),
        ProcessorKind::CssUrls | ProcessorKind::CssMin | ProcessorKind::JsMin | ProcessorKind::Gzip => None,
    }
}

fn build_processor(entry: &ProcessorEntry, selector: Selector) -> Box<dyn Processor> {
    if let Some(spec) = processor_spec(entry.kind) {
        let mut processor = CommandProcessor::new(spec, selector);
        if let Some(program) = &entry.program {
            processor = processor.program(program);
        }
        if let Some(command) = &entry.command {
            processor = processor.command(command);
        }
        if let Some(options) = &entry.options {
            processor = processor.options(options);
        }
        return Box::new(processor);
    }

    match entry.kind {
        ProcessorKind::CssMin => Box::new(CssMin::new(selector)),
        ProcessorKind::JsMin => Box::new(JsMin::new(selector)),
        ProcessorKind::Gzip => Box::new(Gzip::new(selector, entry.level.unwrap_or(DEFAULT_LEVEL))),
        _ => Box::new(CssUrls::new(selector)),
    }
}
