//! In-process minification.
//!
//! Uses oxc for JavaScript and lightningcss for CSS.

use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use super::ProcessorError;

/// Minify a classic (non-module) script.
pub fn minify_js(source: &str) -> Result<String, ProcessorError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(ProcessorError::Minify(error.to_string()));
    }

    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;
    Ok(code)
}

pub fn minify_css(source: &str) -> Result<String, ProcessorError> {
    let stylesheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| ProcessorError::Minify(e.to_string()))?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| ProcessorError::Minify(e.to_string()))?;
    Ok(result.code)
}
