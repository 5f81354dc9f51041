//! Stylesheet compilers: LESS, Sass (sassc or in-process) and Stylus.

use crate::normalize::{ImportResolver, Syntax};
use crate::utils::url::dir_of;

use super::{CompileJob, Compiler, CompilerError, CompilerSpec, Prepared};

/// `lessc` reading the import-resolved source on stdin.
pub static LESS: CompilerSpec = CompilerSpec {
    label: "less",
    extensions: &["less"],
    target: "css",
    program: "lessc",
    command: "{program} - {outfile}",
    stdin: true,
    imports: Some(Syntax::Less),
};

/// `sassc` reading stdin, writing stdout.
pub static SASSC: CompilerSpec = CompilerSpec {
    label: "sassc",
    extensions: &["scss", "sass"],
    target: "css",
    program: "sassc",
    command: "{program} -s",
    stdin: true,
    imports: Some(Syntax::Sass),
};

pub static STYLUS: CompilerSpec = CompilerSpec {
    label: "stylus",
    extensions: &["styl"],
    target: "css",
    program: "stylus",
    command: "{program} --include {indir}",
    stdin: true,
    imports: None,
};

/// In-process SCSS engine (`rsass`), available with the `native-sass`
/// feature. The indented `.sass` syntax is left to `sassc`.
#[derive(Debug, Clone)]
pub struct NativeSass {
    remove_original: bool,
}

impl NativeSass {
    pub fn new(remove_original: bool) -> Self {
        Self { remove_original }
    }
}

impl Default for NativeSass {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Compiler for NativeSass {
    fn label(&self) -> &str {
        "sass-native"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["scss"]
    }

    fn target_extension(&self) -> &'static str {
        "css"
    }

    fn remove_original(&self) -> bool {
        self.remove_original
    }

    /// Only collects dependencies; rsass resolves imports itself.
    fn prepare(&self, job: &CompileJob<'_>) -> Result<Prepared, CompilerError> {
        let text = job.read_source()?;
        let normalized = ImportResolver::new(Syntax::Sass, job.finder).normalize(&text, dir_of(job.name));
        Ok(Prepared {
            text: None,
            dependencies: normalized.dependencies,
        })
    }

    #[cfg(feature = "native-sass")]
    fn compile(&self, job: &CompileJob<'_>, _prepared: &Prepared) -> Result<(), CompilerError> {
        use super::save_contents;
        use rsass::input::FsContext;
        use rsass::output::{Format, Style};

        let native = |e: &dyn std::fmt::Display| CompilerError::Native(e.to_string());
        let (mut context, source) = FsContext::for_path(job.source).map_err(|e| native(&e))?;
        for root in job.finder.roots() {
            context.push_path(root.location());
        }
        let format = Format {
            style: Style::Expanded,
            ..Format::default()
        };
        let css = context
            .with_format(format)
            .transform(source)
            .map_err(|e| native(&e))?;
        save_contents(job.output, &self.new_name(job.name), &css)
    }

    #[cfg(not(feature = "native-sass"))]
    fn compile(&self, _job: &CompileJob<'_>, _prepared: &Prepared) -> Result<(), CompilerError> {
        Err(CompilerError::MissingLibrary("sass-native"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::tests::{Fixture, set_mtime};
    use crate::compiler::{CommandCompiler, CompileUnit};
    use crate::storage::Storage;
    use std::fs;

    fn drop_spaces(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_less_end_to_end() {
        if which::which("lessc").is_err() {
            return;
        }

        let fx = Fixture::new();
        let b = fx.write("less/b.less", "@c: red;");
        let a = fx.write("less/a.less", "@import \"b.less\"; body{color:@c}");
        let compiler = CommandCompiler::new(&LESS);

        let unit = CompileUnit::new(&compiler, fx.job("less/a.less", &a));
        assert!(unit.should_compile().unwrap());
        unit.compile().unwrap();

        let css = fx.output.read("less/a.css").unwrap();
        let css = drop_spaces(&String::from_utf8_lossy(&css));
        // Older lessc releases expand color keywords.
        assert!(
            css == "body{color:#ff0000;}" || css == "body{color:red;}",
            "unexpected output: {css}"
        );

        set_mtime(&a, 1_000);
        set_mtime(&b, 1_000);
        set_mtime(&unit.output_path(), 2_000);
        let unit = CompileUnit::new(&compiler, fx.job("less/a.less", &a));
        assert!(!unit.should_compile().unwrap());

        set_mtime(&b, 3_000);
        let unit = CompileUnit::new(&compiler, fx.job("less/a.less", &a));
        assert!(unit.should_compile().unwrap());
    }

    #[test]
    fn test_less_dependencies_without_lessc() {
        let fx = Fixture::new();
        let b = fx.write("less/b.less", "@c: red;");
        let a = fx.write("less/a.less", "@import \"b\"; @import (css) \"x\";");
        let compiler = CommandCompiler::new(&LESS);
        let unit = CompileUnit::new(&compiler, fx.job("less/a.less", &a));

        assert_eq!(unit.out_name(), "less/a.css");
        assert_eq!(unit.dependencies().unwrap().iter().collect::<Vec<_>>(), [&b]);
    }

    #[test]
    fn test_sass_dependencies_record_partials() {
        let fx = Fixture::new();
        let partial = fx.write("sass/_vars.scss", "$c: red;");
        let a = fx.write("sass/site.scss", "@import \"vars\";\nbody { color: $c; }\n");
        let compiler = NativeSass::default();
        let unit = CompileUnit::new(&compiler, fx.job("sass/site.scss", &a));

        assert_eq!(unit.dependencies().unwrap().iter().collect::<Vec<_>>(), [&partial]);
    }

    #[cfg(feature = "native-sass")]
    #[test]
    fn test_native_sass_compiles_with_partials() {
        let fx = Fixture::new();
        fx.write("sass/_vars.scss", "$c: red;");
        let a = fx.write("sass/site.scss", "@import \"vars\";\nbody { color: $c; }\n");
        let compiler = NativeSass::default();
        CompileUnit::new(&compiler, fx.job("sass/site.scss", &a)).compile().unwrap();

        let css = fs::read_to_string(fx.out.path().join("sass/site.css")).unwrap();
        assert_eq!(drop_spaces(&css), "body{color:red;}");
    }

    #[cfg(not(feature = "native-sass"))]
    #[test]
    fn test_native_sass_missing_library() {
        let fx = Fixture::new();
        let a = fx.write("sass/site.scss", "body { color: red; }");
        let compiler = NativeSass::default();
        let err = CompileUnit::new(&compiler, fx.job("sass/site.scss", &a))
            .compile()
            .unwrap_err();
        assert!(matches!(err, CompilerError::MissingLibrary("sass-native")));
        assert!(!fs::exists(fx.out.path().join("sass/site.css")).unwrap());
    }
}
