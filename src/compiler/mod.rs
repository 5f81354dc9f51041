//! Source-to-web-native compilation.
//!
//! A [`Compiler`] turns a preprocessor source (`.less`, `.scss`, `.coffee`…)
//! into a `.css` or `.js` file written to the output storage under the
//! compiler's new name. [`CompileUnit`] wraps one source file and answers
//! the staleness question before anything is spawned.
//!
//! Most compilers are external programs described by a [`CompilerSpec`]
//! and run through [`CommandCompiler`]; the in-process Sass engine lives
//! in [`css::NativeSass`].

pub mod css;
pub mod js;

use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::normalize::{ImportResolver, Syntax};
use crate::storage::{SourceFinder, Storage};
use crate::utils::exec::{Cmd, ExecError, render_template};
use crate::utils::url::dir_of;

/// Failure of a single compilation.
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error(transparent)]
    Command(#[from] ExecError),

    /// Optional in-process engine not built into this binary.
    #[error("`{0}` support is not compiled in")]
    MissingLibrary(&'static str),

    #[error("{0}")]
    Native(String),

    #[error("I/O error on `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CompilerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Everything a compiler needs to know about one source file.
pub struct CompileJob<'a> {
    /// Logical source name (`less/site.less`).
    pub name: &'a str,
    /// Physical source location.
    pub source: &'a Path,
    /// Destination storage the compiled file is written to.
    pub output: &'a dyn Storage,
    pub finder: &'a SourceFinder,
    pub timeout: Option<Duration>,
}

impl CompileJob<'_> {
    fn read_source(&self) -> Result<String, CompilerError> {
        fs::read_to_string(self.source).map_err(|e| CompilerError::io(self.source, e))
    }
}

/// Source text and dependencies computed once per unit.
#[derive(Debug, Clone, Default)]
pub struct Prepared {
    /// Text to feed the compiler, when it reads from stdin or memory.
    pub text: Option<String>,
    /// Physical files whose change makes the output stale.
    pub dependencies: BTreeSet<PathBuf>,
}

pub trait Compiler: Send + Sync {
    fn label(&self) -> &str;

    /// Source extensions handled, without dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Extension of the compiled file (`css`, `js`).
    fn target_extension(&self) -> &'static str;

    /// Drop the source from the published working set once compiled.
    fn remove_original(&self) -> bool;

    fn new_name(&self, name: &str) -> String {
        swap_extension(name, self.target_extension())
    }

    fn prepare(&self, _job: &CompileJob<'_>) -> Result<Prepared, CompilerError> {
        Ok(Prepared::default())
    }

    /// Write exactly one file, `new_name(job.name)`, to `job.output`.
    fn compile(&self, job: &CompileJob<'_>, prepared: &Prepared) -> Result<(), CompilerError>;
}

/// `css/site.less` + `css` -> `css/site.css`.
pub fn swap_extension(name: &str, ext: &str) -> String {
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    match name[file_start..].rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{ext}", &name[..file_start + dot]),
        _ => format!("{name}.{ext}"),
    }
}

/// Replace `name` in `storage` with `contents`.
pub(crate) fn save_contents(
    storage: &dyn Storage,
    name: &str,
    contents: &[u8],
) -> Result<(), CompilerError> {
    let io_err = |e| CompilerError::io(storage.path(name), e);
    storage.delete(name).map_err(io_err)?;
    storage.save(name, contents).map_err(io_err)
}

// ============================================================================
// Compile unit
// ============================================================================

/// One source file bound to its compiler.
pub struct CompileUnit<'a> {
    compiler: &'a dyn Compiler,
    job: CompileJob<'a>,
    out_name: String,
    prepared: OnceCell<Prepared>,
}

impl<'a> CompileUnit<'a> {
    pub fn new(compiler: &'a dyn Compiler, job: CompileJob<'a>) -> Self {
        let out_name = compiler.new_name(job.name);
        Self {
            compiler,
            job,
            out_name,
            prepared: OnceCell::new(),
        }
    }

    /// Logical name of the compiled file.
    pub fn out_name(&self) -> &str {
        &self.out_name
    }

    pub fn output_path(&self) -> PathBuf {
        self.job.output.path(&self.out_name)
    }

    fn prepared(&self) -> Result<&Prepared, CompilerError> {
        if let Some(prepared) = self.prepared.get() {
            return Ok(prepared);
        }
        let prepared = self.compiler.prepare(&self.job)?;
        Ok(self.prepared.get_or_init(|| prepared))
    }

    pub fn dependencies(&self) -> Result<&BTreeSet<PathBuf>, CompilerError> {
        Ok(&self.prepared()?.dependencies)
    }

    /// True when the output is missing or older than the source or any
    /// dependency. A dependency that disappeared also counts as stale.
    pub fn should_compile(&self) -> Result<bool, CompilerError> {
        let Ok(compiled) = self.job.output.modified_time(&self.out_name) else {
            return Ok(true);
        };

        let source = mtime(self.job.source).map_err(|e| CompilerError::io(self.job.source, e))?;
        if source > compiled {
            return Ok(true);
        }

        Ok(self.dependencies()?.iter().any(|dep| match mtime(dep) {
            Ok(t) => t > compiled,
            Err(_) => true,
        }))
    }

    /// Compile unconditionally, returning the compiled logical name.
    pub fn compile(&self) -> Result<&str, CompilerError> {
        let prepared = self.prepared()?;
        self.compiler.compile(&self.job, prepared)?;
        Ok(&self.out_name)
    }
}

fn mtime(path: &Path) -> io::Result<SystemTime> {
    path.metadata()?.modified()
}

// ============================================================================
// External program compilers
// ============================================================================

/// Defaults of a command-driven compiler.
#[derive(Debug)]
pub struct CompilerSpec {
    pub label: &'static str,
    pub extensions: &'static [&'static str],
    pub target: &'static str,
    pub program: &'static str,
    /// Argv template; without `{outfile}` the compiled text is read from stdout.
    pub command: &'static str,
    /// Pipe the source text on stdin.
    pub stdin: bool,
    /// Import syntax rewritten to physical paths before compiling.
    pub imports: Option<Syntax>,
}

/// Compiler driven by an external program.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    spec: &'static CompilerSpec,
    program: String,
    command: String,
    options: String,
    remove_original: bool,
}

impl CommandCompiler {
    pub fn new(spec: &'static CompilerSpec) -> Self {
        Self {
            spec,
            program: spec.program.to_string(),
            command: spec.command.to_string(),
            options: String::new(),
            remove_original: true,
        }
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    pub fn with_remove_original(mut self, remove: bool) -> Self {
        self.remove_original = remove;
        self
    }

    fn writes_outfile(&self) -> bool {
        self.command.contains("{outfile}")
    }
}

impl Compiler for CommandCompiler {
    fn label(&self) -> &str {
        self.spec.label
    }

    fn extensions(&self) -> &'static [&'static str] {
        self.spec.extensions
    }

    fn target_extension(&self) -> &'static str {
        self.spec.target
    }

    fn remove_original(&self) -> bool {
        self.remove_original
    }

    fn prepare(&self, job: &CompileJob<'_>) -> Result<Prepared, CompilerError> {
        if let Some(syntax) = self.spec.imports {
            let text = job.read_source()?;
            let normalized =
                ImportResolver::new(syntax, job.finder).normalize(&text, dir_of(job.name));
            return Ok(Prepared {
                text: Some(normalized.text),
                dependencies: normalized.dependencies,
            });
        }

        let text = if self.spec.stdin {
            Some(job.read_source()?)
        } else {
            None
        };
        Ok(Prepared {
            text,
            dependencies: BTreeSet::new(),
        })
    }

    fn compile(&self, job: &CompileJob<'_>, prepared: &Prepared) -> Result<(), CompilerError> {
        let out_name = self.new_name(job.name);
        let outfile = job.output.path(&out_name);
        if let Some(parent) = outfile.parent() {
            fs::create_dir_all(parent).map_err(|e| CompilerError::io(parent, e))?;
        }

        let infile = job.source.to_string_lossy();
        let outfile_str = outfile.to_string_lossy();
        let indir = job
            .source
            .parent()
            .map(|p| p.to_string_lossy())
            .unwrap_or_default();
        let argv = render_template(
            &self.command,
            &[
                ("program", self.program.as_str()),
                ("infile", infile.as_ref()),
                ("outfile", outfile_str.as_ref()),
                ("indir", indir.as_ref()),
                ("options", self.options.as_str()),
            ],
        )?;

        // Relative imports the tool resolves itself are relative to the source.
        let mut cmd = Cmd::from_argv(&argv)?.timeout(job.timeout);
        if let Some(dir) = job.source.parent() {
            cmd = cmd.cwd(dir);
        }
        if let Some(text) = &prepared.text {
            cmd = cmd.stdin(text);
        }
        let output = cmd.run()?;

        if !self.writes_outfile() {
            save_contents(job.output, &out_name, &output.stdout)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::FileSystemStorage;
    use filetime::{FileTime, set_file_mtime};
    use tempfile::TempDir;

    /// Compiler that copies the source through `cat` on stdin.
    pub(crate) static CAT: CompilerSpec = CompilerSpec {
        label: "cat",
        extensions: &["src"],
        target: "css",
        program: "cat",
        command: "{program}",
        stdin: true,
        imports: Some(Syntax::Less),
    };

    pub(crate) struct Fixture {
        pub src: TempDir,
        pub out: TempDir,
        pub finder: SourceFinder,
        pub output: FileSystemStorage,
    }

    impl Fixture {
        pub fn new() -> Self {
            let src = TempDir::new().unwrap();
            let out = TempDir::new().unwrap();
            let finder = SourceFinder::new(vec![FileSystemStorage::new(src.path(), "/static/")]);
            let output = FileSystemStorage::new(out.path(), "/static/");
            Self {
                src,
                out,
                finder,
                output,
            }
        }

        pub fn write(&self, name: &str, body: &str) -> PathBuf {
            let path = self.src.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, body).unwrap();
            path
        }

        pub fn job<'a>(&'a self, name: &'a str, source: &'a Path) -> CompileJob<'a> {
            CompileJob {
                name,
                source,
                output: &self.output,
                finder: &self.finder,
                timeout: Some(Duration::from_secs(10)),
            }
        }
    }

    pub(crate) fn set_mtime(path: &Path, secs: i64) {
        set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
    }

    pub(crate) fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_swap_extension() {
        assert_eq!(swap_extension("css/site.less", "css"), "css/site.css");
        assert_eq!(swap_extension("a.b/site", "css"), "a.b/site.css");
        assert_eq!(swap_extension("js/app.min.coffee", "js"), "js/app.min.js");
    }

    #[test]
    fn test_stdout_compiler_writes_new_name() {
        let fx = Fixture::new();
        let source = fx.write("css/a.src", "body{}");
        let compiler = CommandCompiler::new(&CAT);
        let unit = CompileUnit::new(&compiler, fx.job("css/a.src", &source));

        assert_eq!(unit.out_name(), "css/a.css");
        assert!(unit.should_compile().unwrap());
        assert_eq!(unit.compile().unwrap(), "css/a.css");
        assert_eq!(fs::read_to_string(unit.output_path()).unwrap(), "body{}");
    }

    #[test]
    fn test_should_compile_tracks_dependencies() {
        let fx = Fixture::new();
        let dep = fx.write("css/b.src", "@c: red;");
        let source = fx.write("css/a.src", "@import \"b.src\";");
        let compiler = CommandCompiler::new(&CAT);
        let unit = CompileUnit::new(&compiler, fx.job("css/a.src", &source));

        assert_eq!(unit.dependencies().unwrap(), &BTreeSet::from([dep.clone()]));
        unit.compile().unwrap();

        set_mtime(&source, 1_000);
        set_mtime(&dep, 1_000);
        set_mtime(&unit.output_path(), 2_000);
        assert!(!unit.should_compile().unwrap());

        // Touching only the dependency makes the output stale
        set_mtime(&dep, 3_000);
        assert!(unit.should_compile().unwrap());

        set_mtime(&dep, 1_000);
        set_mtime(&source, 3_000);
        assert!(unit.should_compile().unwrap());
    }

    #[test]
    fn test_missing_dependency_is_stale() {
        let fx = Fixture::new();
        let dep = fx.write("css/b.src", "");
        let source = fx.write("css/a.src", "@import \"b.src\";");
        let compiler = CommandCompiler::new(&CAT);
        let unit = CompileUnit::new(&compiler, fx.job("css/a.src", &source));
        unit.compile().unwrap();

        set_mtime(&source, 1_000);
        set_mtime(&unit.output_path(), 2_000);
        fs::remove_file(dep).unwrap();
        assert!(unit.should_compile().unwrap());
    }

    #[test]
    fn test_missing_program_is_command_error() {
        let fx = Fixture::new();
        let source = fx.write("a.src", "");
        let compiler = CommandCompiler::new(&CAT).program("/nonexistent/hashmark-compiler");
        let unit = CompileUnit::new(&compiler, fx.job("a.src", &source));

        let err = unit.compile().unwrap_err();
        assert!(matches!(err, CompilerError::Command(ExecError::NotFound(_))));
        assert!(!fx.output.exists("a.css"));
    }

    #[test]
    fn test_failing_program_surfaces_stderr() {
        let fx = Fixture::new();
        let source = fx.write("a.src", "");
        let script = fx.write("broken.sh", "#!/bin/sh\necho broken >&2\nexit 3\n");
        make_executable(&script);

        let compiler = CommandCompiler::new(&CAT).program(script.to_string_lossy());
        let unit = CompileUnit::new(&compiler, fx.job("a.src", &source));
        match unit.compile().unwrap_err() {
            CompilerError::Command(ExecError::Failed { stderr, .. }) => {
                assert!(stderr.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_outfile_mode_does_not_read_stdout() {
        let fx = Fixture::new();
        let source = fx.write("js/app.src", "x");
        let compiler = CommandCompiler::new(&CAT)
            .program("cp")
            .command("{program} {infile} {outfile}");
        let unit = CompileUnit::new(&compiler, fx.job("js/app.src", &source));

        unit.compile().unwrap();
        assert_eq!(fs::read_to_string(unit.output_path()).unwrap(), "x");
    }
}
