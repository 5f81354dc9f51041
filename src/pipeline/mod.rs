//! Build orchestration.
//!
//! One build walks a fixed sequence of stages:
//!
//! ```text
//! Discover -> Compile -> BuildDependencyGraph -> CopyFingerprint
//!   -> ReprocessDependents -> ApplyProcessors -> ResolveCollections
//!   -> ProcessCollections -> PersistStore -> Done
//! ```
//!
//! Compiler and processor failures are warnings; collection errors, store
//! errors and copy I/O abort the build before the table is persisted.

mod report;

pub use report::BuildReport;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::collection::{CollectionError, MediaCollection, Resolution, resolve_templates};
use crate::compiler::{CompileJob, CompileUnit, CompilerError};
use crate::config::{Config, ConfigError};
use crate::deps::{DependencyGraph, linked_files};
use crate::handlers::Handlers;
use crate::logger::Progress;
use crate::processor::{Outcome, ProcessContext};
use crate::storage::{FileSystemStorage, SourceFinder, Storage};
use crate::store::{ContentStore, StoreError, cache_key};
use crate::template::StaticContext;
use crate::utils::plural_count;
use crate::utils::url::UrlParts;
use crate::{debug, log};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error("collection `{collection}`: member `{member}` is not a known asset")]
    MissingMember { collection: String, member: String },

    #[error("I/O error on `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{0}` was not found in any source root")]
    UnknownAsset(String),

    #[error("no template declares collection `{0}`")]
    UnknownCollection(String),

    #[error(transparent)]
    Compile(#[from] CompilerError),
}

impl PipelineError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Build stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discover,
    Compile,
    BuildDependencyGraph,
    CopyFingerprint,
    ReprocessDependents,
    ApplyProcessors,
    ResolveCollections,
    ProcessCollections,
    PersistStore,
    Done,
}

impl Stage {
    pub const fn next(self) -> Self {
        match self {
            Self::Discover => Self::Compile,
            Self::Compile => Self::BuildDependencyGraph,
            Self::BuildDependencyGraph => Self::CopyFingerprint,
            Self::CopyFingerprint => Self::ReprocessDependents,
            Self::ReprocessDependents => Self::ApplyProcessors,
            Self::ApplyProcessors => Self::ResolveCollections,
            Self::ResolveCollections => Self::ProcessCollections,
            Self::ProcessCollections => Self::PersistStore,
            Self::PersistStore | Self::Done => Self::Done,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Compile => "compile",
            Self::BuildDependencyGraph => "dependencies",
            Self::CopyFingerprint => "fingerprint",
            Self::ReprocessDependents => "reprocess",
            Self::ApplyProcessors => "process",
            Self::ResolveCollections => "collect",
            Self::ProcessCollections => "bundle",
            Self::PersistStore => "persist",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to run builds for one config.
pub struct Pipeline<'c> {
    config: &'c Config,
    handlers: Handlers,
    finder: SourceFinder,
    output: FileSystemStorage,
    ignore: Vec<Regex>,
}

impl<'c> Pipeline<'c> {
    pub fn new(config: &'c Config) -> Result<Self, PipelineError> {
        let handlers =
            Handlers::from_config(&config.compilers, &config.processors).map_err(ConfigError::from)?;
        let static_url = config.paths.static_url.as_str();
        let roots = config
            .paths
            .sources
            .iter()
            .map(|root| FileSystemStorage::new(root, static_url))
            .collect();

        debug!(
            "build";
            "{} and {} registered",
            plural_count(handlers.compiler_count(), "compiler"),
            plural_count(handlers.processor_count(), "processor")
        );

        Ok(Self {
            config,
            handlers,
            finder: SourceFinder::new(roots),
            output: FileSystemStorage::new(&config.paths.output, static_url),
            ignore: config.build.ignore_patterns(),
        })
    }

    fn open_store(&self) -> Result<ContentStore, StoreError> {
        ContentStore::open(
            self.output.clone(),
            &self.config.paths.store,
            self.config.build.enabled,
        )
    }

    fn static_url(&self) -> &str {
        &self.config.paths.static_url
    }

    /// Run one full build.
    ///
    /// `clean` rewrites every file, fresh or not.
    pub fn run(&self, clean: bool) -> Result<BuildReport, PipelineError> {
        let mut store = self.open_store()?;
        store.begin_build();

        let mut build = Build {
            pipeline: self,
            store,
            clean,
            working: BTreeMap::new(),
            graph: DependencyGraph::new(),
            processed: Vec::new(),
            processed_keys: FxHashSet::default(),
            collections: Vec::new(),
            report: BuildReport::default(),
        };

        let mut stage = Stage::Discover;
        while stage != Stage::Done {
            debug!("build"; "stage {}", stage);
            build.step(stage)?;
            stage = stage.next();
        }

        Ok(build.report)
    }

    /// URL of a logical name as templates see it: compiled name first,
    /// then the fingerprint table.
    pub fn url(&self, name: &str) -> Result<String, PipelineError> {
        let store = self.open_store()?;
        let parts = UrlParts::split(name);
        let public = self.handlers.public_name(parts.path);
        Ok(store.url(&format!("{public}{}", parts.suffix)))
    }

    /// Compile one source on demand, returning the file to serve.
    ///
    /// Sources without a compiler are served as they are.
    pub fn compile_one(&self, name: &str) -> Result<PathBuf, PipelineError> {
        let name = name.trim_start_matches('/');
        let source = self
            .finder
            .storage_for(name)
            .map(|root| root.path(name))
            .ok_or_else(|| PipelineError::UnknownAsset(name.to_string()))?;

        let Some(compiler) = self.handlers.compiler_for(name) else {
            return Ok(source);
        };

        let unit = CompileUnit::new(compiler, self.job(name, &source));
        if unit.should_compile()? {
            unit.compile()?;
            log!("compile"; "{} -> {}", name, unit.out_name());
        } else {
            debug!("compile"; "{} is fresh", unit.out_name());
        }
        Ok(unit.output_path())
    }

    /// The tag that replaces collection `path`, pointing at its
    /// fingerprinted bundle.
    pub fn tag(&self, path: &str) -> Result<String, PipelineError> {
        let resolution = self.resolve_templates()?;
        let collection = resolution
            .collections
            .get(path)
            .ok_or_else(|| PipelineError::UnknownCollection(path.to_string()))?;
        Ok(collection.html(&self.url(path)?))
    }

    fn resolve_templates(&self) -> Result<Resolution, CollectionError> {
        let templates = &self.config.templates;
        let ctx = StaticContext::new(self.static_url(), templates.context.clone());
        resolve_templates(templates, &ctx)
    }

    fn job<'a>(&'a self, name: &'a str, source: &'a Path) -> CompileJob<'a> {
        CompileJob {
            name,
            source,
            output: &self.output,
            finder: &self.finder,
            timeout: self.config.build.timeout(),
        }
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|re| re.is_match(name))
    }

    /// Run every matching processor on the fingerprinted `hashed` file.
    fn apply_processors(&self, store: &ContentStore, hashed: &str, report: &mut BuildReport) {
        let ctx = ProcessContext {
            name: hashed,
            storage: store.storage(),
            table: store.entries(),
            root_url: self.static_url(),
            timeout: self.config.build.timeout(),
        };

        for processor in self.handlers.processors_for(hashed) {
            match processor.process(&ctx) {
                Ok(Outcome::Applied { output }) => {
                    log!("process"; "applied {} on {}", processor.label(), output);
                }
                Ok(Outcome::Skipped) => {
                    debug!("process"; "{} skipped {}", processor.label(), hashed);
                }
                Err(e) => report.warn(format!("{} failed on {}: {}", processor.label(), hashed, e)),
            }
        }
    }
}

/// State of one build pass.
struct Build<'p, 'c> {
    pipeline: &'p Pipeline<'c>,
    store: ContentStore,
    clean: bool,
    /// Logical name -> physical file to publish.
    working: BTreeMap<String, PathBuf>,
    graph: DependencyGraph,
    /// Hashed names written this pass, in write order.
    processed: Vec<String>,
    processed_keys: FxHashSet<String>,
    collections: Vec<MediaCollection>,
    report: BuildReport,
}

impl Build<'_, '_> {
    fn step(&mut self, stage: Stage) -> Result<(), PipelineError> {
        match stage {
            Stage::Discover => self.discover(),
            Stage::Compile => self.compile(),
            Stage::BuildDependencyGraph => self.build_graph(),
            Stage::CopyFingerprint => self.copy_all()?,
            Stage::ReprocessDependents => self.reprocess_dependents()?,
            Stage::ApplyProcessors => self.apply_processors(),
            Stage::ResolveCollections => self.resolve_collections()?,
            Stage::ProcessCollections => self.process_collections()?,
            Stage::PersistStore => self.persist()?,
            Stage::Done => {}
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<(), PipelineError> {
        self.report.removed = self.store.prune()?;
        if !self.report.removed.is_empty() {
            log!("store"; "removed {}", plural_count(self.report.removed.len(), "stale asset"));
        }
        self.store.persist()?;
        Ok(())
    }

    fn discover(&mut self) {
        for root in self.pipeline.finder.roots() {
            for name in root.list() {
                if self.pipeline.is_ignored(&name) || self.working.contains_key(&name) {
                    continue;
                }
                let path = root.path(&name);
                self.working.insert(name, path);
            }
        }
        log!("build"; "found {}", plural_count(self.working.len(), "asset"));
    }

    fn compile(&mut self) {
        let pipeline = self.pipeline;
        let sources: Vec<(String, PathBuf)> = self
            .working
            .iter()
            .filter(|(name, _)| pipeline.handlers.compiler_for(name).is_some())
            .map(|(name, path)| (name.clone(), path.clone()))
            .collect();

        for (name, source) in sources {
            let Some(compiler) = pipeline.handlers.compiler_for(&name) else {
                continue;
            };
            let unit = CompileUnit::new(compiler, pipeline.job(&name, &source));

            let result = unit.should_compile().and_then(|stale| {
                if stale {
                    unit.compile()?;
                    log!("compile"; "{} -> {}", name, unit.out_name());
                } else {
                    debug!("compile"; "{} is fresh", unit.out_name());
                }
                Ok(())
            });

            match result {
                Ok(()) => {
                    self.working.insert(unit.out_name().to_string(), unit.output_path());
                    if compiler.remove_original() {
                        self.working.remove(&name);
                    }
                }
                Err(e) => self
                    .report
                    .warn(format!("{} failed on {}: {}", compiler.label(), name, e)),
            }
        }
    }

    fn build_graph(&mut self) {
        let files: Vec<(String, PathBuf)> = self
            .working
            .iter()
            .map(|(name, path)| (name.clone(), path.clone()))
            .collect();
        self.graph = linked_files(&files, self.pipeline.static_url());
        debug!(
            "build";
            "{} referenced by stylesheets",
            plural_count(self.graph.reverse_count(), "asset")
        );
    }

    fn copy_one(&mut self, name: &str, force: bool) -> Result<(), PipelineError> {
        let Some(source) = self.working.get(name) else {
            return Ok(());
        };
        let copied = self.store.copy_file(source, name, force)?;
        if copied.processed && self.processed_keys.insert(copied.key.clone()) {
            self.processed.push(copied.hashed.clone());
        }
        self.report.record(name, &copied.hashed, copied.processed);
        Ok(())
    }

    fn copy_all(&mut self) -> Result<(), PipelineError> {
        let names: Vec<String> = self.working.keys().cloned().collect();
        let progress = Progress::new("copy", names.len());
        for name in &names {
            self.copy_one(name, self.clean)?;
            progress.tick();
        }
        progress.finish();
        Ok(())
    }

    /// Force-copy direct dependents of every processed key. Dependents of
    /// those dependents are left alone.
    fn reprocess_dependents(&mut self) -> Result<(), PipelineError> {
        if self.graph.is_empty() {
            return Ok(());
        }
        let changed: Vec<String> = self.processed_keys.iter().cloned().collect();
        let mut dependents: Vec<String> = changed
            .iter()
            .flat_map(|key| self.graph.dependents(key))
            .filter(|dep| !self.processed_keys.contains(*dep))
            .map(str::to_string)
            .collect();
        dependents.sort();
        dependents.dedup();

        for dep in dependents {
            debug!("build"; "reprocessing {}", dep);
            self.copy_one(&dep, true)?;
        }
        Ok(())
    }

    fn apply_processors(&mut self) {
        for hashed in &self.processed {
            self.pipeline
                .apply_processors(&self.store, hashed, &mut self.report);
        }
    }

    fn resolve_collections(&mut self) -> Result<(), PipelineError> {
        let resolution = self.pipeline.resolve_templates()?;

        for issue in resolution.issues {
            self.report.warn(issue.to_string());
        }
        log!(
            "collect";
            "parsed {}, found {}",
            plural_count(resolution.templates, "template"),
            plural_count(resolution.collections.len(), "collection")
        );
        self.collections = resolution.collections.iter().cloned().collect();
        Ok(())
    }

    fn process_collections(&mut self) -> Result<(), PipelineError> {
        let collections = std::mem::take(&mut self.collections);
        for collection in &collections {
            self.process_collection(collection)?;
        }
        self.report.collections = collections.len();
        Ok(())
    }

    fn process_collection(&mut self, collection: &MediaCollection) -> Result<(), PipelineError> {
        let pipeline = self.pipeline;
        let path = collection.path.as_str();
        if self.working.contains_key(path) {
            return Err(CollectionError::AssetCollision {
                path: path.to_string(),
            }
            .into());
        }

        let mut members = Vec::with_capacity(collection.media.len());
        for member in collection.member_names(pipeline.static_url())? {
            let name = pipeline.handlers.public_name(&member);
            let key = cache_key(&name).to_string();
            let Some(source) = self.working.get(&key) else {
                return Err(PipelineError::MissingMember {
                    collection: path.to_string(),
                    member,
                });
            };
            members.push((key, source.clone()));
        }

        let changed = members.iter().any(|(key, _)| self.processed_keys.contains(key));
        if !changed
            && !self.clean
            && pipeline.output.exists(path)
            && self
                .store
                .previous(path)
                .is_some_and(|hashed| pipeline.output.exists(hashed))
        {
            debug!("collect"; "{} is up to date", path);
            let copied = self.store.copy_file(&pipeline.output.path(path), path, false)?;
            self.report.record(path, &copied.hashed, copied.processed);
            return Ok(());
        }

        let mut texts = Vec::with_capacity(members.len());
        for (key, source) in members {
            let bytes = fs::read(&source).map_err(|e| PipelineError::io(&source, e))?;
            texts.push((key, String::from_utf8_lossy(&bytes).into_owned()));
        }
        let bundle = collection.render_bundle(&texts, pipeline.static_url());
        pipeline
            .output
            .save(path, bundle.as_bytes())
            .map_err(|e| PipelineError::io(pipeline.output.path(path), e))?;

        let copied = self
            .store
            .copy_file(&pipeline.output.path(path), path, true)?;
        log!("collect"; "{} <- {}", copied.hashed, plural_count(texts.len(), "member"));
        pipeline.apply_processors(&self.store, &copied.hashed, &mut self.report);
        self.report.record(path, &copied.hashed, true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::tests::set_mtime;
    use crate::config::{CompilerEntry, CompilerKind, ProcessorEntry, ProcessorKind};
    use tempfile::TempDir;

    struct Site {
        dir: TempDir,
        config: Config,
    }

    impl Site {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = Config::default();
            config.finalize(dir.path());
            Self { dir, config }
        }

        fn write(&self, name: &str, body: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, body).unwrap();
            path
        }

        fn asset(&self, name: &str, body: &str) -> PathBuf {
            self.write(&format!("static/{name}"), body)
        }

        fn build(&self) -> BuildReport {
            Pipeline::new(&self.config).unwrap().run(false).unwrap()
        }

        fn table(&self) -> String {
            fs::read_to_string(&self.config.paths.store).unwrap()
        }

        fn output(&self, name: &str) -> String {
            fs::read_to_string(self.config.paths.output.join(name)).unwrap()
        }

        fn hashed(&self, report: &BuildReport, input: &str) -> String {
            report
                .files
                .iter()
                .find(|f| f.input == input)
                .map(|f| f.output.clone())
                .unwrap()
        }
    }

    fn processed(report: &BuildReport) -> Vec<&str> {
        let mut names: Vec<_> = report.processed().map(|f| f.input.as_str()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_stage_order() {
        let mut stage = Stage::Discover;
        let mut seen = vec![stage];
        while stage != Stage::Done {
            stage = stage.next();
            seen.push(stage);
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[3], Stage::CopyFingerprint);
        assert_eq!(Stage::Done.next(), Stage::Done);
    }

    #[test]
    fn test_build_rewrites_urls_to_fingerprints() {
        let site = Site::new();
        site.asset("img/x.png", "png-1");
        site.asset("css/site.css", "body{background:url(../img/x.png)}");

        let report = site.build();
        let img = site.hashed(&report, "img/x.png");
        let css = site.hashed(&report, "css/site.css");

        assert_eq!(processed(&report), ["css/site.css", "img/x.png"]);
        assert_eq!(
            site.output(&css),
            format!("body{{background:url(/static/{img})}}")
        );
        let table: BTreeMap<String, String> = serde_json::from_str(&site.table()).unwrap();
        assert_eq!(table["img/x.png"], img);
    }

    #[test]
    fn test_second_build_is_noop() {
        let site = Site::new();
        site.asset("img/x.png", "png-1");
        site.asset("css/site.css", "body{background:url(../img/x.png)}");
        site.asset("js/app.js", "var a = 1;");

        site.build();
        let table = site.table();

        let second = site.build();
        assert!(second.processed().next().is_none());
        assert_eq!(second.files.len(), 3);
        assert_eq!(site.table(), table);
    }

    #[test]
    fn test_changed_reference_reprocesses_one_hop_only() {
        let site = Site::new();
        site.asset("img/x.png", "png-1");
        site.asset("css/b.css", "b{background:url(../img/x.png)}");
        site.asset("css/a.css", "@import \"b.css\";\na{color:red}");
        site.build();

        site.asset("img/x.png", "png-2");
        let report = site.build();

        // b.css references x.png directly; a.css only through b.css.
        assert_eq!(processed(&report), ["css/b.css", "img/x.png"]);
        let img = site.hashed(&report, "img/x.png");
        let b = site.hashed(&report, "css/b.css");
        assert_eq!(site.output(&b), format!("b{{background:url(/static/{img})}}"));
    }

    #[test]
    fn test_superseded_fingerprint_removed() {
        let site = Site::new();
        site.asset("js/app.js", "var a = 1;");
        let old = site.hashed(&site.build(), "js/app.js");

        site.asset("js/app.js", "var a = 2;");
        let new = site.hashed(&site.build(), "js/app.js");

        assert_ne!(old, new);
        assert!(!site.config.paths.output.join(&old).exists());
        assert!(site.config.paths.output.join(&new).exists());
    }

    #[test]
    fn test_deleted_source_dropped_from_table() {
        let site = Site::new();
        let a = site.asset("js/a.js", "var a = 1;");
        site.asset("js/b.js", "var b = 2;");
        let old = site.hashed(&site.build(), "js/a.js");
        fs::write(site.config.paths.output.join(format!("{old}.gz")), "gz").unwrap();

        fs::remove_file(a).unwrap();
        let report = site.build();

        let inputs: Vec<_> = report.files.iter().map(|f| f.input.as_str()).collect();
        assert_eq!(inputs, ["js/b.js"]);
        assert_eq!(report.removed, ["js/a.js"]);
        let table: BTreeMap<String, String> = serde_json::from_str(&site.table()).unwrap();
        assert!(!table.contains_key("js/a.js"));
        assert!(!site.config.paths.output.join(&old).exists());
        assert!(!site.config.paths.output.join(format!("{old}.gz")).exists());

        let pipeline = Pipeline::new(&site.config).unwrap();
        assert_eq!(pipeline.url("js/a.js").unwrap(), "/static/js/a.js");
    }

    #[test]
    fn test_compiler_failure_is_warning() {
        let mut site = Site::new();
        site.asset("js/app.coffee", "alert 1");
        site.asset("js/plain.js", "var p;");
        let mut coffee = CompilerEntry::new(CompilerKind::Coffee);
        coffee.program = Some("hashmark-missing-coffee".into());
        site.config.compilers.push(coffee);

        let report = site.build();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("coffee"));
        let inputs: Vec<_> = report.files.iter().map(|f| f.input.as_str()).collect();
        assert!(inputs.contains(&"js/plain.js"));
        assert!(!inputs.contains(&"js/app.js"));
        assert!(site.config.paths.store.exists());
    }

    #[test]
    fn test_compiler_keeps_original() {
        let mut site = Site::new();
        site.asset("js/app.coffee", "alert 1");
        // `cat {infile}` stands in for `coffee -c --print {infile}`
        let mut coffee = CompilerEntry::new(CompilerKind::Coffee);
        coffee.program = Some("cat".into());
        coffee.command = Some("{program} {infile}".into());
        coffee.remove_original = Some(false);
        site.config.compilers.push(coffee);

        let report = site.build();
        assert!(report.warnings.is_empty());
        assert_eq!(processed(&report), ["js/app.coffee", "js/app.js"]);
        assert_eq!(site.output(&site.hashed(&report, "js/app.js")), "alert 1");
        assert_eq!(site.output(&site.hashed(&report, "js/app.coffee")), "alert 1");
    }

    #[test]
    fn test_ignored_and_first_root_wins() {
        let mut site = Site::new();
        site.asset("css/a.css", "a{}");
        site.asset("css/a.css.map", "{}");
        site.write("vendor/css/a.css", "vendor{}");
        site.write("vendor/js/v.js", "v");
        site.config.build.ignore = vec!["*.map".into()];
        site.config.paths.sources.push(site.dir.path().join("vendor"));

        let report = site.build();
        let inputs: Vec<_> = report.files.iter().map(|f| f.input.as_str()).collect();
        assert_eq!(inputs, ["css/a.css", "js/v.js"]);
        assert_eq!(site.output(&site.hashed(&report, "css/a.css")), "a{}");
    }

    #[test]
    fn test_processor_failure_is_warning() {
        let mut site = Site::new();
        site.asset("img/x.png", "png");
        let mut optipng = ProcessorEntry::new(ProcessorKind::Optipng);
        optipng.program = Some("hashmark-missing-optipng".into());
        site.config.processors.push(optipng);

        let report = site.build();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("optipng"));
        assert_eq!(processed(&report), ["img/x.png"]);
    }

    #[test]
    fn test_collections_bundle_and_reuse() {
        let mut site = Site::new();
        site.config.templates.dirs = vec![site.dir.path().join("templates")];
        site.asset("js/a.js", "var a = 1;");
        site.asset("js/b.js", "var b = 2;");
        site.write(
            "templates/base.html",
            r#"{% mediacollection "js/all.js" %}
                <script src="{{ STATIC_URL }}js/a.js"></script>
                <script src="{% static "js/b.js" %}"></script>
            {% endmediacollection %}"#,
        );

        let first = site.build();
        assert_eq!(first.collections, 1);
        let bundle = site.hashed(&first, "js/all.js");
        assert_eq!(
            site.output(&bundle),
            ";(function(){\nvar a = 1;\n})();\n;(function(){\nvar b = 2;\n})();\n"
        );

        let second = site.build();
        assert!(second.processed().next().is_none());
        assert_eq!(site.hashed(&second, "js/all.js"), bundle);

        site.asset("js/b.js", "var b = 3;");
        let third = site.build();
        assert_eq!(processed(&third), ["js/all.js", "js/b.js"]);
        assert_ne!(site.hashed(&third, "js/all.js"), bundle);
    }

    #[test]
    fn test_removed_collection_dropped_and_tag() {
        let mut site = Site::new();
        site.config.templates.dirs = vec![site.dir.path().join("templates")];
        site.asset("js/a.js", "var a = 1;");
        site.write(
            "templates/base.html",
            r#"{% mediacollection "js/all.js" %}<script src="/static/js/a.js"></script>{% endmediacollection %}"#,
        );
        let bundle = site.hashed(&site.build(), "js/all.js");

        {
            let pipeline = Pipeline::new(&site.config).unwrap();
            assert_eq!(
                pipeline.tag("js/all.js").unwrap(),
                format!(r#"<script type="text/javascript" src="/static/{bundle}"></script>"#)
            );
            assert!(matches!(
                pipeline.tag("js/none.js"),
                Err(PipelineError::UnknownCollection(_))
            ));
        }

        site.write("templates/base.html", "<p>no bundles</p>");
        let report = site.build();
        assert_eq!(report.collections, 0);
        assert_eq!(report.removed, ["js/all.js"]);
        assert!(!site.config.paths.output.join(&bundle).exists());
    }

    #[test]
    fn test_collection_asset_collision_is_fatal() {
        let mut site = Site::new();
        site.config.templates.dirs = vec![site.dir.path().join("templates")];
        site.asset("js/a.js", "a");
        site.asset("js/all.js", "taken");
        site.write(
            "templates/base.html",
            r#"{% mediacollection "js/all.js" %}<script src="/static/js/a.js"></script>{% endmediacollection %}"#,
        );

        let result = Pipeline::new(&site.config).unwrap().run(false);
        assert!(matches!(
            result,
            Err(PipelineError::Collection(CollectionError::AssetCollision { .. }))
        ));
        assert!(!site.config.paths.store.exists());
    }

    #[test]
    fn test_url_lookup() {
        let mut site = Site::new();
        site.asset("fonts/icons.svg", "<svg/>");
        let report = site.build();
        let hashed = site.hashed(&report, "fonts/icons.svg");

        {
            let pipeline = Pipeline::new(&site.config).unwrap();
            assert_eq!(
                pipeline.url("fonts/icons.svg#glyph").unwrap(),
                format!("/static/{hashed}#glyph")
            );
            assert_eq!(pipeline.url("missing.css").unwrap(), "/static/missing.css");
        }

        site.config.build.enabled = false;
        let pipeline = Pipeline::new(&site.config).unwrap();
        assert_eq!(pipeline.url("fonts/icons.svg").unwrap(), "/static/fonts/icons.svg");
    }

    #[test]
    fn test_compile_one_plain_and_unknown() {
        let site = Site::new();
        let path = site.asset("js/app.js", "x");
        let pipeline = Pipeline::new(&site.config).unwrap();

        assert_eq!(pipeline.compile_one("/js/app.js").unwrap(), path);
        assert!(matches!(
            pipeline.compile_one("js/none.js"),
            Err(PipelineError::UnknownAsset(_))
        ));
    }

    #[test]
    fn test_less_pipeline_end_to_end() {
        if which::which("lessc").is_err() {
            return;
        }
        let mut site = Site::new();
        site.config.compilers = vec![crate::config::CompilerEntry::new(crate::config::CompilerKind::Less)];
        let a = site.asset("css/a.less", "@import \"b.less\";\nbody{color:@c}");
        let b = site.asset("css/b.less", "@c: red;");
        set_mtime(&a, 1_000_000);
        set_mtime(&b, 1_000_000);

        let report = site.build();
        let inputs: Vec<_> = report.files.iter().map(|f| f.input.as_str()).collect();
        assert_eq!(inputs, ["css/a.css", "css/b.css"]);
        let css: String = site
            .output(&site.hashed(&report, "css/a.css"))
            .split_whitespace()
            .collect();
        assert!(css == "body{color:#ff0000;}" || css == "body{color:red;}", "{css}");

        let pipeline = Pipeline::new(&site.config).unwrap();
        let job_source = site.dir.path().join("static/css/a.less");
        let compiler = pipeline.handlers.compiler_for("css/a.less").unwrap();
        let unit = CompileUnit::new(compiler, pipeline.job("css/a.less", &job_source));
        assert!(!unit.should_compile().unwrap());

        set_mtime(&b, 4_000_000_000);
        let unit = CompileUnit::new(compiler, pipeline.job("css/a.less", &job_source));
        assert!(unit.should_compile().unwrap());
    }
}
