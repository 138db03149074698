//! Configuration evaluation.
//!
//! Every script moves through `Pending → ClasspathAssembling →
//! GrammarValidating → Executing → Applied`, or ends in `Failed`. Scripts
//! applied with `apply(from = ...)` are evaluated depth-first against a staged
//! copy of the model that is committed to the parent only once the child is
//! `Applied`. Once a settings script is applied, each project's
//! `build.gradle.kts` goes through the same pipeline.

use crate::classpath::{load_build_src, Classpath, ClasspathAssembler, ClasspathEntry, ClasspathSource};
use crate::classpath::{DefaultDependencyResolver, DependencyResolver};
use crate::config::Config;
use crate::error::{Failure, ResolutionError};
use crate::host::{HostEnv, Locals, ScriptHost, BUILD_SRC_DEPRECATION};
use crate::interpreter::Interpreter;
use crate::model::{ModelHandle, SettingsModel, Target};
use crate::path_resolver;
use crate::repository::{
    Applicator, DefaultTransport, PluginOrigin, PluginRepositoryClient, PluginRequest, Repository,
    RepositoryTransport, ResolvedPlugin,
};
use crate::validator;
use confeval_syntax::error::{Diagnostic, DiagnosticKind, Span};
use confeval_syntax::parse_source;
use confeval_syntax::script::{BlockKind, PluginManagementBlock, PluginRef, PluginSpec, Script, ScriptKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Build script evaluated for each project once settings are applied.
pub const BUILD_SCRIPT_NAME: &str = "build.gradle.kts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Pending,
    ClasspathAssembling,
    GrammarValidating,
    Executing,
    Applied,
    Failed,
}

/// Final state of one visited script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRecord {
    pub path: PathBuf,
    /// Nesting level, `0` for the root script.
    pub depth: usize,
    pub state: ScriptState,
}

#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    /// Visited scripts in pre-order.
    pub scripts: Vec<ScriptRecord>,
    pub model: SettingsModel,
}

impl EvaluationResult {
    pub fn script_state(&self, path: &Path) -> Option<ScriptState> {
        self.scripts.iter().find(|r| r.path == path).map(|r| r.state)
    }
}

/// Evaluates the script at `root_script` with the configuration found from
/// the working directory.
pub fn evaluate_configuration(root_script: &Path) -> EvaluationResult {
    let start = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = Config::load(&start).unwrap_or_else(|e| {
        warn!(error = %format!("{:#}", e), "ignoring unreadable configuration");
        Config::default()
    });
    Evaluator::new(config).evaluate_configuration(root_script)
}

pub struct Evaluator {
    config: Config,
    host: Box<dyn ScriptHost>,
    transport: Arc<dyn RepositoryTransport>,
    resolver: Arc<dyn DependencyResolver>,
    portal: Repository,
}

impl Evaluator {
    pub fn new(config: Config) -> Self {
        let transport: Arc<dyn RepositoryTransport> = Arc::new(DefaultTransport::new(&config));
        let resolver = Arc::new(DefaultDependencyResolver::new(Arc::clone(&transport)));
        let portal = Repository::from_location(&config.plugin_portal_url, &config.search_root());
        Self {
            config,
            host: Box::new(Interpreter),
            transport,
            resolver,
            portal,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn portal(&self) -> &Repository {
        &self.portal
    }

    pub fn with_host(mut self, host: impl ScriptHost + 'static) -> Self {
        self.host = Box::new(host);
        self
    }

    /// Replaces the transport; the default dependency resolver follows it.
    pub fn with_transport(mut self, transport: Arc<dyn RepositoryTransport>) -> Self {
        self.resolver = Arc::new(DefaultDependencyResolver::new(Arc::clone(&transport)));
        self.transport = transport;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Evaluates the configured settings script.
    pub fn evaluate(&self) -> EvaluationResult {
        self.evaluate_configuration(&self.config.settings_path())
    }

    pub fn evaluate_configuration(&self, root_script: &Path) -> EvaluationResult {
        let root = path_resolver::resolve(&self.config.search_root(), root_script);
        info!(script = %root.display(), "evaluating configuration");

        let mut model = SettingsModel::for_settings_file(&root);
        let mut session = Session::new(self);

        let build_src_dir = self.config.build_src_path();
        let (build_src, build_src_diagnostics) = load_build_src(&build_src_dir);
        let outcome = if build_src_diagnostics.is_empty() {
            if !build_src.is_empty() {
                debug!(dir = %build_src_dir.display(), entries = build_src.len(), "build-logic classpath loaded");
            }
            session.build_src = build_src;
            let kind = ScriptKind::from_path(&root);
            session
                .apply_script(root.clone(), None, Target::for_kind(kind), &mut model)
                .and_then(|()| match kind {
                    ScriptKind::Settings => session.apply_build_scripts(&root, &mut model),
                    ScriptKind::Project => Ok(()),
                })
        } else {
            Err(Failure(build_src_diagnostics))
        };

        let (success, diagnostics) = match outcome {
            Ok(()) => (true, Vec::new()),
            Err(Failure(diagnostics)) => (false, diagnostics),
        };
        if success {
            info!(scripts = session.scripts.len(), warnings = session.warnings.len(), "configuration applied");
        } else {
            info!(errors = diagnostics.len(), "configuration failed");
        }

        EvaluationResult {
            success,
            diagnostics,
            warnings: session.warnings,
            scripts: session.scripts,
            model,
        }
    }

    /// Runs the named tasks against an evaluated model and returns the
    /// warnings raised while doing so.
    ///
    /// A plain name selects the task in every project that registered it;
    /// `:project:task` selects a single one.
    pub fn run_tasks(&self, model: &mut SettingsModel, names: &[String]) -> Result<Vec<Diagnostic>, Failure> {
        let mut selected = Vec::new();
        for name in names {
            let matches = select_tasks(model, name);
            if matches.is_empty() {
                return Err(Failure::single(Diagnostic::unpositioned(
                    DiagnosticKind::Runtime,
                    &model.settings_file,
                    format!("Task '{}' not found in root project '{}'.", name, model.root_project.name),
                )));
            }
            selected.extend(matches);
        }

        let mut warnings = Vec::new();
        for (project, task_name) in selected {
            let Some(task) = model.project(&project).and_then(|p| p.task(&task_name)).cloned() else {
                continue;
            };
            info!(project = %project, task = %task.name, "running task");
            for action in &task.actions {
                let mut locals = Locals::default();
                let mut env = HostEnv {
                    script: &task.script,
                    kind: task.kind,
                    classpath: &task.classpath,
                    model: ModelHandle::new(model, Target::Project(project.clone())),
                    locals: &mut locals,
                    warnings: &mut warnings,
                };
                self.host.run(action, &mut env).map_err(Failure::single)?;
            }
        }
        Ok(warnings)
    }
}

/// `(project path, task name)` pairs `name` refers to, in project pre-order.
fn select_tasks(model: &SettingsModel, name: &str) -> Vec<(String, String)> {
    if let Some((project, task)) = name.rsplit_once(':').filter(|_| name.starts_with(':')) {
        let project = if project.is_empty() { ":" } else { project };
        return model
            .project(project)
            .and_then(|p| p.task(task))
            .map(|t| vec![(project.to_string(), t.name.clone())])
            .unwrap_or_default();
    }

    model
        .root_project
        .projects()
        .into_iter()
        .filter(|p| p.task(name).is_some())
        .map(|p| (p.path.clone(), name.to_string()))
        .collect()
}

/// State of one evaluation pass.
struct Session<'e> {
    evaluator: &'e Evaluator,
    build_src: Classpath,
    /// Scripts currently being applied, outermost first, as
    /// `(canonical path, path as requested)`.
    active: Vec<(PathBuf, PathBuf)>,
    scripts: Vec<ScriptRecord>,
    warnings: Vec<Diagnostic>,
    /// Script whose own body failed; its ancestors only propagate the failure.
    failed_at: Option<PathBuf>,
}

impl<'e> Session<'e> {
    fn new(evaluator: &'e Evaluator) -> Self {
        Self {
            evaluator,
            build_src: Classpath::default(),
            active: Vec::new(),
            scripts: Vec::new(),
            warnings: Vec::new(),
            failed_at: None,
        }
    }

    fn warn(&mut self, warning: Diagnostic) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    fn transition(&mut self, index: usize, state: ScriptState) {
        let record = &mut self.scripts[index];
        debug!(script = %record.path.display(), from = ?record.state, to = ?state, "script state transition");
        record.state = state;
    }

    /// Evaluates `build.gradle.kts` of the root project and of every included
    /// project, in project pre-order. Projects without one are skipped.
    fn apply_build_scripts(&mut self, settings: &Path, model: &mut SettingsModel) -> Result<(), Failure> {
        let root_dir = settings.parent().unwrap_or_else(|| Path::new("."));
        let projects: Vec<String> = model.root_project.projects().iter().map(|p| p.path.clone()).collect();
        for project in projects {
            let dir = project
                .split(':')
                .filter(|s| !s.is_empty())
                .fold(root_dir.to_path_buf(), |dir, segment| dir.join(segment));
            let script = dir.join(BUILD_SCRIPT_NAME);
            if !script.is_file() {
                debug!(project = %project, "no build script");
                continue;
            }
            debug!(project = %project, script = %script.display(), "evaluating build script");
            self.apply_script(script, None, Target::Project(project), model)?;
        }
        Ok(())
    }

    /// Applies the script at `path` to `model`.
    ///
    /// `origin` is the script and statement that requested it, `None` for
    /// the root script.
    fn apply_script(
        &mut self,
        path: PathBuf,
        origin: Option<(&Path, Span)>,
        target: Target,
        model: &mut SettingsModel,
    ) -> Result<(), Failure> {
        let report = |kind: DiagnosticKind, message: String| match origin {
            Some((parent, span)) => Diagnostic::at(kind, parent, span, message),
            None => Diagnostic::unpositioned(kind, &path, message),
        };

        // Symlinked directories give one file several lexical paths.
        let identity = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if let Some(start) = self.active.iter().position(|(active, _)| *active == identity) {
            let chain: Vec<String> = self.active[start..]
                .iter()
                .map(|(_, lexical)| lexical)
                .chain(std::iter::once(&path))
                .map(|p| p.display().to_string())
                .collect();
            self.failed_at = Some(path.clone());
            return Err(Failure::single(report(
                DiagnosticKind::CyclicApply,
                format!("Cyclic script application: {}", chain.join(" -> ")),
            )));
        }

        let index = self.scripts.len();
        self.scripts.push(ScriptRecord {
            path: path.clone(),
            depth: self.active.len(),
            state: ScriptState::Pending,
        });
        debug!(script = %path.display(), depth = self.active.len(), "script pending");

        if !path.is_file() {
            let diagnostic = report(
                DiagnosticKind::PathResolution,
                format!("Could not read script '{}' as it does not exist.", path.display()),
            );
            self.transition(index, ScriptState::Failed);
            self.failed_at = Some(path);
            return Err(Failure::single(diagnostic));
        }

        let mut staged = model.clone();
        self.active.push((identity, path.clone()));
        let result = self.run_script(&path, index, &target, &mut staged);
        self.active.pop();

        match result {
            Ok(()) => {
                *model = staged;
                self.transition(index, ScriptState::Applied);
                Ok(())
            }
            Err(failure) => {
                self.transition(index, ScriptState::Failed);
                if self.failed_at.is_some() {
                    // A descendant failed: keep what this script had done before it.
                    *model = staged;
                } else {
                    self.failed_at = Some(path);
                }
                Err(failure)
            }
        }
    }

    fn run_script(&mut self, path: &Path, index: usize, target: &Target, model: &mut SettingsModel) -> Result<(), Failure> {
        let script = Script::load(path).map_err(Failure)?;

        self.transition(index, ScriptState::ClasspathAssembling);
        let assembler = ClasspathAssembler::new(&*self.evaluator.resolver, &self.evaluator.portal)
            .with_max_threads(self.evaluator.config.max_parallel_threads);
        let (classpath, diagnostics) = assembler.assemble(&script, &self.build_src);
        if !diagnostics.is_empty() {
            return Err(Failure(diagnostics));
        }

        self.transition(index, ScriptState::GrammarValidating);
        let diagnostics = validator::validate(&script);
        if !diagnostics.is_empty() {
            return Err(Failure(diagnostics));
        }

        self.transition(index, ScriptState::Executing);
        let host = &*self.evaluator.host;
        let diagnostics: Vec<Diagnostic> = script
            .opaque_statements()
            .flat_map(|stmt| host.compile(&script.path, std::slice::from_ref(stmt), &classpath))
            .collect();
        if !diagnostics.is_empty() {
            return Err(Failure(diagnostics));
        }

        let mut locals = Locals::default();
        for block in &script.blocks {
            match &block.kind {
                BlockKind::Buildscript(_) => {}
                BlockKind::PluginManagement(management) => self.configure_plugin_management(&script, management, model),
                BlockKind::Plugins(specs) => self.apply_plugins_block(&script, specs, target, model)?,
                BlockKind::ApplyFrom(reference) => {
                    let child = path_resolver::resolve(&script.dir, reference);
                    debug!(parent = %script.path.display(), child = %child.display(), "applying script");
                    self.apply_script(child, Some((&script.path, block.span)), target.clone(), model)?;
                }
                BlockKind::ApplyPlugins(refs) => {
                    for plugin in refs {
                        self.apply_imperative(&script, &classpath, plugin, target, model)?;
                    }
                }
                BlockKind::Opaque(stmt) => {
                    let mut env = HostEnv {
                        script: &script.path,
                        kind: script.kind,
                        classpath: &classpath,
                        model: ModelHandle::new(model, target.clone()),
                        locals: &mut locals,
                        warnings: &mut self.warnings,
                    };
                    self.evaluator
                        .host
                        .run(std::slice::from_ref(stmt), &mut env)
                        .map_err(Failure::single)?;
                }
            }
        }
        Ok(())
    }

    fn configure_plugin_management(&self, script: &Script, block: &PluginManagementBlock, model: &mut SettingsModel) {
        let management = &mut model.plugin_management;
        for spec in &block.repositories {
            let repository = Repository::from_spec(spec, &script.dir, &self.evaluator.portal);
            if !management.repositories.contains(&repository) {
                debug!(%repository, "plugin repository added");
                management.repositories.push(repository);
            }
        }
        for plugin in &block.plugins {
            if let Some(version) = &plugin.version {
                management.versions.insert(plugin.id.clone(), version.clone());
            }
        }
    }

    /// Resolves every request of a `plugins {}` block, then applies them in
    /// order. Nothing is applied unless every request resolves and applies.
    fn apply_plugins_block(
        &mut self,
        script: &Script,
        specs: &[PluginSpec],
        target: &Target,
        model: &mut SettingsModel,
    ) -> Result<(), Failure> {
        let repositories = model.plugin_management.effective_repositories(&self.evaluator.portal);
        let client = PluginRepositoryClient::new(&*self.evaluator.transport);
        let no_classpath = Classpath::default();

        let mut resolved = Vec::with_capacity(specs.len());
        let mut diagnostics = Vec::new();
        for spec in specs {
            let request = PluginRequest {
                id: spec.id.clone(),
                version: spec
                    .version
                    .clone()
                    .or_else(|| model.plugin_management.versions.get(&spec.id).cloned()),
                applicator: Applicator::Declarative,
                apply: spec.apply,
                span: spec.span,
            };
            match client.resolve(&request, &repositories, &no_classpath) {
                Ok(plugin) => resolved.push((request, plugin)),
                Err(e) => diagnostics.push(resolution_diagnostic(&script.path, request.span, &e)),
            }
        }
        if !diagnostics.is_empty() {
            return Err(Failure(diagnostics));
        }

        let mut staged = model.clone();
        for (request, plugin) in &resolved {
            if !request.apply {
                debug!(plugin = %request.id, "resolved without applying");
                continue;
            }
            self.apply_plugin(script, plugin, request.span, target, &mut staged)?;
        }
        *model = staged;
        Ok(())
    }

    fn apply_imperative(
        &mut self,
        script: &Script,
        classpath: &Classpath,
        plugin: &PluginRef,
        target: &Target,
        model: &mut SettingsModel,
    ) -> Result<(), Failure> {
        let request = PluginRequest {
            id: plugin.name().to_string(),
            version: None,
            applicator: Applicator::Imperative,
            apply: true,
            span: plugin.span(),
        };
        let client = PluginRepositoryClient::new(&*self.evaluator.transport);
        let resolved = client
            .resolve(&request, &[], classpath)
            .map_err(|e| Failure::single(resolution_diagnostic(&script.path, request.span, &e)))?;

        if resolved.origin == PluginOrigin::Classpath(ClasspathSource::BuildSrc) && script.kind == ScriptKind::Settings {
            warn!(plugin = %request.id, script = %script.path.display(), "build-logic plugin applied from settings script");
            self.warn(Diagnostic::unpositioned(
                DiagnosticKind::DeprecatedUsage,
                &script.path,
                BUILD_SRC_DEPRECATION,
            ));
        }

        self.apply_plugin(script, &resolved, request.span, target, model)
    }

    /// Runs the plugin's apply body against `target` and records its id.
    fn apply_plugin(
        &mut self,
        script: &Script,
        plugin: &ResolvedPlugin,
        span: Span,
        target: &Target,
        model: &mut SettingsModel,
    ) -> Result<(), Failure> {
        let id = plugin.id().to_string();
        if ModelHandle::new(model, target.clone()).has_plugin(&id) {
            debug!(plugin = %id, "plugin already applied");
            return Ok(());
        }

        let statements = parse_source(&plugin.definition.apply).map_err(|e| {
            Failure::single(Diagnostic::at(
                DiagnosticKind::PluginResolution,
                &script.path,
                span,
                format!("Plugin '{}' has an invalid apply body: {}", id, e),
            ))
        })?;

        // The plugin body sees its own artifact only.
        let classpath = Classpath::single(
            ClasspathEntry {
                path: plugin.artifact_path.clone(),
                source: ClasspathSource::Buildscript,
            },
            Arc::clone(&plugin.artifact),
        );
        let mut locals = Locals::default();
        let mut env = HostEnv {
            script: &plugin.artifact_path,
            kind: script.kind,
            classpath: &classpath,
            model: ModelHandle::new(model, target.clone()),
            locals: &mut locals,
            warnings: &mut self.warnings,
        };
        self.evaluator.host.run(&statements, &mut env).map_err(Failure::single)?;
        env.model
            .record_plugin(id.as_str())
            .map_err(|message| Failure::single(Diagnostic::at(DiagnosticKind::Runtime, &script.path, span, message)))?;

        info!(plugin = %id, script = %script.path.display(), "plugin applied");
        Ok(())
    }
}

fn resolution_diagnostic(script: &Path, span: Span, error: &ResolutionError) -> Diagnostic {
    let kind = match error {
        ResolutionError::PluginClassNotFound(_) => DiagnosticKind::ClassNotFound,
        _ => DiagnosticKind::PluginResolution,
    };
    Diagnostic::at(kind, script, span, error.to_string())
}
