//! Script classpath assembly.
//!
//! A script's classpath is what its `buildscript { dependencies { ... } }`
//! block declares, followed by the build-logic artifacts shared by the whole
//! build. Declarations are resolved independently (in parallel when there is
//! more than one) and applied in declaration order.

use crate::artifact::{Artifact, ClassDef, Coordinates, PluginDef};
use crate::path_resolver;
use crate::repository::{Repository, RepositoryTransport};
use confeval_syntax::error::{Diagnostic, DiagnosticKind, Span};
use confeval_syntax::script::{DependencySpec, Script};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClasspathSource {
    /// Declared in the script's own `buildscript` block.
    Buildscript,
    /// Shared build-logic directory.
    BuildSrc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathEntry {
    pub path: PathBuf,
    pub source: ClasspathSource,
}

/// Ordered, deduplicated classpath with the artifact loaded for each entry.
#[derive(Debug, Clone, Default)]
pub struct Classpath {
    entries: Vec<ClasspathEntry>,
    artifacts: Vec<Arc<Artifact>>,
    seen: FxHashSet<PathBuf>,
}

impl Classpath {
    pub fn single(entry: ClasspathEntry, artifact: Arc<Artifact>) -> Self {
        let mut classpath = Self::default();
        classpath.push(entry, artifact);
        classpath
    }

    pub fn entries(&self) -> &[ClasspathEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `entry` unless an entry with the same canonical path exists.
    pub fn push(&mut self, entry: ClasspathEntry, artifact: Arc<Artifact>) -> bool {
        let key = std::fs::canonicalize(&entry.path).unwrap_or_else(|_| entry.path.clone());
        if !self.seen.insert(key) {
            debug!(path = %entry.path.display(), "duplicate classpath entry skipped");
            return false;
        }
        self.entries.push(entry);
        self.artifacts.push(artifact);
        true
    }

    pub fn extend(&mut self, other: &Classpath) {
        for (entry, artifact) in other.entries.iter().zip(&other.artifacts) {
            self.push(entry.clone(), Arc::clone(artifact));
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&ClasspathEntry, &Arc<Artifact>)> {
        self.entries.iter().zip(&self.artifacts)
    }

    /// First class named `name`, together with where it came from.
    pub fn find_class(&self, name: &str) -> Option<(&ClassDef, ClasspathSource)> {
        self.iter()
            .find_map(|(entry, artifact)| artifact.class(name).map(|class| (class, entry.source)))
    }

    /// First plugin whose id or class is `name`.
    pub fn find_plugin(&self, name: &str) -> Option<(&PluginDef, &ClasspathEntry, &Arc<Artifact>)> {
        self.iter()
            .find_map(|(entry, artifact)| artifact.plugin(name).map(|plugin| (plugin, entry, artifact)))
    }
}

/// A single classpath declaration, resolved independently of the others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// `files(...)` entry, already resolved against the script directory.
    File(PathBuf),
    /// `group:name:version` notation.
    Module(String),
}

/// Resolves classpath declarations to files.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, declaration: &Declaration, repositories: &[Repository]) -> Result<ClasspathEntry, String>;
}

/// Checks file declarations on disk and fetches module declarations from the
/// `buildscript` repositories in order.
pub struct DefaultDependencyResolver {
    transport: Arc<dyn RepositoryTransport>,
}

impl DefaultDependencyResolver {
    pub fn new(transport: Arc<dyn RepositoryTransport>) -> Self {
        Self { transport }
    }
}

impl DependencyResolver for DefaultDependencyResolver {
    fn resolve(&self, declaration: &Declaration, repositories: &[Repository]) -> Result<ClasspathEntry, String> {
        let path = match declaration {
            Declaration::File(path) => {
                if !path.is_file() {
                    return Err(format!(
                        "Could not resolve classpath file '{}' as it does not exist.",
                        path.display()
                    ));
                }
                path.clone()
            }
            Declaration::Module(notation) => {
                let coordinates = Coordinates::parse(notation).map_err(|e| e.to_string())?;
                if repositories.is_empty() {
                    return Err(format!(
                        "Cannot resolve external dependency {} because no repositories are defined.",
                        coordinates
                    ));
                }

                let mut failures = Vec::new();
                let mut found = None;
                for repository in repositories {
                    match self.transport.fetch(&coordinates, repository) {
                        Ok(location) => {
                            found = Some(location.path);
                            break;
                        }
                        Err(e) if e.is_not_found() => {}
                        Err(e) => failures.push(e.to_string()),
                    }
                }

                match found {
                    Some(path) => path,
                    None => {
                        let searched: Vec<String> = repositories.iter().map(|r| r.to_string()).collect();
                        let mut message =
                            format!("Could not find {}. Searched in: {}", coordinates, searched.join(", "));
                        for failure in failures {
                            message.push_str(&format!("\n  {}", failure));
                        }
                        return Err(message);
                    }
                }
            }
        };

        Ok(ClasspathEntry {
            path,
            source: ClasspathSource::Buildscript,
        })
    }
}

pub struct ClasspathAssembler<'a> {
    resolver: &'a dyn DependencyResolver,
    /// Repository `gradlePluginPortal()` stands for.
    portal: &'a Repository,
    max_threads: usize,
}

impl<'a> ClasspathAssembler<'a> {
    pub fn new(resolver: &'a dyn DependencyResolver, portal: &'a Repository) -> Self {
        Self {
            resolver,
            portal,
            max_threads: 0,
        }
    }

    /// Builder: limit resolution threads (`0` = rayon default).
    pub fn with_max_threads(mut self, n: usize) -> Self {
        self.max_threads = n;
        self
    }

    /// Assembles the classpath of `script`: its `buildscript` declarations
    /// first, then the shared `build_src` entries.
    ///
    /// Every broken declaration yields one diagnostic positioned at the
    /// declaration; the rest of the classpath is still assembled.
    pub fn assemble(&self, script: &Script, build_src: &Classpath) -> (Classpath, Vec<Diagnostic>) {
        let mut classpath = Classpath::default();
        let mut diagnostics = Vec::new();

        if let Some(block) = script.buildscript() {
            let repositories: Vec<Repository> = block
                .repositories
                .iter()
                .map(|spec| Repository::from_spec(spec, &script.dir, self.portal))
                .collect();

            let declarations: Vec<(Declaration, Span)> = block
                .dependencies
                .iter()
                .flat_map(|dep| match dep {
                    DependencySpec::Files { paths, span } => paths
                        .iter()
                        .map(|p| (Declaration::File(path_resolver::resolve(&script.dir, p)), *span))
                        .collect::<Vec<_>>(),
                    DependencySpec::Module { notation, span } => {
                        vec![(Declaration::Module(notation.clone()), *span)]
                    }
                })
                .collect();

            let results = self.resolve_all(&declarations, &repositories);
            for ((_, span), result) in declarations.iter().zip(results) {
                match result {
                    Ok((entry, artifact)) => {
                        classpath.push(entry, Arc::new(artifact));
                    }
                    Err(message) => diagnostics.push(Diagnostic::at(
                        DiagnosticKind::ClasspathAssembly,
                        &script.path,
                        *span,
                        message,
                    )),
                }
            }
        }

        classpath.extend(build_src);
        debug!(
            script = %script.path.display(),
            entries = classpath.len(),
            failures = diagnostics.len(),
            "classpath assembled"
        );
        (classpath, diagnostics)
    }

    fn resolve_one(
        &self,
        declaration: &Declaration,
        repositories: &[Repository],
    ) -> Result<(ClasspathEntry, Artifact), String> {
        let entry = self.resolver.resolve(declaration, repositories)?;
        let artifact = Artifact::load(&entry.path).map_err(|e| format!("{:#}", e))?;
        Ok((entry, artifact))
    }

    /// Resolves every declaration; results keep declaration order.
    fn resolve_all(
        &self,
        declarations: &[(Declaration, Span)],
        repositories: &[Repository],
    ) -> Vec<Result<(ClasspathEntry, Artifact), String>> {
        let run = || {
            declarations
                .par_iter()
                .map(|(declaration, _)| self.resolve_one(declaration, repositories))
                .collect::<Vec<_>>()
        };

        if self.max_threads == 0 || declarations.len() < 2 {
            return run();
        }

        match rayon::ThreadPoolBuilder::new().num_threads(self.max_threads).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!(error = %e, "could not build resolution thread pool, using the global pool");
                run()
            }
        }
    }
}

/// Loads every artifact under `<build_src>/libs`, in file name order.
///
/// A missing build-logic directory yields an empty classpath.
pub fn load_build_src(build_src: &Path) -> (Classpath, Vec<Diagnostic>) {
    let mut classpath = Classpath::default();
    let mut diagnostics = Vec::new();

    let libs = build_src.join("libs");
    if !libs.is_dir() {
        return (classpath, diagnostics);
    }

    let pattern = libs.join("*").to_string_lossy().into_owned();
    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            diagnostics.push(Diagnostic::unpositioned(
                DiagnosticKind::ClasspathAssembly,
                &libs,
                format!("Invalid build-logic directory: {}", e),
            ));
            return (classpath, diagnostics);
        }
    };

    for path in paths {
        let path = match path {
            Ok(path) if path.is_file() => path,
            Ok(_) => continue,
            Err(e) => {
                diagnostics.push(Diagnostic::unpositioned(
                    DiagnosticKind::ClasspathAssembly,
                    e.path(),
                    e.to_string(),
                ));
                continue;
            }
        };
        match Artifact::load(&path) {
            Ok(artifact) => {
                classpath.push(
                    ClasspathEntry {
                        path,
                        source: ClasspathSource::BuildSrc,
                    },
                    Arc::new(artifact),
                );
            }
            Err(e) => diagnostics.push(Diagnostic::unpositioned(
                DiagnosticKind::ClasspathAssembly,
                &path,
                format!("{:#}", e),
            )),
        }
    }

    debug!(dir = %build_src.display(), entries = classpath.len(), "build-logic classpath loaded");
    (classpath, diagnostics)
}
