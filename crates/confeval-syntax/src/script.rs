//! Loaded scripts and the classification of their top-level blocks.
//!
//! A script is parsed into generic [`Statement`]s first; the top level is then
//! classified into a closed set of [`BlockKind`]s the evaluator understands.
//! Anything unrecognized stays [`BlockKind::Opaque`] and is handed to the
//! scripting front end verbatim.

use crate::ast::*;
use crate::error::{Diagnostic, DiagnosticKind, Span};
use crate::lexer::tokenize;
use crate::parser::parse;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Settings,
    Project,
}

impl ScriptKind {
    /// `settings.gradle.kts` and `*.settings.*` files are settings scripts.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with("settings.") || name.contains(".settings.") {
            ScriptKind::Settings
        } else {
            ScriptKind::Project
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepositorySpec {
    Maven { url: String, span: Span },
    PluginPortal { span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DependencySpec {
    /// `classpath(files("a.jar", "b.jar"))`
    Files { paths: Vec<String>, span: Span },
    /// `classpath("group:name:version")`
    Module { notation: String, span: Span },
}

impl DependencySpec {
    pub fn span(&self) -> Span {
        match self {
            DependencySpec::Files { span, .. } | DependencySpec::Module { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildscriptBlock {
    pub repositories: Vec<RepositorySpec>,
    pub dependencies: Vec<DependencySpec>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginManagementBlock {
    pub repositories: Vec<RepositorySpec>,
    /// Default versions for plugin requests that omit one.
    pub plugins: Vec<PluginSpec>,
}

/// One `id("...")` entry of a `plugins {}` block.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSpec {
    pub id: String,
    pub version: Option<String>,
    pub apply: bool,
    pub span: Span,
}

/// Target of an imperative plugin application.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginRef {
    Class(String, Span),
    Id(String, Span),
}

impl PluginRef {
    pub fn span(&self) -> Span {
        match self {
            PluginRef::Class(_, span) | PluginRef::Id(_, span) => *span,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PluginRef::Class(name, _) | PluginRef::Id(name, _) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Buildscript(BuildscriptBlock),
    PluginManagement(PluginManagementBlock),
    Plugins(Vec<PluginSpec>),
    ApplyFrom(String),
    ApplyPlugins(Vec<PluginRef>),
    Opaque(Statement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopLevelBlock {
    pub name: String,
    /// Position of the block's opening token.
    pub span: Span,
    pub kind: BlockKind,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub path: PathBuf,
    pub dir: PathBuf,
    pub kind: ScriptKind,
    pub source: String,
    pub blocks: Vec<TopLevelBlock>,
}

impl Script {
    /// Reads and parses the script at `path`.
    pub fn load(path: &Path) -> Result<Script, Vec<Diagnostic>> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            vec![Diagnostic::unpositioned(
                DiagnosticKind::PathResolution,
                path,
                format!("Could not read script '{}': {}", path.display(), e),
            )]
        })?;
        Self::parse(path, source)
    }

    /// Parses `source` as the script located at `path`.
    pub fn parse(path: &Path, source: String) -> Result<Script, Vec<Diagnostic>> {
        let tokens = tokenize(&source).map_err(|e| vec![Diagnostic::from_lex_error(path, &e)])?;
        let statements = parse(tokens).map_err(|e| vec![Diagnostic::from_parse_error(path, &e)])?;

        let mut diagnostics = Vec::new();
        let mut blocks = Vec::with_capacity(statements.len());
        for stmt in statements {
            match classify(stmt) {
                Ok(block) => blocks.push(block),
                Err((span, message)) => {
                    diagnostics.push(Diagnostic::at(DiagnosticKind::Syntax, path, span, message))
                }
            }
        }

        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        Ok(Script {
            path: path.to_path_buf(),
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            kind: ScriptKind::from_path(path),
            source,
            blocks,
        })
    }

    pub fn buildscript(&self) -> Option<&BuildscriptBlock> {
        self.blocks.iter().find_map(|b| match &b.kind {
            BlockKind::Buildscript(block) => Some(block),
            _ => None,
        })
    }

    /// Statements handed to the front end, in declaration order.
    pub fn opaque_statements(&self) -> impl Iterator<Item = &Statement> {
        self.blocks.iter().filter_map(|b| match &b.kind {
            BlockKind::Opaque(stmt) => Some(stmt),
            _ => None,
        })
    }
}

type ClassifyResult<T> = Result<T, (Span, String)>;

fn classify(stmt: Statement) -> ClassifyResult<TopLevelBlock> {
    let name = stmt.name();
    let span = stmt.head_span();

    let kind = match &stmt {
        Statement::Expr(Expr::Call { callee, type_args, args, lambda, span: call_span }) => {
            match (callee.path().as_deref(), lambda) {
                (Some("buildscript"), Some(body)) if args.is_empty() => {
                    BlockKind::Buildscript(classify_buildscript(body)?)
                }
                (Some("pluginManagement"), Some(body)) if args.is_empty() => {
                    BlockKind::PluginManagement(classify_plugin_management(body)?)
                }
                (Some("plugins"), Some(body)) if args.is_empty() => {
                    BlockKind::Plugins(classify_plugin_specs(body)?)
                }
                (Some("apply"), _) => classify_apply(type_args, args, lambda.as_deref(), *call_span)?,
                _ => BlockKind::Opaque(stmt.clone()),
            }
        }
        _ => BlockKind::Opaque(stmt.clone()),
    };

    Ok(TopLevelBlock { name, span, kind })
}

fn classify_apply(
    type_args: &[String],
    args: &Args,
    lambda: Option<&[Statement]>,
    span: Span,
) -> ClassifyResult<BlockKind> {
    if let Some(body) = lambda {
        if !args.is_empty() || !type_args.is_empty() {
            return Err((span, "'apply' takes either arguments or a block, not both".to_string()));
        }
        let mut refs = Vec::with_capacity(body.len());
        for stmt in body {
            refs.push(classify_plugin_ref(stmt)?);
        }
        return Ok(BlockKind::ApplyPlugins(refs));
    }

    if let [type_name] = type_args {
        if args.is_empty() {
            return Ok(BlockKind::ApplyPlugins(vec![PluginRef::Class(type_name.clone(), span)]));
        }
    }

    match args.as_slice() {
        [Arg { name: Some(key), value }] if key == "from" => match value.as_str() {
            Some(reference) => Ok(BlockKind::ApplyFrom(reference.to_string())),
            None => Err((value.span(), "'apply(from = ...)' expects a string literal".to_string())),
        },
        [Arg { name: Some(key), value }] if key == "plugin" => match value.as_str() {
            Some(id) => Ok(BlockKind::ApplyPlugins(vec![PluginRef::Id(id.to_string(), span)])),
            None => Err((value.span(), "'apply(plugin = ...)' expects a string literal".to_string())),
        },
        _ => Err((
            span,
            "unsupported 'apply' form, expected 'apply(from = \"...\")', 'apply(plugin = \"...\")', 'apply<T>()' or 'apply { ... }'"
                .to_string(),
        )),
    }
}

fn classify_plugin_ref(stmt: &Statement) -> ClassifyResult<PluginRef> {
    if let Statement::Expr(Expr::Call { callee, type_args, args, lambda: None, span }) = stmt {
        if callee.path().as_deref() == Some("plugin") {
            if let ([type_name], true) = (type_args.as_slice(), args.is_empty()) {
                return Ok(PluginRef::Class(type_name.clone(), *span));
            }
            if let (true, [Arg { name: None, value }]) = (type_args.is_empty(), args.as_slice()) {
                if let Some(id) = value.as_str() {
                    return Ok(PluginRef::Id(id.to_string(), *span));
                }
            }
        }
    }
    Err((
        stmt.span(),
        "only 'plugin<T>()' and 'plugin(\"id\")' are allowed in an 'apply' block".to_string(),
    ))
}

fn classify_buildscript(body: &[Statement]) -> ClassifyResult<BuildscriptBlock> {
    let mut block = BuildscriptBlock::default();
    for stmt in body {
        match block_call(stmt) {
            Some(("repositories", inner)) => block.repositories.extend(classify_repositories(inner)?),
            Some(("dependencies", inner)) => block.dependencies.extend(classify_dependencies(inner)?),
            _ => {
                return Err((
                    stmt.span(),
                    format!("unexpected '{}' in 'buildscript' block", stmt.name()),
                ))
            }
        }
    }
    Ok(block)
}

fn classify_plugin_management(body: &[Statement]) -> ClassifyResult<PluginManagementBlock> {
    let mut block = PluginManagementBlock::default();
    for stmt in body {
        match block_call(stmt) {
            Some(("repositories", inner)) => block.repositories.extend(classify_repositories(inner)?),
            Some(("plugins", inner)) => block.plugins.extend(classify_plugin_specs(inner)?),
            _ => {
                return Err((
                    stmt.span(),
                    format!("unexpected '{}' in 'pluginManagement' block", stmt.name()),
                ))
            }
        }
    }
    Ok(block)
}

fn classify_repositories(body: &[Statement]) -> ClassifyResult<Vec<RepositorySpec>> {
    let mut repositories = Vec::with_capacity(body.len());
    for stmt in body {
        let repo = match stmt {
            Statement::Expr(Expr::Call { callee, args, lambda: None, span, .. }) => {
                match (callee.path().as_deref(), args.as_slice()) {
                    (Some("gradlePluginPortal") | Some("pluginPortal"), []) => {
                        Some(RepositorySpec::PluginPortal { span: *span })
                    }
                    (Some("maven"), [Arg { name, value }])
                        if name.is_none() || name.as_deref() == Some("url") =>
                    {
                        value.as_str().map(|url| RepositorySpec::Maven {
                            url: url.to_string(),
                            span: *span,
                        })
                    }
                    _ => None,
                }
            }
            _ => None,
        };
        match repo {
            Some(repo) => repositories.push(repo),
            None => {
                return Err((
                    stmt.span(),
                    format!("unsupported repository declaration '{}'", stmt.name()),
                ))
            }
        }
    }
    Ok(repositories)
}

fn classify_dependencies(body: &[Statement]) -> ClassifyResult<Vec<DependencySpec>> {
    let mut dependencies = Vec::with_capacity(body.len());
    for stmt in body {
        let dep = match stmt {
            Statement::Expr(Expr::Call { callee, args, lambda: None, span, .. })
                if callee.path().as_deref() == Some("classpath") =>
            {
                match args.as_slice() {
                    [Arg { name: None, value: Expr::Str(notation, _) }] => Some(DependencySpec::Module {
                        notation: notation.clone(),
                        span: *span,
                    }),
                    [Arg { name: None, value: Expr::Call { callee: files, args: file_args, lambda: None, .. } }]
                        if files.path().as_deref() == Some("files") =>
                    {
                        let paths: Option<Vec<String>> = file_args
                            .iter()
                            .map(|a| a.value.as_str().map(str::to_string))
                            .collect();
                        paths.map(|paths| DependencySpec::Files { paths, span: *span })
                    }
                    _ => None,
                }
            }
            _ => None,
        };
        match dep {
            Some(dep) => dependencies.push(dep),
            None => {
                return Err((
                    stmt.span(),
                    "only 'classpath(\"group:name:version\")' and 'classpath(files(...))' are allowed in 'dependencies'"
                        .to_string(),
                ))
            }
        }
    }
    Ok(dependencies)
}

fn classify_plugin_specs(body: &[Statement]) -> ClassifyResult<Vec<PluginSpec>> {
    let mut specs = Vec::with_capacity(body.len());
    for stmt in body {
        let spec = match stmt {
            Statement::Expr(expr) => plugin_spec(expr),
            _ => None,
        };
        match spec {
            Some(spec) => specs.push(spec),
            None => {
                return Err((
                    stmt.span(),
                    "only 'id(\"...\")' plugin requests, optionally followed by 'version' and 'apply', are allowed in a 'plugins' block"
                        .to_string(),
                ))
            }
        }
    }
    Ok(specs)
}

/// Unwraps `id("x").version("1").apply(false)` and its infix spelling.
fn plugin_spec(expr: &Expr) -> Option<PluginSpec> {
    let (modifier, receiver, value) = match expr {
        Expr::Call { callee, type_args, args, lambda: None, span } if type_args.is_empty() => {
            match (callee.as_ref(), args.as_slice()) {
                (Expr::Ident(name, _), [Arg { name: None, value: Expr::Str(id, _) }]) if name == "id" => {
                    return Some(PluginSpec {
                        id: id.clone(),
                        version: None,
                        apply: true,
                        span: *span,
                    });
                }
                (Expr::Member { receiver, name, .. }, [Arg { name: None, value }]) => {
                    (name.as_str(), receiver.as_ref(), value)
                }
                _ => return None,
            }
        }
        Expr::Infix { left, name, right, .. } => (name.as_str(), left.as_ref(), right.as_ref()),
        _ => return None,
    };

    let mut spec = plugin_spec(receiver)?;
    match modifier {
        "version" if spec.version.is_none() => spec.version = Some(value.as_str()?.to_string()),
        "apply" => spec.apply = value.as_bool()?,
        _ => return None,
    }
    Some(spec)
}

/// `name { ... }` with no arguments.
fn block_call(stmt: &Statement) -> Option<(&str, &[Statement])> {
    match stmt {
        Statement::Expr(Expr::Call { callee, args, lambda: Some(body), .. }) if args.is_empty() => {
            match callee.as_ref() {
                Expr::Ident(name, _) => Some((name.as_str(), body.as_slice())),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(source: &str) -> Script {
        Script::parse(Path::new("/work/settings.gradle.kts"), source.to_string()).unwrap()
    }

    #[test]
    fn classifies_recognized_blocks() {
        let s = script(
            r#"
pluginManagement {
    repositories { maven(url = "repo") }
}
buildscript {
    dependencies { classpath(files("fixture.jar")) }
}
plugins {
    id("test.MySettingsPlugin").version("1.0")
}
apply(from = "other.settings.gradle.kts")
println("done")
"#,
        );

        let names: Vec<_> = s.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["pluginManagement", "buildscript", "plugins", "apply", "println"]);
        assert!(matches!(s.blocks[0].kind, BlockKind::PluginManagement(_)));
        assert!(matches!(s.blocks[3].kind, BlockKind::ApplyFrom(ref r) if r == "other.settings.gradle.kts"));
        assert!(matches!(s.blocks[4].kind, BlockKind::Opaque(_)));
        assert_eq!(s.kind, ScriptKind::Settings);
        assert_eq!(s.dir, PathBuf::from("/work"));
    }

    #[test]
    fn block_span_points_at_name() {
        let s = script("\n            pluginManagement {}\n            pluginManagement {}\n");
        assert_eq!((s.blocks[1].span.line, s.blocks[1].span.col), (3, 13));
    }

    #[test]
    fn plugin_spec_forms() {
        let s = script(
            r#"
plugins {
    id("a")
    id("b") version "2.0"
    id("c").version("3.0").apply(false)
}
"#,
        );
        let BlockKind::Plugins(specs) = &s.blocks[0].kind else {
            panic!("Expected plugins block");
        };
        assert_eq!(specs[0].version, None);
        assert_eq!(specs[1].version.as_deref(), Some("2.0"));
        assert_eq!(specs[2].id, "c");
        assert!(!specs[2].apply);
    }

    #[test]
    fn imperative_apply_forms() {
        let s = script("apply { plugin<MySettingsPlugin>() }\napply<Other>()\napply(plugin = \"x.y\")");
        assert!(matches!(&s.blocks[0].kind, BlockKind::ApplyPlugins(r) if r[0] == PluginRef::Class("MySettingsPlugin".into(), r[0].span())));
        assert!(matches!(&s.blocks[1].kind, BlockKind::ApplyPlugins(r) if r[0].name() == "Other"));
        assert!(matches!(&s.blocks[2].kind, BlockKind::ApplyPlugins(r) if matches!(r[0], PluginRef::Id(..))));
    }

    #[test]
    fn rejects_foreign_statement_in_plugins_block() {
        let err = Script::parse(
            Path::new("settings.gradle.kts"),
            "plugins {\n    println(\"x\")\n}".to_string(),
        )
        .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].kind, DiagnosticKind::Syntax);
        assert_eq!(err[0].line, 2);
    }

    #[test]
    fn script_kind_from_file_name() {
        assert_eq!(ScriptKind::from_path(Path::new("gradle/my.settings.gradle.kts")), ScriptKind::Settings);
        assert_eq!(ScriptKind::from_path(Path::new("build.gradle.kts")), ScriptKind::Project);
    }
}
