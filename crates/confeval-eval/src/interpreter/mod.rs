//! Tree-walking interpreter for opaque script statements.
//!
//! Submodules:
//! - [`expressions`] – expression evaluation, built-in calls and classpath classes

mod expressions;

use anyhow::Result;

use crate::bail_span;
use crate::classpath::Classpath;
use crate::error::EvalError;
use crate::host::{HostEnv, ScriptHost};
use crate::model::{Target, Task};
use crate::value::Value;
use confeval_syntax::ast::{Expr, Statement, walk_statements};
use confeval_syntax::error::{Diagnostic, DiagnosticKind, Span};
use std::path::Path;

/// The default [`ScriptHost`].
///
/// Understands `println`, `include`, `rootProject { }`, `project(":p") { }`,
/// `task("name") { doLast { } }`, `extra` properties, `val`s and classes
/// loaded from the script classpath. Anything else is an unresolved
/// reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl Interpreter {
    /// Executes a single statement.
    pub fn execute_statement(&self, stmt: &Statement, env: &mut HostEnv<'_>) -> Result<()> {
        match stmt {
            Statement::Val { name, value, delegated, span, .. } => {
                let value = if *delegated {
                    self.eval_delegate(name, value, span, env)?
                } else {
                    self.eval(value, env)?
                };
                env.locals.insert(name.clone(), value);
            }
            Statement::Assign { target, value, span } => self.assign(target, value, span, env)?,
            Statement::Expr(expr) => {
                self.eval(expr, env)?;
            }
        }
        Ok(())
    }

    pub fn execute_statements(&self, statements: &[Statement], env: &mut HostEnv<'_>) -> Result<()> {
        for stmt in statements {
            self.execute_statement(stmt, env)?;
        }
        Ok(())
    }

    /// Runs a lambda body; its `val`s do not outlive it.
    /// The value of a trailing expression statement is the block's value.
    fn execute_block(&self, body: &[Statement], env: &mut HostEnv<'_>) -> Result<Value> {
        let saved = env.locals.clone();
        let result = match body.split_last() {
            Some((Statement::Expr(last), rest)) => self
                .execute_statements(rest, env)
                .and_then(|_| self.eval(last, env)),
            _ => self.execute_statements(body, env).map(|_| Value::Unit),
        };
        *env.locals = saved;
        result
    }

    /// Runs `body` against another target, e.g. `rootProject { ... }`.
    fn execute_scoped(&self, target: Target, body: &[Statement], env: &mut HostEnv<'_>) -> Result<Value> {
        let mut inner = HostEnv {
            script: env.script,
            kind: env.kind,
            classpath: env.classpath,
            model: env.model.scoped(target),
            locals: &mut *env.locals,
            warnings: &mut *env.warnings,
        };
        self.execute_block(body, &mut inner)?;
        Ok(Value::Unit)
    }

    /// `val x by extra` reads an extension property, `val x by extra { v }`
    /// defines one.
    fn eval_delegate(&self, name: &str, delegate: &Expr, span: &Span, env: &mut HostEnv<'_>) -> Result<Value> {
        match delegate {
            Expr::Ident(id, _) if id == "extra" => match env.model.extra(name) {
                Some(value) => Ok(value.clone()),
                None => bail_span!(span, "Cannot get extra property '{}' as it does not exist", name),
            },
            Expr::Call { callee, args, lambda: Some(body), .. }
                if args.is_empty() && callee.path().as_deref() == Some("extra") =>
            {
                let value = self.execute_block(body, env)?;
                if let Err(message) = env.model.set_extra(name, value.clone()) {
                    bail_span!(span, "{}", message);
                }
                Ok(value)
            }
            other => bail_span!(
                other.span(),
                "Unsupported property delegate, expected 'extra' or 'extra {{ ... }}'"
            ),
        }
    }

    fn assign(&self, target: &Expr, value: &Expr, span: &Span, env: &mut HostEnv<'_>) -> Result<()> {
        let value = self.eval(value, env)?;
        let result = match target {
            Expr::Index { receiver, index, .. } if receiver.path().as_deref() == Some("extra") => {
                let key = self.eval(index, env)?;
                let Some(key) = key.as_str() else {
                    bail_span!(index.span(), "Extra property names must be strings, found {}", key.type_name());
                };
                env.model.set_extra(key, value)
            }
            Expr::Member { receiver, name, .. }
                if name == "name" && receiver.path().as_deref() == Some("rootProject") =>
            {
                let Some(name) = value.as_str() else {
                    bail_span!(span, "Type mismatch: 'rootProject.name' expects String, found {}", value.type_name());
                };
                env.model.set_root_project_name(name)
            }
            Expr::Ident(name, ident_span) if env.locals.contains_key(name) => {
                bail_span!(ident_span, "Val cannot be reassigned")
            }
            other => bail_span!(
                other.head_span(),
                "Unresolved reference: {}",
                other.path().unwrap_or_else(|| "assignment target".to_string())
            ),
        };
        if let Err(message) = result {
            bail_span!(span, "{}", message);
        }
        Ok(())
    }

    /// `task("name") { ... }`: `doFirst`/`doLast` blocks become actions,
    /// everything else configures the task right away.
    fn register_task(&self, name: String, body: &[Statement], span: &Span, env: &mut HostEnv<'_>) -> Result<Value> {
        let mut first: Vec<Vec<Statement>> = Vec::new();
        let mut last = Vec::new();
        let mut configure = Vec::new();

        for stmt in body {
            match stmt {
                Statement::Expr(Expr::Call { callee, args, lambda: Some(action), .. }) if args.is_empty() => {
                    match callee.path().as_deref() {
                        Some("doLast") => last.push(action.clone()),
                        Some("doFirst") => first.insert(0, action.clone()),
                        _ => configure.push(stmt.clone()),
                    }
                }
                other => configure.push(other.clone()),
            }
        }

        self.execute_block(&configure, env)?;
        first.extend(last);

        let task = Task {
            name,
            actions: first,
            classpath: env.classpath.clone(),
            script: env.script.to_path_buf(),
            kind: env.kind,
        };
        if let Err(message) = env.model.register_task(task) {
            bail_span!(span, "{}", message);
        }
        Ok(Value::Unit)
    }
}

impl ScriptHost for Interpreter {
    fn compile(&self, script: &Path, statements: &[Statement], classpath: &Classpath) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        walk_statements(statements, &mut |expr| {
            if let Expr::Call { callee, .. } = expr {
                if let Some(name) = expressions::class_reference(callee) {
                    if classpath.find_class(&name).is_none() {
                        diagnostics.push(Diagnostic::at(
                            DiagnosticKind::ClassNotFound,
                            script,
                            callee.head_span(),
                            format!("Unresolved reference: {}", expressions::simple_name(&name)),
                        ));
                    }
                }
            }
        });
        diagnostics
    }

    fn run(&self, statements: &[Statement], env: &mut HostEnv<'_>) -> Result<(), Diagnostic> {
        self.execute_statements(statements, env)
            .map_err(|e| EvalError::diagnostic_from(&e, env.script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::classpath::{ClasspathEntry, ClasspathSource};
    use crate::host::Locals;
    use crate::model::{ModelHandle, SettingsModel};
    use confeval_syntax::parse_source;
    use confeval_syntax::script::ScriptKind;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn deep_thought(source: ClasspathSource) -> Classpath {
        let artifact = Artifact::parse("[[classes]]\nname = \"DeepThought\"\nmembers = { compute = \"42\" }\n").unwrap();
        Classpath::single(ClasspathEntry { path: PathBuf::from("/b/fixture.jar"), source }, Arc::new(artifact))
    }

    fn run(
        source: &str,
        kind: ScriptKind,
        classpath: &Classpath,
        model: &mut SettingsModel,
    ) -> (Result<(), Diagnostic>, Vec<Diagnostic>) {
        let statements = parse_source(source).unwrap();
        let mut locals = Locals::default();
        let mut warnings = Vec::new();
        let mut env = HostEnv {
            script: Path::new("/b/settings.gradle.kts"),
            kind,
            classpath,
            model: ModelHandle::new(model, Target::for_kind(kind)),
            locals: &mut locals,
            warnings: &mut warnings,
        };
        let result = Interpreter.run(&statements, &mut env);
        (result, warnings)
    }

    fn model() -> SettingsModel {
        SettingsModel::new("/b/settings.gradle.kts", "b")
    }

    #[test]
    fn println_and_extra_properties() {
        let mut model = model();
        let (result, _) = run(
            "extra[\"greeting\"] = \"hi\"\nval greeting: String by extra\nprintln(greeting + \" there\")",
            ScriptKind::Settings,
            &Classpath::default(),
            &mut model,
        );
        result.unwrap();
        assert_eq!(model.output, vec!["hi there"]);
    }

    #[test]
    fn delegated_val_reads_property_named_after_it() {
        let mut model = model();
        let (result, _) = run(
            "extra[\"greeting\"] = \"hi\"\nval g: String by extra",
            ScriptKind::Settings,
            &Classpath::default(),
            &mut model,
        );
        let err = result.unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Runtime);
        assert_eq!(err.message, "Cannot get extra property 'g' as it does not exist");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn root_project_block_targets_root_project() {
        let mut model = model();
        let (result, _) = run(
            "rootProject.name = \"answers\"\ngradle.rootProject {\n    val answer by extra { \"42\" }\n}",
            ScriptKind::Settings,
            &Classpath::default(),
            &mut model,
        );
        result.unwrap();
        assert_eq!(model.root_project.name, "answers");
        assert_eq!(model.root_project.extra.get("answer"), Some(&Value::from("42")));
        assert!(model.extra.is_empty());
    }

    #[test]
    fn lambda_vals_do_not_leak() {
        let mut model = model();
        let (result, _) = run(
            "rootProject { val inner = \"x\" }\nprintln(inner)",
            ScriptKind::Settings,
            &Classpath::default(),
            &mut model,
        );
        let err = result.unwrap_err();
        assert_eq!(err.message, "Unresolved reference: inner");
        assert_eq!((err.line, err.column), (2, 9));
    }

    #[test]
    fn tasks_collect_actions_in_order() {
        let mut model = model();
        let (result, _) = run(
            "rootProject {\n    task(\"compute\") {\n        doLast { println(\"last\") }\n        doFirst { println(\"first\") }\n    }\n}",
            ScriptKind::Settings,
            &Classpath::default(),
            &mut model,
        );
        result.unwrap();
        let task = model.root_project.task("compute").unwrap();
        assert_eq!(task.actions.len(), 2);
        assert_eq!(task.actions[0][0].name(), "println");
        assert!(model.output.is_empty());
    }

    #[test]
    fn classpath_class_instantiation() {
        let mut model = model();
        let classpath = deep_thought(ClasspathSource::Buildscript);
        let (result, warnings) = run(
            "println(DeepThought().compute())",
            ScriptKind::Settings,
            &classpath,
            &mut model,
        );
        result.unwrap();
        assert_eq!(model.output, vec!["42"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn build_src_class_in_settings_warns_once_per_script() {
        let mut model = model();
        let classpath = deep_thought(ClasspathSource::BuildSrc);
        let (result, warnings) = run(
            "val a = DeepThought()\nval b = DeepThought()",
            ScriptKind::Settings,
            &classpath,
            &mut model,
        );
        result.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, DiagnosticKind::DeprecatedUsage);
        assert_eq!(warnings[0].message, crate::host::BUILD_SRC_DEPRECATION);

        let (_, project_warnings) = run("DeepThought()", ScriptKind::Project, &classpath, &mut model);
        assert!(project_warnings.is_empty());
    }

    #[test]
    fn compile_reports_unknown_classes() {
        let statements = parse_source("task(\"compute\") {\n    doLast { println(DeepThought().compute()) }\n}").unwrap();
        let diags = Interpreter.compile(Path::new("/b/build.gradle.kts"), &statements, &Classpath::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::ClassNotFound);
        assert_eq!(diags[0].message, "Unresolved reference: DeepThought");
        assert_eq!((diags[0].line, diags[0].column), (2, 22));

        let ok = Interpreter.compile(Path::new("/b/build.gradle.kts"), &statements, &deep_thought(ClasspathSource::Buildscript));
        assert!(ok.is_empty());
    }

    #[test]
    fn unknown_call_is_unresolved() {
        let mut model = model();
        let (result, _) = run("frobnicate(1)", ScriptKind::Settings, &Classpath::default(), &mut model);
        assert_eq!(result.unwrap_err().message, "Unresolved reference: frobnicate");
    }
}
