//! Expression evaluation helpers.
//!
//! Extracted from the main interpreter module to keep built-in dispatch and
//! classpath class handling in one place.

use anyhow::Result;

use crate::bail_span;
use crate::classpath::ClasspathSource;
use crate::error::EvalError;
use crate::host::{BUILD_SRC_DEPRECATION, HostEnv};
use crate::model::Target;
use crate::value::{Object, Value};
use confeval_syntax::ast::{Arg, Expr, Statement};
use confeval_syntax::error::{Diagnostic, DiagnosticKind, Span};
use confeval_syntax::script::ScriptKind;

use super::Interpreter;

/// Dotted path of `callee` when it names a class (`DeepThought`,
/// `org.acme.DeepThought`).
pub(super) fn class_reference(callee: &Expr) -> Option<String> {
    let path = callee.path()?;
    let last = path.rsplit('.').next()?;
    last.chars().next().filter(char::is_ascii_uppercase).map(|_| path.clone())
}

pub(super) fn simple_name(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

impl Interpreter {
    /// Evaluates an expression and returns its runtime [`Value`].
    pub fn eval(&self, expr: &Expr, env: &mut HostEnv<'_>) -> Result<Value> {
        match expr {
            Expr::Str(s, _) => Ok(Value::String(s.clone())),
            Expr::Number(n, _) => Ok(Value::Number(*n)),
            Expr::Bool(b, _) => Ok(Value::Bool(*b)),

            Expr::Ident(name, span) => env.locals.get(name).cloned().ok_or_else(|| {
                anyhow::anyhow!(EvalError::spanned(format!("Unresolved reference: {}", name), span))
            }),

            Expr::Concat(left, right, _) => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                Ok(match (&left, &right) {
                    (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                    _ => Value::String(format!("{}{}", left.display(), right.display())),
                })
            }

            Expr::Index { receiver, index, span } => {
                if receiver.path().as_deref() != Some("extra") {
                    bail_span!(span, "Unresolved reference: get");
                }
                let key = self.eval(index, env)?;
                let Some(key) = key.as_str() else {
                    bail_span!(index.span(), "Extra property names must be strings, found {}", key.type_name());
                };
                match env.model.extra(key) {
                    Some(value) => Ok(value.clone()),
                    None => bail_span!(span, "Cannot get extra property '{}' as it does not exist", key),
                }
            }

            Expr::Member { receiver, name, span } => {
                if name == "name" && receiver.path().as_deref() == Some("rootProject") {
                    return Ok(Value::String(env.model.root_project_name().to_string()));
                }
                let value = self.eval(receiver, env)?;
                value
                    .get_property(name)
                    .map_err(|e| anyhow::anyhow!(EvalError::spanned(e.to_string(), span)))
            }

            Expr::Call { callee, type_args, args, lambda, span } => {
                if !type_args.is_empty() {
                    bail_span!(span, "Unresolved reference: {}<{}>", callee.path().unwrap_or_default(), type_args.join(", "));
                }
                self.eval_call(callee, args, lambda.as_deref(), span, env)
            }

            Expr::Infix { name, span, .. } => bail_span!(span, "Unresolved reference: {}", name),
        }
    }

    fn eval_args(&self, args: &[Arg], env: &mut HostEnv<'_>) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            if let Some(name) = &arg.name {
                bail_span!(arg.value.span(), "Named argument '{}' is not supported here", name);
            }
            values.push(self.eval(&arg.value, env)?);
        }
        Ok(values)
    }

    fn string_arg(&self, args: &[Arg], what: &str, span: &Span, env: &mut HostEnv<'_>) -> Result<String> {
        match self.eval_args(args, env)?.as_slice() {
            [Value::String(s)] => Ok(s.clone()),
            _ => bail_span!(span, "'{}' expects a single String argument", what),
        }
    }

    fn eval_call(
        &self,
        callee: &Expr,
        args: &[Arg],
        lambda: Option<&[Statement]>,
        span: &Span,
        env: &mut HostEnv<'_>,
    ) -> Result<Value> {
        let path = callee.path();

        match (path.as_deref(), lambda) {
            (Some("println"), None) => {
                let line = match self.eval_args(args, env)?.as_slice() {
                    [] => String::new(),
                    [value] => value.display(),
                    _ => bail_span!(span, "'println' expects at most one argument"),
                };
                env.model.println(line);
                return Ok(Value::Unit);
            }

            (Some("include"), None) => {
                for value in self.eval_args(args, env)? {
                    let Some(project) = value.as_str() else {
                        bail_span!(span, "'include' expects project paths, found {}", value.type_name());
                    };
                    if let Err(message) = env.model.include(project) {
                        bail_span!(span, "{}", message);
                    }
                }
                return Ok(Value::Unit);
            }

            (Some("rootProject") | Some("gradle.rootProject"), Some(body)) if args.is_empty() => {
                return self.execute_scoped(Target::root_project(), body, env);
            }

            (Some("project"), Some(body)) => {
                let project = self.string_arg(args, "project", span, env)?;
                if !env.model.has_project(&project) {
                    bail_span!(span, "Project with path '{}' could not be found.", project);
                }
                return self.execute_scoped(Target::Project(project), body, env);
            }

            (Some("task") | Some("tasks.register"), Some(body)) => {
                let name = self.string_arg(args, "task", span, env)?;
                return self.register_task(name, body, span, env);
            }

            (Some("extra.set"), None) => {
                let values = self.eval_args(args, env)?;
                let [Value::String(key), value] = values.as_slice() else {
                    bail_span!(span, "'extra.set' expects a name and a value");
                };
                if let Err(message) = env.model.set_extra(key.clone(), value.clone()) {
                    bail_span!(span, "{}", message);
                }
                return Ok(Value::Unit);
            }

            _ => {}
        }

        if let Some(class) = class_reference(callee) {
            if !args.is_empty() || lambda.is_some() {
                bail_span!(span, "Constructor of '{}' takes no arguments", simple_name(&class));
            }
            return self.instantiate(&class, &callee.head_span(), env);
        }

        if let Expr::Member { receiver, name, span: member_span } = callee {
            if lambda.is_some() {
                bail_span!(member_span, "Unresolved reference: {}", name);
            }
            let target = self.eval(receiver, env)?;
            let values = self.eval_args(args, env)?;
            return target
                .call_method(name, &values)
                .map_err(|e| anyhow::anyhow!(EvalError::spanned(e.to_string(), member_span)));
        }

        bail_span!(
            callee.head_span(),
            "Unresolved reference: {}",
            path.unwrap_or_else(|| "call".to_string())
        )
    }

    /// Creates an instance of a class from the script classpath.
    ///
    /// Settings scripts that reach a class only through the build-logic
    /// classpath get a deprecation warning.
    fn instantiate(&self, class: &str, span: &Span, env: &mut HostEnv<'_>) -> Result<Value> {
        let classpath = env.classpath;
        let Some((definition, source)) = classpath.find_class(class) else {
            return Err(anyhow::anyhow!(
                EvalError::spanned(format!("Unresolved reference: {}", simple_name(class)), span)
                    .with_kind(DiagnosticKind::ClassNotFound)
            ));
        };

        let mut object = Object::new(definition.name.clone());
        for (member, value) in &definition.members {
            object.properties.insert(member.clone(), Value::String(value.clone()));
        }

        if source == ClasspathSource::BuildSrc && env.kind == ScriptKind::Settings {
            tracing::warn!(class, script = %env.script.display(), "build-logic class used from settings script");
            let warning = Diagnostic::unpositioned(DiagnosticKind::DeprecatedUsage, env.script, BUILD_SRC_DEPRECATION);
            env.warn(warning);
        }

        Ok(Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confeval_syntax::error::Span;

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.to_string(), Span::new(1, 1, 0, name.len()))
    }

    #[test]
    fn class_references_start_with_uppercase() {
        assert_eq!(class_reference(&ident("DeepThought")).as_deref(), Some("DeepThought"));
        assert_eq!(class_reference(&ident("println")), None);

        let qualified = Expr::Member {
            receiver: Box::new(ident("org")),
            name: "DeepThought".to_string(),
            span: Span::new(1, 1, 0, 15),
        };
        assert_eq!(class_reference(&qualified).as_deref(), Some("org.DeepThought"));
        assert_eq!(simple_name("org.DeepThought"), "DeepThought");
    }
}
