use crate::error::Span;

/// Call arguments, positional or named.
pub type Args = Vec<Arg>;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `val name = value`, `val name by extra { value }` or `val name: T by extra`.
    Val {
        name: String,
        ty: Option<String>,
        value: Expr,
        delegated: bool,
        span: Span,
    },
    /// `target = value`
    Assign { target: Expr, value: Expr, span: Span },
    Expr(Expr),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Val { span, .. } => *span,
            Statement::Assign { span, .. } => *span,
            Statement::Expr(e) => e.span(),
        }
    }

    /// Name the statement is known by at the top level of a script.
    ///
    /// Calls and blocks use their callee path (`gradle.rootProject`),
    /// everything else a fixed descriptive word.
    pub fn name(&self) -> String {
        match self {
            Statement::Val { .. } => "val".to_string(),
            Statement::Assign { target, .. } => target.path().unwrap_or_else(|| "assignment".to_string()),
            Statement::Expr(Expr::Call { callee, .. }) => {
                callee.path().unwrap_or_else(|| "call".to_string())
            }
            Statement::Expr(e) => e.path().unwrap_or_else(|| "expression".to_string()),
        }
    }

    /// Span of the statement's first token.
    pub fn head_span(&self) -> Span {
        match self {
            Statement::Expr(e) => e.head_span(),
            Statement::Assign { target, .. } => target.head_span(),
            Statement::Val { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String, Span),
    Number(f64, Span),
    Bool(bool, Span),
    Ident(String, Span),
    Member {
        receiver: Box<Expr>,
        name: String,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        type_args: Vec<String>,
        args: Args,
        lambda: Option<Vec<Statement>>,
        span: Span,
    },
    Index {
        receiver: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// Infix call such as `id("x") version "1.0"`.
    Infix {
        left: Box<Expr>,
        name: String,
        right: Box<Expr>,
        span: Span,
    },
    Concat(Box<Expr>, Box<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Str(_, span)
            | Expr::Number(_, span)
            | Expr::Bool(_, span)
            | Expr::Ident(_, span)
            | Expr::Concat(_, _, span) => *span,
            Expr::Member { span, .. }
            | Expr::Call { span, .. }
            | Expr::Index { span, .. }
            | Expr::Infix { span, .. } => *span,
        }
    }

    /// Span of the leftmost token of the expression.
    pub fn head_span(&self) -> Span {
        match self {
            Expr::Member { receiver, .. } | Expr::Index { receiver, .. } => receiver.head_span(),
            Expr::Call { callee, .. } => callee.head_span(),
            Expr::Infix { left, .. } | Expr::Concat(left, _, _) => left.head_span(),
            other => other.span(),
        }
    }

    /// Dotted path for identifier and member chains, e.g. `gradle.rootProject`.
    pub fn path(&self) -> Option<String> {
        match self {
            Expr::Ident(name, _) => Some(name.clone()),
            Expr::Member { receiver, name, .. } => {
                receiver.path().map(|base| format!("{}.{}", base, name))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s, _) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Expr::Bool(b, _) => Some(*b),
            _ => None,
        }
    }

    /// Visits this expression and every nested expression, lambdas included.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Member { receiver, .. } => receiver.walk(visit),
            Expr::Call { callee, args, lambda, .. } => {
                callee.walk(visit);
                for arg in args {
                    arg.value.walk(visit);
                }
                if let Some(body) = lambda {
                    walk_statements(body, visit);
                }
            }
            Expr::Index { receiver, index, .. } => {
                receiver.walk(visit);
                index.walk(visit);
            }
            Expr::Infix { left, right, .. } | Expr::Concat(left, right, _) => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Str(..) | Expr::Number(..) | Expr::Bool(..) | Expr::Ident(..) => {}
        }
    }
}

/// Visits every expression reachable from `statements`.
pub fn walk_statements<'a>(statements: &'a [Statement], visit: &mut dyn FnMut(&'a Expr)) {
    for stmt in statements {
        match stmt {
            Statement::Val { value, .. } => value.walk(visit),
            Statement::Assign { target, value, .. } => {
                target.walk(visit);
                value.walk(visit);
            }
            Statement::Expr(e) => e.walk(visit),
        }
    }
}
