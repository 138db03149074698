//! Error types of the evaluation engine.
//!
//! [`EvalError`] wraps a front-end failure together with an optional [`Span`]
//! so that failures inside script bodies can be turned into positioned
//! [`Diagnostic`]s. [`ResolutionError`] and [`TransportError`] are the typed
//! failures of plugin and artifact resolution.

use confeval_syntax::error::{Diagnostic, DiagnosticKind, Span};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// A script-body evaluation error that carries an optional source [`Span`].
///
/// Use the [`bail_span!`] macro (or [`EvalError::new`]) to construct these
/// inside the interpreter. The outer [`anyhow::Error`] wrapper is preserved so
/// that call-sites can keep using `Result<T>`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EvalError {
    pub message: String,
    pub span: Option<Span>,
    /// Diagnostic category the failure is reported under.
    pub kind: DiagnosticKind,
}

impl EvalError {
    pub fn new(message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            message: message.into(),
            span,
            kind: DiagnosticKind::Runtime,
        }
    }

    pub fn spanned(message: impl Into<String>, span: &Span) -> Self {
        Self::new(message, Some(*span))
    }

    pub fn with_kind(mut self, kind: DiagnosticKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn into_diagnostic(self, path: &Path) -> Diagnostic {
        Diagnostic::new(self.kind, path, self.span, self.message)
    }

    /// Converts any error raised while running a script body into a diagnostic
    /// for `path`, keeping the span when the error is an [`EvalError`].
    pub fn diagnostic_from(err: &anyhow::Error, path: &Path) -> Diagnostic {
        match err.downcast_ref::<EvalError>() {
            Some(eval) => eval.clone().into_diagnostic(path),
            None => Diagnostic::unpositioned(DiagnosticKind::Runtime, path, format!("{:#}", err)),
        }
    }
}

/// Bail out of a function with an [`EvalError`] that includes a source span.
///
/// # Usage
/// ```ignore
/// bail_span!(span, "Unresolved reference: {}", name);
/// bail_span!(None::<confeval_syntax::Span>, "no project selected");
/// ```
#[macro_export]
macro_rules! bail_span {
    ($span:expr, $($arg:tt)*) => {
        return Err(anyhow::anyhow!($crate::error::EvalError::new(
            format!($($arg)*),
            $crate::error::into_option_span($span),
        )))
    };
}

/// Accepts `Span`, `&Span`, `Option<Span>`, and `Option<&Span>`.
pub fn into_option_span(span: impl IntoOptionSpan) -> Option<Span> {
    span.into_option_span()
}

pub trait IntoOptionSpan {
    fn into_option_span(self) -> Option<Span>;
}

impl IntoOptionSpan for Span {
    fn into_option_span(self) -> Option<Span> {
        Some(self)
    }
}

impl IntoOptionSpan for &Span {
    fn into_option_span(self) -> Option<Span> {
        Some(*self)
    }
}

impl IntoOptionSpan for Option<Span> {
    fn into_option_span(self) -> Option<Span> {
        self
    }
}

impl IntoOptionSpan for Option<&Span> {
    fn into_option_span(self) -> Option<Span> {
        self.copied()
    }
}

/// One repository consulted while resolving a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryAttempt {
    pub repository: String,
    /// Transport failure, `None` when the repository simply had no match.
    pub error: Option<String>,
}

/// Failure to turn a [`PluginRequest`](crate::repository::PluginRequest) into a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("{}", render_not_found(.id, .version, .attempts))]
    PluginNotFound {
        id: String,
        version: String,
        attempts: Vec<RepositoryAttempt>,
    },

    #[error("Plugin [id: '{0}'] was requested without a version and 'pluginManagement' declares no default version for it.")]
    PluginVersionMissing(String),

    #[error("Plugin '{0}' was not found on the script classpath.")]
    PluginClassNotFound(String),

    #[error("Invalid plugin artifact '{path}': {message}")]
    InvalidArtifact { path: String, message: String },
}

fn render_not_found(id: &str, version: &str, attempts: &[RepositoryAttempt]) -> String {
    let mut out = format!(
        "Plugin [id: '{}', version: '{}'] was not found in any of the following sources:",
        id, version
    );
    if attempts.is_empty() {
        out.push_str("\n- no plugin repositories are configured");
    }
    for attempt in attempts {
        match &attempt.error {
            Some(err) => out.push_str(&format!("\n- {} (could not resolve: {})", attempt.repository, err)),
            None => out.push_str(&format!("\n- {} (no match)", attempt.repository)),
        }
    }
    out
}

/// Failure of a single repository fetch.
///
/// [`TransportError::NotFound`] means "no match" and lets resolution move on
/// to the next repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{coordinates} not found")]
    NotFound { coordinates: String },

    #[error("could not fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("{repository} is not available in offline mode")]
    Offline { repository: String },
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound { .. })
    }
}

/// The diagnostics that stopped evaluation of a script.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Failure(pub Vec<Diagnostic>);

impl Failure {
    pub fn single(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }
}

impl From<Vec<Diagnostic>> for Failure {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self(diagnostics)
    }
}

impl From<Diagnostic> for Failure {
    fn from(diagnostic: Diagnostic) -> Self {
        Self::single(diagnostic)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {}
