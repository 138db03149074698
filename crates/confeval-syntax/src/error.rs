use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub line: usize,
    pub col: usize,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(line: usize, col: usize, start: usize, end: usize) -> Self {
        Self { line, col, start, end }
    }

    pub fn single(line: usize, col: usize, offset: usize) -> Self {
        Self { line, col, start: offset, end: offset + 1 }
    }

    pub fn merge(&self, other: &Span) -> Self {
        let (line, col) = if (self.line, self.col) <= (other.line, other.col) {
            (self.line, self.col)
        } else {
            (other.line, other.col)
        };
        Self {
            line,
            col,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LexError {
    UnexpectedChar { ch: char, span: Span, suggestion: Option<String> },
    UnterminatedString { span: Span },
    UnterminatedComment { span: Span },
    InvalidNumber { text: String, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. } => *span,
            LexError::UnterminatedString { span } => *span,
            LexError::UnterminatedComment { span } => *span,
            LexError::InvalidNumber { span, .. } => *span,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnexpectedChar { ch, suggestion, .. } => {
                write!(f, "unexpected character '{}'", ch)?;
                if let Some(s) = suggestion {
                    write!(f, " ({})", s)?;
                }
                Ok(())
            }
            LexError::UnterminatedString { .. } => {
                write!(f, "unterminated string literal")
            }
            LexError::UnterminatedComment { .. } => {
                write!(f, "unterminated multi-line comment")
            }
            LexError::InvalidNumber { text, .. } => {
                write!(f, "invalid number: '{}'", text)
            }
        }
    }
}

impl std::error::Error for LexError {}

#[derive(Debug, Clone)]
pub enum ParseError {
    UnexpectedToken { expected: String, found: String, span: Span },
    UnexpectedEof { expected: String, context: Option<String> },
    InvalidSyntax { message: String, span: Span },
    LexError(LexError),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::UnexpectedToken { span, .. } => Some(*span),
            ParseError::UnexpectedEof { .. } => None,
            ParseError::InvalidSyntax { span, .. } => Some(*span),
            ParseError::LexError(e) => Some(e.span()),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, found, .. } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            ParseError::UnexpectedEof { expected, context } => {
                if let Some(ctx) = context {
                    write!(f, "unexpected end of file while parsing {}, expected {}", ctx, expected)
                } else {
                    write!(f, "unexpected end of file, expected {}", expected)
                }
            }
            ParseError::InvalidSyntax { message, .. } => {
                write!(f, "{}", message)
            }
            ParseError::LexError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::LexError(err)
    }
}

/// Category of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Syntax,
    PathResolution,
    ClasspathAssembly,
    Grammar,
    PluginResolution,
    ClassNotFound,
    CyclicApply,
    Runtime,
    DeprecatedUsage,
}

impl DiagnosticKind {
    pub fn label(&self) -> &'static str {
        match self {
            DiagnosticKind::Syntax => "syntax error",
            DiagnosticKind::PathResolution => "path resolution error",
            DiagnosticKind::ClasspathAssembly => "classpath assembly error",
            DiagnosticKind::Grammar => "grammar error",
            DiagnosticKind::PluginResolution => "plugin resolution error",
            DiagnosticKind::ClassNotFound => "class not found",
            DiagnosticKind::CyclicApply => "cyclic apply",
            DiagnosticKind::Runtime => "runtime error",
            DiagnosticKind::DeprecatedUsage => "deprecated usage",
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, DiagnosticKind::DeprecatedUsage)
    }
}

/// A positioned message attached to a script.
///
/// Renders as `<path>:<line>:<column>: <message>`. A `line` of `0` means the
/// diagnostic has no position and renders as `<path>: <message>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub line: usize,
    pub column: usize,
    /// Length of the offending source text, used for caret rendering.
    pub len: usize,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        path: impl Into<PathBuf>,
        span: Option<Span>,
        message: impl Into<String>,
    ) -> Self {
        let (line, column, len) = match span {
            Some(s) => (s.line, s.col, s.end.saturating_sub(s.start).max(1)),
            None => (0, 0, 0),
        };
        Self {
            path: path.into(),
            line,
            column,
            len,
            kind,
            message: message.into(),
        }
    }

    pub fn at(kind: DiagnosticKind, path: impl Into<PathBuf>, span: Span, message: impl Into<String>) -> Self {
        Self::new(kind, path, Some(span), message)
    }

    pub fn unpositioned(kind: DiagnosticKind, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(kind, path, None, message)
    }

    pub fn from_lex_error(path: &Path, error: &LexError) -> Self {
        Self::at(DiagnosticKind::Syntax, path, error.span(), error.to_string())
    }

    pub fn from_parse_error(path: &Path, error: &ParseError) -> Self {
        Self::new(DiagnosticKind::Syntax, path, error.span(), error.to_string())
    }

    pub fn has_position(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_position() {
            write!(f, "{}:{}:{}: {}", self.path.display(), self.line, self.column, self.message)
        } else {
            write!(f, "{}: {}", self.path.display(), self.message)
        }
    }
}

impl std::error::Error for Diagnostic {}
