use colored::*;
use confeval::{Diagnostic, DiagnosticKind, Span};
use std::fmt;
use std::fs;

/// Diagnostic with source context and suggestions
pub struct EnhancedError {
    pub message: String,
    pub warning: bool,
    pub span: Option<Span>,
    pub file: Option<String>,
    pub source: Option<String>,
    pub suggestion: Option<String>,
    pub help: Option<String>,
}

impl EnhancedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            warning: false,
            span: None,
            file: None,
            source: None,
            suggestion: None,
            help: None,
        }
    }

    pub fn as_warning(mut self) -> Self {
        self.warning = true;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Display the error with colored output and context
    pub fn display(&self) {
        let label = if self.warning {
            "warning:".yellow().bold()
        } else {
            "error:".red().bold()
        };
        eprintln!("{} {}", label, self.message.bold());

        match (&self.file, &self.span) {
            (Some(file), Some(span)) => {
                eprintln!("  {} {}:{}:{}", "-->".blue().bold(), file, span.line, span.col)
            }
            (Some(file), None) => eprintln!("  {} {}", "-->".blue().bold(), file),
            _ => {}
        }

        if let (Some(source), Some(span)) = (&self.source, &self.span) {
            eprintln!();
            self.display_source_with_span(source, span);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!();
            eprintln!("{} {}", "suggestion:".green().bold(), suggestion);
        }

        if let Some(help) = &self.help {
            eprintln!();
            eprintln!("{} {}", "help:".cyan().bold(), help);
        }
        eprintln!();
    }

    fn display_source_with_span(&self, source: &str, span: &Span) {
        let lines: Vec<&str> = source.lines().collect();

        let line_idx = span.line.saturating_sub(1);
        if line_idx >= lines.len() {
            return;
        }

        let max_line = (span.line + 2).min(lines.len());
        let line_num_width = max_line.to_string().len();

        // 2 lines of context on each side
        let start = line_idx.saturating_sub(2);
        let end = (line_idx + 3).min(lines.len());

        for (i, line) in lines.iter().enumerate().take(end).skip(start) {
            let line_num = i + 1;

            if line_num == span.line {
                eprintln!(
                    "{:>width$} {} {}",
                    line_num.to_string().blue().bold(),
                    "|".blue().bold(),
                    line,
                    width = line_num_width
                );

                let spaces = " ".repeat(span.col.saturating_sub(1));
                let carets = "^".repeat(span.end.saturating_sub(span.start).max(1));
                let carets = if self.warning { carets.yellow().bold() } else { carets.red().bold() };
                eprintln!(
                    "{:>width$} {} {}{}",
                    "",
                    "|".blue().bold(),
                    spaces,
                    carets,
                    width = line_num_width
                );
            } else {
                eprintln!(
                    "{:>width$} {} {}",
                    line_num.to_string().dimmed(),
                    "|".blue().bold(),
                    line,
                    width = line_num_width
                );
            }
        }
    }
}

impl fmt::Display for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnhancedError: {}", self.message)
    }
}

impl std::error::Error for EnhancedError {}

/// Convert a diagnostic to an EnhancedError, reading the script for context
pub fn enhance_diagnostic(diagnostic: &Diagnostic) -> EnhancedError {
    let mut enhanced = EnhancedError::new(diagnostic.message.clone())
        .with_file(diagnostic.path.display().to_string());

    if diagnostic.kind.is_warning() {
        enhanced = enhanced.as_warning();
    }

    if diagnostic.has_position() {
        enhanced = enhanced.with_span(Span::new(diagnostic.line, diagnostic.column, 0, diagnostic.len));
        if let Ok(source) = fs::read_to_string(&diagnostic.path) {
            enhanced = enhanced.with_source(source);
        }
    }

    match diagnostic.kind {
        DiagnosticKind::Syntax => {
            enhanced.with_suggestion("Check that all blocks are properly closed with { and }")
        }
        DiagnosticKind::Grammar => enhanced.with_help(
            "Top-level blocks go in this order: pluginManagement {}, buildscript {}, plugins {}, then everything else",
        ),
        DiagnosticKind::PathResolution => {
            enhanced.with_help("apply(from = ...) paths are relative to the directory of the applying script")
        }
        DiagnosticKind::ClasspathAssembly => {
            enhanced.with_help("classpath(files(...)) paths are relative to the directory of the script")
        }
        DiagnosticKind::ClassNotFound => enhanced
            .with_suggestion("Declare the artifact providing it with 'buildscript { dependencies { classpath(...) } }'"),
        DiagnosticKind::PluginResolution if diagnostic.message.contains("version") => enhanced
            .with_suggestion("Add .version(\"...\") to the request or a default in 'pluginManagement { plugins { ... } }'"),
        DiagnosticKind::PluginResolution => {
            enhanced.with_help("Check the plugin id and the repositories declared in 'pluginManagement { repositories { ... } }'")
        }
        DiagnosticKind::CyclicApply => {
            enhanced.with_help("Remove one of the apply(from = ...) statements in the chain")
        }
        DiagnosticKind::DeprecatedUsage => {
            enhanced.with_help("Run with --strict to treat deprecations as errors")
        }
        DiagnosticKind::Runtime => enhanced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positioned_diagnostic_reads_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.gradle.kts");
        fs::write(&path, "println(DeepThought())\n").unwrap();

        let diagnostic = Diagnostic::at(
            DiagnosticKind::ClassNotFound,
            &path,
            Span::new(1, 9, 8, 19),
            "Unresolved reference: DeepThought",
        );
        let enhanced = enhance_diagnostic(&diagnostic);

        assert!(!enhanced.warning);
        assert_eq!(enhanced.span.map(|s| (s.line, s.col, s.end - s.start)), Some((1, 9, 11)));
        assert_eq!(enhanced.source.as_deref(), Some("println(DeepThought())\n"));
        assert!(enhanced.suggestion.is_some());
    }

    #[test]
    fn test_unpositioned_warning_has_no_snippet() {
        let diagnostic = Diagnostic::unpositioned(
            DiagnosticKind::DeprecatedUsage,
            "/missing/settings.gradle.kts",
            "deprecated",
        );
        let enhanced = enhance_diagnostic(&diagnostic);

        assert!(enhanced.warning);
        assert!(enhanced.span.is_none());
        assert!(enhanced.source.is_none());
    }
}
