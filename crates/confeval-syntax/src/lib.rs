//! # confeval syntax
//!
//! Lexer, parser and top-level block classification for confeval
//! configuration scripts.
//!
//! ## Architecture
//!
//! ```text
//! Source Code
//!     ↓
//! Lexer (tokenize)
//!     ↓
//! Vec<SpannedToken>
//!     ↓
//! Parser (parse)
//!     ↓
//! Vec<Statement>
//!     ↓
//! Script::parse (classify top-level blocks)
//!     ↓
//! Script { blocks: Vec<TopLevelBlock> }
//! ```
//!
//! ## Example
//!
//! ```rust
//! use confeval_syntax::{BlockKind, Script};
//! use std::path::Path;
//!
//! let source = r#"
//!     plugins {
//!         id("test.MySettingsPlugin").version("1.0")
//!     }
//!     apply(from = "gradle/my.settings.gradle.kts")
//! "#;
//!
//! let script = Script::parse(Path::new("settings.gradle.kts"), source.to_string())
//!     .expect("valid script");
//!
//! assert_eq!(script.blocks.len(), 2);
//! assert!(matches!(script.blocks[1].kind, BlockKind::ApplyFrom(_)));
//! ```
//!
//! ## Grammar Overview
//!
//! ```text
//! Statement:
//!   - val name = expr | val name by extra { expr } | val name: T by extra
//!   - target = expr
//!   - expr
//!
//! Expression:
//!   - Literals (string, number, boolean)
//!   - Identifiers and member chains (gradle.rootProject)
//!   - Calls with named/positional/type arguments and a trailing block
//!   - Indexing (extra["name"])
//!   - Infix calls (id("x") version "1.0")
//!   - String concatenation (+)
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod script;

pub use ast::*;
pub use error::{Diagnostic, DiagnosticKind, LexError, ParseError, Span};
pub use lexer::{SpannedToken, Token, tokenize};
pub use parser::{parse, parse_source};
pub use script::{
    BlockKind, BuildscriptBlock, DependencySpec, PluginManagementBlock, PluginRef, PluginSpec,
    RepositorySpec, Script, ScriptKind, TopLevelBlock,
};
