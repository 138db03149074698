//! # confeval eval
//!
//! Evaluates a configuration script and everything it applies into a
//! [`SettingsModel`].
//!
//! ```text
//! settings.gradle.kts
//!     ↓
//! Script::load            (confeval-syntax)
//!     ↓
//! ClasspathAssembler      buildscript declarations + build-logic libs
//!     ↓
//! validator::validate     singleton and ordering rules
//!     ↓
//! ScriptHost::compile     unresolved class references
//!     ↓
//! blocks, in order        apply(from), plugins {}, apply<T>(), statements
//! ```

pub mod artifact;
pub mod classpath;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod host;
pub mod interpreter;
pub mod model;
pub mod path_resolver;
pub mod repository;
pub mod validator;
pub mod value;

pub use classpath::{Classpath, ClasspathEntry, ClasspathSource, Declaration, DependencyResolver};
pub use config::Config;
pub use error::{EvalError, Failure, ResolutionError, TransportError};
pub use evaluator::{evaluate_configuration, EvaluationResult, Evaluator, ScriptRecord, ScriptState};
pub use host::{HostEnv, ScriptHost};
pub use interpreter::Interpreter;
pub use model::{ModelHandle, ProjectModel, SettingsModel, Target};
pub use repository::{PluginRequest, Repository, RepositoryTransport};
pub use value::Value;
