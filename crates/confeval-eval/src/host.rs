//! The seam between the evaluator and the scripting front end.
//!
//! The evaluator handles everything it recognizes itself (`buildscript`,
//! `plugins`, `apply`, ...) and hands the remaining top-level statements to a
//! [`ScriptHost`]. The default host is the [`Interpreter`](crate::interpreter::Interpreter).

use crate::classpath::Classpath;
use crate::model::ModelHandle;
use crate::value::Value;
use confeval_syntax::ast::Statement;
use confeval_syntax::error::Diagnostic;
use confeval_syntax::script::ScriptKind;
use rustc_hash::FxHashMap;
use std::path::Path;

pub const BUILD_SRC_DEPRECATION: &str =
    "Access to the buildSrc project and its dependencies in settings scripts has been deprecated.";

/// Script-local `val`s.
pub type Locals = FxHashMap<String, Value>;

/// Everything a script body may touch while it runs.
pub struct HostEnv<'a> {
    /// Script the statements come from; diagnostics point here.
    pub script: &'a Path,
    pub kind: ScriptKind,
    pub classpath: &'a Classpath,
    pub model: ModelHandle<'a>,
    pub locals: &'a mut Locals,
    pub warnings: &'a mut Vec<Diagnostic>,
}

impl HostEnv<'_> {
    /// Records a warning once.
    pub fn warn(&mut self, warning: Diagnostic) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

pub trait ScriptHost: Send + Sync {
    /// Checks `statements` against `classpath` without running anything.
    /// Unresolvable class references are reported as `ClassNotFound`.
    fn compile(&self, script: &Path, statements: &[Statement], classpath: &Classpath) -> Vec<Diagnostic>;

    /// Runs `statements` in order, stopping at the first failure.
    fn run(&self, statements: &[Statement], env: &mut HostEnv<'_>) -> Result<(), Diagnostic>;
}
