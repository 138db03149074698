pub use confeval_syntax::{BlockKind, Diagnostic, DiagnosticKind, Script, ScriptKind, Span, parse_source};
pub use confeval_eval::{
    Config, EvaluationResult, Evaluator, ModelHandle, ProjectModel, ScriptHost, ScriptState, SettingsModel, Value,
    evaluate_configuration,
};
pub use confeval_eval as eval;
pub use confeval_syntax as syntax;

pub mod prelude {
    pub use crate::{evaluate_configuration, parse_source};
    pub use crate::{Config, Diagnostic, DiagnosticKind, EvaluationResult, Evaluator, ScriptState};
}
