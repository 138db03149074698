//! Structural checks on a script's top-level blocks.
//!
//! Runs after classpath assembly and before any statement executes. Every
//! violation is reported; scanning never stops at the first one.

use confeval_syntax::error::{Diagnostic, DiagnosticKind};
use confeval_syntax::script::{BlockKind, Script, ScriptKind};
use rustc_hash::FxHashMap;

/// Blocks that are allowed at most once and only ahead of other statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralBlock {
    PluginManagement,
    Buildscript,
    Plugins,
}

impl StructuralBlock {
    /// `None` for `apply` and ordinary statements, whatever they are called.
    pub fn of(kind: &BlockKind) -> Option<Self> {
        match kind {
            BlockKind::PluginManagement(_) => Some(StructuralBlock::PluginManagement),
            BlockKind::Buildscript(_) => Some(StructuralBlock::Buildscript),
            BlockKind::Plugins(_) => Some(StructuralBlock::Plugins),
            BlockKind::ApplyFrom(_) | BlockKind::ApplyPlugins(_) | BlockKind::Opaque(_) => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StructuralBlock::PluginManagement => "pluginManagement",
            StructuralBlock::Buildscript => "buildscript",
            StructuralBlock::Plugins => "plugins",
        }
    }

    /// Blocks this one may follow.
    fn allowed_predecessors(self) -> &'static [StructuralBlock] {
        match self {
            StructuralBlock::PluginManagement => &[],
            StructuralBlock::Buildscript => &[StructuralBlock::PluginManagement],
            StructuralBlock::Plugins => &[StructuralBlock::PluginManagement, StructuralBlock::Buildscript],
        }
    }
}

pub fn validate(script: &Script) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut occurrences: FxHashMap<StructuralBlock, usize> = FxHashMap::default();

    for (index, block) in script.blocks.iter().enumerate() {
        let Some(structural) = StructuralBlock::of(&block.kind) else {
            continue;
        };
        let name = structural.name();

        let count = occurrences.entry(structural).or_insert(0);
        *count += 1;
        if *count > 1 {
            if *count == 2 {
                diagnostics.push(Diagnostic::at(
                    DiagnosticKind::Grammar,
                    &script.path,
                    block.span,
                    format!(
                        "Unexpected '{}' block found. Only one '{}' block is allowed per script.",
                        name, name
                    ),
                ));
            }
            continue;
        }

        let allowed = structural.allowed_predecessors();
        let misplaced = script.blocks[..index]
            .iter()
            .any(|previous| StructuralBlock::of(&previous.kind).is_none_or(|p| !allowed.contains(&p)));
        if misplaced {
            diagnostics.push(Diagnostic::at(
                DiagnosticKind::Grammar,
                &script.path,
                block.span,
                format!("The '{}' block must appear before any other statements in the script.", name),
            ));
        }

        if structural == StructuralBlock::PluginManagement && script.kind != ScriptKind::Settings {
            diagnostics.push(Diagnostic::at(
                DiagnosticKind::Grammar,
                &script.path,
                block.span,
                "The 'pluginManagement' block is only supported in settings scripts.",
            ));
        }
    }

    diagnostics
}
