//! Turns script references into absolute, lexically normalized paths.
//!
//! Resolution is purely lexical: nothing is read from disk and symlinks are
//! not followed. Existence is checked by the caller.

use std::path::{Component, Path, PathBuf};

/// Resolves `reference` against `base_dir`.
///
/// Absolute references are only normalized; relative ones are joined to
/// `base_dir` first.
pub fn resolve(base_dir: &Path, reference: impl AsRef<Path>) -> PathBuf {
    let reference = reference.as_ref();
    if reference.is_absolute() {
        normalize(reference)
    } else {
        normalize(&base_dir.join(reference))
    }
}

/// Removes `.` components and folds `..` into its parent.
///
/// `..` never climbs above the root of an absolute path. Leading `..` of a
/// relative path are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}
