//! The configuration model scripts and plugins act on.
//!
//! [`SettingsModel`] owns the whole tree. Script bodies and plugins never see
//! it directly; they get a [`ModelHandle`] scoped to either the settings
//! object or a single project.

use crate::classpath::Classpath;
use crate::repository::Repository;
use crate::value::Value;
use confeval_syntax::ast::Statement;
use confeval_syntax::script::ScriptKind;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Extension properties, last write wins.
pub type ExtraProperties = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    /// One entry per `doFirst`/`doLast` block, in execution order.
    pub actions: Vec<Vec<Statement>>,
    /// Classpath of the script that registered the task.
    pub classpath: Classpath,
    pub script: PathBuf,
    pub kind: ScriptKind,
}

#[derive(Debug, Clone)]
pub struct ProjectModel {
    pub name: String,
    /// Gradle-style project path, `:` for the root.
    pub path: String,
    pub extra: ExtraProperties,
    pub plugins: Vec<String>,
    pub tasks: Vec<Task>,
    pub children: Vec<ProjectModel>,
}

impl ProjectModel {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            extra: ExtraProperties::new(),
            plugins: Vec::new(),
            tasks: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn find(&self, path: &str) -> Option<&ProjectModel> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(path))
    }

    pub fn find_mut(&mut self, path: &str) -> Option<&mut ProjectModel> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(path))
    }

    /// Creates every missing project along `path` (`:a:b` creates `:a` and `:a:b`).
    fn ensure(&mut self, path: &str) -> &mut ProjectModel {
        let mut current = self;
        let mut current_path = String::new();
        for segment in path.split(':').filter(|s| !s.is_empty()) {
            current_path.push(':');
            current_path.push_str(segment);
            let index = match current.children.iter().position(|c| c.path == current_path) {
                Some(index) => index,
                None => {
                    current.children.push(ProjectModel::new(segment, current_path.clone()));
                    current.children.len() - 1
                }
            };
            current = &mut current.children[index];
        }
        current
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// This project and all descendants, pre-order.
    pub fn projects(&self) -> Vec<&ProjectModel> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.projects());
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginManagement {
    pub repositories: Vec<Repository>,
    /// Default versions keyed by plugin id.
    pub versions: BTreeMap<String, String>,
}

impl PluginManagement {
    /// Configured repositories, or `portal` when none are configured.
    pub fn effective_repositories(&self, portal: &Repository) -> Vec<Repository> {
        if self.repositories.is_empty() {
            vec![portal.clone()]
        } else {
            self.repositories.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsModel {
    pub settings_file: PathBuf,
    pub extra: ExtraProperties,
    pub plugins: Vec<String>,
    pub plugin_management: PluginManagement,
    /// Lines printed by scripts, plugins and tasks.
    pub output: Vec<String>,
    pub root_project: ProjectModel,
}

impl SettingsModel {
    pub fn new(settings_file: impl Into<PathBuf>, root_name: impl Into<String>) -> Self {
        Self {
            settings_file: settings_file.into(),
            extra: ExtraProperties::new(),
            plugins: Vec::new(),
            plugin_management: PluginManagement::default(),
            output: Vec::new(),
            root_project: ProjectModel::new(root_name, ":"),
        }
    }

    /// Model for the build rooted at `settings_file`; the root project is
    /// named after the directory holding it.
    pub fn for_settings_file(settings_file: &Path) -> Self {
        let root_name = settings_file
            .parent()
            .and_then(|dir| dir.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        Self::new(settings_file, root_name)
    }

    pub fn project(&self, path: &str) -> Option<&ProjectModel> {
        self.root_project.find(path)
    }
}

/// What a [`ModelHandle`] is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Settings,
    Project(String),
}

impl Target {
    pub fn root_project() -> Self {
        Target::Project(":".to_string())
    }

    pub fn for_kind(kind: ScriptKind) -> Self {
        match kind {
            ScriptKind::Settings => Target::Settings,
            ScriptKind::Project => Target::root_project(),
        }
    }
}

/// Capability-scoped mutable view of the model.
pub struct ModelHandle<'a> {
    model: &'a mut SettingsModel,
    target: Target,
}

impl<'a> ModelHandle<'a> {
    pub fn new(model: &'a mut SettingsModel, target: Target) -> Self {
        Self { model, target }
    }

    /// Re-borrows the model with a different target.
    pub fn scoped(&mut self, target: Target) -> ModelHandle<'_> {
        ModelHandle {
            model: &mut *self.model,
            target,
        }
    }

    fn project_mut(&mut self, path: &str) -> Result<&mut ProjectModel, String> {
        self.model
            .root_project
            .find_mut(path)
            .ok_or_else(|| format!("Project with path '{}' could not be found.", path))
    }

    pub fn root_project_name(&self) -> &str {
        &self.model.root_project.name
    }

    pub fn has_project(&self, path: &str) -> bool {
        self.model.project(path).is_some()
    }

    pub fn extra(&self, name: &str) -> Option<&Value> {
        match &self.target {
            Target::Settings => self.model.extra.get(name),
            Target::Project(path) => self.model.project(path).and_then(|p| p.extra.get(name)),
        }
    }

    pub fn set_extra(&mut self, name: impl Into<String>, value: Value) -> Result<(), String> {
        let extra = match self.target.clone() {
            Target::Settings => &mut self.model.extra,
            Target::Project(path) => &mut self.project_mut(&path)?.extra,
        };
        extra.insert(name.into(), value);
        Ok(())
    }

    pub fn println(&mut self, line: impl Into<String>) {
        self.model.output.push(line.into());
    }

    /// `include(":a:b")`; only the settings object can include projects.
    pub fn include(&mut self, path: &str) -> Result<(), String> {
        if self.target != Target::Settings {
            return Err("'include' is only available in settings scripts".to_string());
        }
        let path = if path.starts_with(':') { path.to_string() } else { format!(":{}", path) };
        self.model.root_project.ensure(&path);
        Ok(())
    }

    pub fn set_root_project_name(&mut self, name: impl Into<String>) -> Result<(), String> {
        if self.target != Target::Settings {
            return Err("'rootProject.name' can only be set from settings scripts".to_string());
        }
        self.model.root_project.name = name.into();
        Ok(())
    }

    pub fn register_task(&mut self, task: Task) -> Result<(), String> {
        let path = match &self.target {
            Target::Project(path) => path.clone(),
            Target::Settings => {
                return Err(format!(
                    "Cannot register task '{}' on settings, use 'rootProject {{ }}'.",
                    task.name
                ))
            }
        };
        let project = self.project_mut(&path)?;
        if project.task(&task.name).is_some() {
            return Err(format!(
                "Cannot add task '{}' as a task with that name already exists.",
                task.name
            ));
        }
        project.tasks.push(task);
        Ok(())
    }

    pub fn has_plugin(&self, id: &str) -> bool {
        match &self.target {
            Target::Settings => self.model.plugins.iter().any(|p| p == id),
            Target::Project(path) => self
                .model
                .project(path)
                .is_some_and(|p| p.plugins.iter().any(|applied| applied == id)),
        }
    }

    pub fn record_plugin(&mut self, id: impl Into<String>) -> Result<(), String> {
        let plugins = match self.target.clone() {
            Target::Settings => &mut self.model.plugins,
            Target::Project(path) => &mut self.project_mut(&path)?.plugins,
        };
        plugins.push(id.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> SettingsModel {
        SettingsModel::new("/b/settings.gradle.kts", "b")
    }

    #[test]
    fn include_builds_nested_projects() {
        let mut model = model();
        ModelHandle::new(&mut model, Target::Settings).include("a:b").unwrap();
        let paths: Vec<_> = model.root_project.projects().iter().map(|p| p.path.clone()).collect();
        assert_eq!(paths, vec![":", ":a", ":a:b"]);
        assert_eq!(model.project(":a:b").unwrap().name, "b");
    }

    #[test]
    fn extras_are_scoped_to_target() {
        let mut model = model();
        let mut settings = ModelHandle::new(&mut model, Target::Settings);
        settings.set_extra("answer", Value::from("settings")).unwrap();
        {
            let mut root = settings.scoped(Target::root_project());
            root.set_extra("answer", Value::from("41")).unwrap();
            root.set_extra("answer", Value::from("42")).unwrap();
        }
        assert_eq!(settings.extra("answer"), Some(&Value::from("settings")));
        assert_eq!(model.root_project.extra.get("answer"), Some(&Value::from("42")));
    }

    #[test]
    fn tasks_need_a_project_and_unique_names() {
        let mut model = model();
        let task = Task {
            name: "compute".into(),
            actions: Vec::new(),
            classpath: Classpath::default(),
            script: PathBuf::from("/b/settings.gradle.kts"),
            kind: ScriptKind::Settings,
        };
        let mut handle = ModelHandle::new(&mut model, Target::Settings);
        assert!(handle.register_task(task.clone()).is_err());

        let mut root = handle.scoped(Target::root_project());
        root.register_task(task.clone()).unwrap();
        let err = root.register_task(task).unwrap_err();
        assert!(err.contains("already exists"));
    }

    #[test]
    fn unknown_project_target_is_an_error() {
        let mut model = model();
        let mut handle = ModelHandle::new(&mut model, Target::Project(":nope".into()));
        assert!(handle.set_extra("x", Value::Unit).is_err());
    }
}
