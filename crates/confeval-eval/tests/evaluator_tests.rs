use anyhow::Result;
use confeval_eval::artifact::Coordinates;
use confeval_eval::repository::{Applicator, DefaultTransport, PluginRepositoryClient};
use confeval_eval::{Classpath, Config, Evaluator, PluginRequest, Repository, ScriptState, Value};
use confeval_syntax::{DiagnosticKind, Span};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DEEP_THOUGHT: &str = r#"
[[classes]]
name = "DeepThought"
members = { compute = "42" }
"#;

const SETTINGS_PLUGIN: &str = r#"
[[plugins]]
id = "test.MySettingsPlugin"
class = "MySettingsPlugin"
apply = 'println("*42*")'
"#;

fn write(dir: &Path, relative: &str, content: &str) -> Result<PathBuf> {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    Ok(path)
}

fn evaluator(dir: &Path) -> Evaluator {
    Evaluator::new(Config::default().with_search_root(dir).with_offline(true))
}

/// Publishes a plugin marker artifact into a directory repository.
fn publish_plugin(repo: &Path, id: &str, version: &str, artifact: &str) -> Result<()> {
    let relative = Coordinates::plugin_marker(id, version).relative_path();
    write(repo, &relative.to_string_lossy(), artifact)?;
    Ok(())
}

#[test]
fn test_relative_apply_chain() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = write(dir.path(), "settings.gradle.kts", r#"apply(from = "gradle/my.settings.gradle.kts")"#)?;
    write(dir.path(), "gradle/my.settings.gradle.kts", r#"apply(from = "./answer.settings.gradle.kts")"#)?;
    write(
        dir.path(),
        "gradle/answer.settings.gradle.kts",
        r#"
gradle.rootProject {
    val answer by extra { "42" }
}
"#,
    )?;

    let result = evaluator(dir.path()).evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(result.model.root_project.extra.get("answer"), Some(&Value::from("42")));

    let visited: Vec<_> = result.scripts.iter().map(|r| (r.path.clone(), r.depth, r.state)).collect();
    assert_eq!(
        visited,
        vec![
            (settings, 0, ScriptState::Applied),
            (dir.path().join("gradle/my.settings.gradle.kts"), 1, ScriptState::Applied),
            (dir.path().join("gradle/answer.settings.gradle.kts"), 2, ScriptState::Applied),
        ]
    );
    Ok(())
}

#[test]
fn test_build_script_reads_extras_from_settings() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "settings.gradle.kts", r#"apply(from = "gradle/my.settings.gradle.kts")"#)?;
    write(dir.path(), "gradle/my.settings.gradle.kts", r#"apply(from = "./answer.settings.gradle.kts")"#)?;
    write(
        dir.path(),
        "gradle/answer.settings.gradle.kts",
        "gradle.rootProject {\n    val answer by extra { \"42\" }\n}\n",
    )?;
    let build = write(
        dir.path(),
        "build.gradle.kts",
        "val answer: String by extra\nprintln(\"*\" + answer + \"*\")\n",
    )?;

    let result = evaluator(dir.path()).evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(result.model.output, vec!["*42*"]);
    assert_eq!(result.scripts.len(), 4);
    assert_eq!(result.scripts[3].path, build);
    assert_eq!(result.scripts[3].depth, 0);
    assert_eq!(result.script_state(&build), Some(ScriptState::Applied));
    Ok(())
}

#[test]
fn test_included_project_build_scripts() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "settings.gradle.kts", "include(\"app\")\ninclude(\"lib\")\n")?;
    write(dir.path(), "build.gradle.kts", "println(\"root\")\n")?;
    let app = write(
        dir.path(),
        "app/build.gradle.kts",
        "println(\"app\")\ntask(\"hello\") {\n    doLast { println(\"hello from app\") }\n}\n",
    )?;

    let evaluator = evaluator(dir.path());
    let mut result = evaluator.evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(result.model.output, vec!["root", "app"]);
    assert_eq!(result.scripts.len(), 3);
    assert_eq!(result.script_state(&app), Some(ScriptState::Applied));
    assert!(result.model.project(":app").and_then(|p| p.task("hello")).is_some());
    assert!(result.model.root_project.task("hello").is_none());

    evaluator.run_tasks(&mut result.model, &[":app:hello".to_string()])?;
    assert_eq!(result.model.output.last().map(String::as_str), Some("hello from app"));
    Ok(())
}

#[test]
fn test_build_scripts_are_skipped_when_settings_fail() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "settings.gradle.kts", "frobnicate()\n")?;
    write(dir.path(), "build.gradle.kts", "println(\"root\")\n")?;

    let result = evaluator(dir.path()).evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(!result.success);
    assert_eq!(result.scripts.len(), 1);
    assert!(result.model.output.is_empty());
    Ok(())
}

#[test]
fn test_duplicate_plugin_management() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = write(
        dir.path(),
        "settings.gradle.kts",
        "\n            pluginManagement {}\n            pluginManagement {}\n",
    )?;

    let result = evaluator(dir.path()).evaluate_configuration(&settings);

    assert!(!result.success);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(
        result.diagnostics[0].to_string(),
        format!(
            "{}:3:13: Unexpected 'pluginManagement' block found. Only one 'pluginManagement' block is allowed per script.",
            settings.display()
        )
    );
    assert_eq!(result.script_state(&settings), Some(ScriptState::Failed));
    Ok(())
}

#[test]
fn test_buildscript_classpath_reaches_tasks() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "fixture.jar", DEEP_THOUGHT)?;
    write(
        dir.path(),
        "settings.gradle.kts",
        r#"
buildscript {
    dependencies {
        classpath(files("fixture.jar"))
    }
}

rootProject {
    task("compute") {
        doLast { println(DeepThought().compute()) }
    }
}
"#,
    )?;

    let evaluator = evaluator(dir.path());
    let mut result = evaluator.evaluate_configuration(Path::new("settings.gradle.kts"));
    assert!(result.success, "{:?}", result.diagnostics);
    assert!(result.model.output.is_empty());

    let warnings = evaluator.run_tasks(&mut result.model, &["compute".to_string()])?;
    assert!(warnings.is_empty());
    assert_eq!(result.model.output, vec!["42"]);
    Ok(())
}

#[test]
fn test_applied_script_assembles_its_own_classpath() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "fixture.jar", DEEP_THOUGHT)?;
    let other = write(
        dir.path(),
        "other.settings.gradle.kts",
        r#"
buildscript {
    dependencies { classpath(files("fixture.jar")) }
}

gradle.rootProject {
    task("compute") {
        doLast {
            val computer = DeepThought()
            val answer = computer.compute()
            println("*" + answer + "*")
        }
    }
}
"#,
    )?;
    write(dir.path(), "settings.gradle.kts", r#"apply(from = "other.settings.gradle.kts")"#)?;

    let evaluator = evaluator(dir.path());
    let mut result = evaluator.evaluate_configuration(Path::new("settings.gradle.kts"));
    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(result.script_state(&other), Some(ScriptState::Applied));

    evaluator.run_tasks(&mut result.model, &["compute".to_string()])?;
    assert_eq!(result.model.output, vec!["*42*"]);
    Ok(())
}

#[test]
fn test_applied_script_classpath_is_not_visible_to_parent() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "fixture.jar", DEEP_THOUGHT)?;
    write(
        dir.path(),
        "other.settings.gradle.kts",
        "buildscript {\n    dependencies { classpath(files(\"fixture.jar\")) }\n}\n",
    )?;
    let settings = write(
        dir.path(),
        "settings.gradle.kts",
        "apply(from = \"other.settings.gradle.kts\")\nprintln(DeepThought().compute())\n",
    )?;

    let result = evaluator(dir.path()).evaluate_configuration(&settings);

    assert!(!result.success);
    assert_eq!(result.diagnostics.len(), 1);
    let diagnostic = &result.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::ClassNotFound);
    assert_eq!(diagnostic.path, settings);
    assert_eq!(diagnostic.line, 2);
    assert!(result.model.output.is_empty());
    Ok(())
}

#[test]
fn test_broken_child_classpath_keeps_parent_state() -> Result<()> {
    let dir = TempDir::new()?;
    let other = write(
        dir.path(),
        "other.settings.gradle.kts",
        "buildscript {\n    dependencies { classpath(files(\"missing.jar\")) }\n}\nextra[\"child\"] = \"yes\"\n",
    )?;
    let settings = write(
        dir.path(),
        "settings.gradle.kts",
        "extra[\"before\"] = \"yes\"\napply(from = \"other.settings.gradle.kts\")\n",
    )?;

    let result = evaluator(dir.path()).evaluate_configuration(&settings);

    assert!(!result.success);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].kind, DiagnosticKind::ClasspathAssembly);
    assert_eq!(result.diagnostics[0].path, other);
    assert_eq!(result.script_state(&other), Some(ScriptState::Failed));
    assert_eq!(result.model.extra.get("before"), Some(&Value::from("yes")));
    assert!(result.model.extra.get("child").is_none());
    Ok(())
}

#[test]
fn test_undeclared_class_is_class_not_found() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "fixture.jar", DEEP_THOUGHT)?;
    write(
        dir.path(),
        "settings.gradle.kts",
        r#"
rootProject {
    task("compute") {
        doLast { println(DeepThought().compute()) }
    }
}
"#,
    )?;

    let result = evaluator(dir.path()).evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(!result.success);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].kind, DiagnosticKind::ClassNotFound);
    assert_eq!(result.diagnostics[0].message, "Unresolved reference: DeepThought");
    assert!(result.model.root_project.tasks.is_empty());
    Ok(())
}

#[test]
fn test_missing_classpath_file_fails_assembly() -> Result<()> {
    let dir = TempDir::new()?;
    write(
        dir.path(),
        "settings.gradle.kts",
        r#"
buildscript {
    dependencies {
        classpath(files("missing.jar"))
    }
}
"#,
    )?;

    let result = evaluator(dir.path()).evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(!result.success);
    assert_eq!(result.diagnostics[0].kind, DiagnosticKind::ClasspathAssembly);
    assert_eq!(result.diagnostics[0].line, 4);
    Ok(())
}

#[test]
fn test_plugin_from_portal() -> Result<()> {
    let dir = TempDir::new()?;
    let repo = dir.path().join("repo");
    publish_plugin(&repo, "test.MySettingsPlugin", "1.0", SETTINGS_PLUGIN)?;
    write(
        dir.path(),
        "settings.gradle.kts",
        r#"
plugins {
    id("test.MySettingsPlugin").version("1.0")
}
"#,
    )?;

    let config = Config::default()
        .with_search_root(dir.path())
        .with_plugin_portal_url(repo.to_string_lossy());
    let result = Evaluator::new(config).evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(result.model.output, vec!["*42*"]);
    assert_eq!(result.model.plugins, vec!["test.MySettingsPlugin"]);
    Ok(())
}

#[test]
fn test_plugin_version_from_plugin_management() -> Result<()> {
    let dir = TempDir::new()?;
    publish_plugin(&dir.path().join("local-repo"), "test.MySettingsPlugin", "1.0", SETTINGS_PLUGIN)?;
    write(
        dir.path(),
        "settings.gradle.kts",
        r#"
pluginManagement {
    repositories {
        maven(url = "local-repo")
    }
    plugins {
        id("test.MySettingsPlugin").version("1.0")
    }
}

plugins {
    id("test.MySettingsPlugin")
}
"#,
    )?;

    let result = evaluator(dir.path()).evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(result.model.output, vec!["*42*"]);
    assert_eq!(
        result.model.plugin_management.repositories,
        vec![Repository::Directory(dir.path().join("local-repo"))]
    );
    Ok(())
}

#[test]
fn test_plugins_block_is_atomic() -> Result<()> {
    let dir = TempDir::new()?;
    let repo = dir.path().join("repo");
    publish_plugin(&repo, "test.MySettingsPlugin", "1.0", SETTINGS_PLUGIN)?;
    write(
        dir.path(),
        "settings.gradle.kts",
        r#"
plugins {
    id("test.MySettingsPlugin").version("1.0")
    id("missing.plugin").version("2.0")
}
"#,
    )?;

    let config = Config::default()
        .with_search_root(dir.path())
        .with_plugin_portal_url(repo.to_string_lossy());
    let result = Evaluator::new(config).evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(!result.success);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].kind, DiagnosticKind::PluginResolution);
    assert_eq!(result.diagnostics[0].line, 4);
    assert!(result.diagnostics[0]
        .message
        .starts_with("Plugin [id: 'missing.plugin', version: '2.0'] was not found in any of the following sources:"));
    assert!(result.model.output.is_empty());
    assert!(result.model.plugins.is_empty());
    Ok(())
}

#[test]
fn test_apply_false_resolves_only() -> Result<()> {
    let dir = TempDir::new()?;
    let repo = dir.path().join("repo");
    publish_plugin(&repo, "test.MySettingsPlugin", "1.0", SETTINGS_PLUGIN)?;
    write(
        dir.path(),
        "settings.gradle.kts",
        r#"
plugins {
    id("test.MySettingsPlugin").version("1.0").apply(false)
}
"#,
    )?;

    let config = Config::default()
        .with_search_root(dir.path())
        .with_plugin_portal_url(repo.to_string_lossy());
    let result = Evaluator::new(config).evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(result.success, "{:?}", result.diagnostics);
    assert!(result.model.output.is_empty());
    assert!(result.model.plugins.is_empty());
    Ok(())
}

#[test]
fn test_cyclic_apply() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = write(dir.path(), "settings.gradle.kts", r#"apply(from = "other.settings.gradle.kts")"#)?;
    let other = write(dir.path(), "other.settings.gradle.kts", r#"apply(from = "settings.gradle.kts")"#)?;

    let result = evaluator(dir.path()).evaluate_configuration(&settings);

    assert!(!result.success);
    assert_eq!(result.diagnostics.len(), 1);
    let diagnostic = &result.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::CyclicApply);
    assert_eq!(diagnostic.path, other);
    assert_eq!(
        diagnostic.message,
        format!(
            "Cyclic script application: {} -> {} -> {}",
            settings.display(),
            other.display(),
            settings.display()
        )
    );
    assert_eq!(result.script_state(&settings), Some(ScriptState::Failed));
    assert_eq!(result.script_state(&other), Some(ScriptState::Failed));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_cyclic_apply_through_symlinked_directory() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = write(dir.path(), "settings.gradle.kts", r#"apply(from = "loop/settings.gradle.kts")"#)?;
    std::os::unix::fs::symlink(dir.path(), dir.path().join("loop"))?;

    let result = evaluator(dir.path()).evaluate_configuration(&settings);

    assert!(!result.success);
    assert_eq!(result.diagnostics.len(), 1);
    let diagnostic = &result.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::CyclicApply);
    assert_eq!(diagnostic.path, settings);
    assert_eq!(
        diagnostic.message,
        format!(
            "Cyclic script application: {} -> {}",
            settings.display(),
            dir.path().join("loop/settings.gradle.kts").display()
        )
    );
    assert_eq!(result.scripts.len(), 1);
    Ok(())
}

#[test]
fn test_missing_script_keeps_committed_state() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = write(
        dir.path(),
        "settings.gradle.kts",
        "extra[\"before\"] = \"yes\"\napply(from = \"missing.gradle.kts\")\nextra[\"after\"] = \"no\"\n",
    )?;

    let result = evaluator(dir.path()).evaluate_configuration(&settings);

    assert!(!result.success);
    let diagnostic = &result.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::PathResolution);
    assert_eq!(diagnostic.path, settings);
    assert_eq!(diagnostic.line, 2);
    assert_eq!(
        diagnostic.message,
        format!(
            "Could not read script '{}' as it does not exist.",
            dir.path().join("missing.gradle.kts").display()
        )
    );
    assert_eq!(result.model.extra.get("before"), Some(&Value::from("yes")));
    assert!(result.model.extra.get("after").is_none());
    Ok(())
}

#[test]
fn test_failing_script_discards_its_changes() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "settings.gradle.kts", "extra[\"a\"] = \"1\"\nfrobnicate()\n")?;

    let result = evaluator(dir.path()).evaluate_configuration(Path::new("settings.gradle.kts"));

    assert!(!result.success);
    assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Runtime);
    assert_eq!(result.diagnostics[0].message, "Unresolved reference: frobnicate");
    assert!(result.model.extra.is_empty());
    Ok(())
}

#[test]
fn test_build_src_deprecation() -> Result<()> {
    let dir = TempDir::new()?;
    write(
        dir.path(),
        "buildSrc/libs/logic.toml",
        r#"
[[classes]]
name = "DeepThought"
members = { compute = "42" }

[[plugins]]
class = "BuildLogicPlugin"
apply = 'println("applied")'
"#,
    )?;
    let settings = write(
        dir.path(),
        "settings.gradle.kts",
        "apply<BuildLogicPlugin>()\nprintln(DeepThought().compute())\n",
    )?;

    let result = evaluator(dir.path()).evaluate_configuration(&settings);

    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(result.model.output, vec!["applied", "42"]);
    assert_eq!(result.model.plugins, vec!["BuildLogicPlugin"]);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].kind, DiagnosticKind::DeprecatedUsage);
    assert_eq!(
        result.warnings[0].to_string(),
        format!(
            "{}: Access to the buildSrc project and its dependencies in settings scripts has been deprecated.",
            settings.display()
        )
    );
    Ok(())
}

#[test]
fn test_build_src_from_project_script_is_not_deprecated() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "buildSrc/libs/logic.toml", DEEP_THOUGHT)?;
    write(dir.path(), "build.gradle.kts", "println(DeepThought().compute())\n")?;

    let result = evaluator(dir.path()).evaluate_configuration(Path::new("build.gradle.kts"));

    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(result.model.output, vec!["42"]);
    assert!(result.warnings.is_empty());
    Ok(())
}

#[test]
fn test_resolution_is_idempotent() -> Result<()> {
    let dir = TempDir::new()?;
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    fs::create_dir_all(&first)?;
    publish_plugin(&second, "test.MySettingsPlugin", "1.0", SETTINGS_PLUGIN)?;

    let transport = DefaultTransport::new(&Config::default().with_offline(true));
    let client = PluginRepositoryClient::new(&transport);
    let request = PluginRequest {
        id: "test.MySettingsPlugin".to_string(),
        version: Some("1.0".to_string()),
        applicator: Applicator::Declarative,
        apply: true,
        span: Span::new(1, 1, 0, 1),
    };
    let chain = vec![Repository::Directory(first), Repository::Directory(second)];

    let once = client.resolve(&request, &chain, &Classpath::default())?;
    let twice = client.resolve(&request, &chain, &Classpath::default())?;
    assert_eq!(once.origin, twice.origin);
    assert_eq!(once.artifact_path, twice.artifact_path);
    assert!(once.artifact_path.starts_with(dir.path().join("second")));
    Ok(())
}
