//! Artifact descriptors and module coordinates.
//!
//! An artifact is a TOML file listing the classes and plugins it provides:
//!
//! ```toml
//! [[classes]]
//! name = "DeepThought"
//! members = { compute = "42" }
//!
//! [[plugins]]
//! id = "test.MySettingsPlugin"
//! class = "MySettingsPlugin"
//! apply = 'println("*42*")'
//! ```

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

static COORDINATES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_.\-]+):([A-Za-z0-9_.\-]+):([A-Za-z0-9_.\-+]+)$")
        .expect("coordinate pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Artifact {
    #[serde(default)]
    pub classes: Vec<ClassDef>,
    #[serde(default)]
    pub plugins: Vec<PluginDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassDef {
    /// Simple or fully qualified class name.
    pub name: String,
    /// Zero-argument members and the string each returns.
    #[serde(default)]
    pub members: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginDef {
    #[serde(default)]
    pub id: Option<String>,
    pub class: String,
    /// Script body run against the target when the plugin is applied.
    #[serde(default)]
    pub apply: String,
}

impl PluginDef {
    /// Id the plugin is recorded under once applied.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.class)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.id.as_deref() == Some(name) || class_name_matches(&self.class, name)
    }
}

/// `requested` names `declared` either fully qualified or by its simple name.
pub fn class_name_matches(declared: &str, requested: &str) -> bool {
    declared == requested
        || (!requested.contains('.') && declared.rsplit('.').next() == Some(requested))
}

impl Artifact {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid artifact {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let artifact: Artifact = toml::from_str(content)?;
        for plugin in &artifact.plugins {
            if plugin.class.is_empty() {
                bail!("plugin entries need a non-empty 'class'");
            }
        }
        Ok(artifact)
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|c| class_name_matches(&c.name, name))
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginDef> {
        self.plugins.iter().find(|p| p.matches(name))
    }

    pub fn plugin_by_id(&self, id: &str) -> Option<&PluginDef> {
        self.plugins.iter().find(|p| p.id.as_deref() == Some(id))
    }
}

/// `group:name:version` module coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinates {
    pub group: String,
    pub name: String,
    pub version: String,
}

impl Coordinates {
    pub fn parse(notation: &str) -> Result<Self> {
        let caps = COORDINATES
            .captures(notation.trim())
            .ok_or_else(|| anyhow::anyhow!("Invalid module notation '{}', expected 'group:name:version'", notation))?;
        Ok(Self {
            group: caps[1].to_string(),
            name: caps[2].to_string(),
            version: caps[3].to_string(),
        })
    }

    /// Marker coordinates a plugin request `id@version` is published under.
    pub fn plugin_marker(id: &str, version: &str) -> Self {
        Self {
            group: id.to_string(),
            name: format!("{}.plugin", id),
            version: version.to_string(),
        }
    }

    fn segments(&self) -> Vec<String> {
        let mut segments: Vec<String> = self.group.split('.').map(str::to_string).collect();
        segments.push(self.name.clone());
        segments.push(self.version.clone());
        segments.push(self.file_name());
        segments
    }

    pub fn file_name(&self) -> String {
        format!("{}-{}.toml", self.name, self.version)
    }

    /// `<group with '.' as '/'>/<name>/<version>/<name>-<version>.toml`
    pub fn relative_path(&self) -> PathBuf {
        self.segments().iter().collect()
    }

    pub fn url_path(&self) -> String {
        self.segments().join("/")
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
[[classes]]
name = "org.gradle.kotlin.dsl.fixtures.DeepThought"
members = { compute = "42" }

[[plugins]]
id = "test.MySettingsPlugin"
class = "MySettingsPlugin"
apply = 'println("*42*")'
"#;

    #[test]
    fn parses_descriptor() {
        let artifact = Artifact::parse(FIXTURE).unwrap();
        assert_eq!(artifact.classes.len(), 1);
        assert_eq!(artifact.plugins[0].apply, "println(\"*42*\")");
    }

    #[test]
    fn finds_class_by_simple_or_qualified_name() {
        let artifact = Artifact::parse(FIXTURE).unwrap();
        assert!(artifact.class("DeepThought").is_some());
        assert!(artifact.class("org.gradle.kotlin.dsl.fixtures.DeepThought").is_some());
        assert!(artifact.class("fixtures.DeepThought").is_none());
    }

    #[test]
    fn finds_plugin_by_id_or_class() {
        let artifact = Artifact::parse(FIXTURE).unwrap();
        assert!(artifact.plugin("MySettingsPlugin").is_some());
        assert!(artifact.plugin("test.MySettingsPlugin").is_some());
        assert!(artifact.plugin_by_id("MySettingsPlugin").is_none());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(Artifact::parse("[[classes]]\nname = \"A\"\nkind = \"x\"").is_err());
    }

    #[test]
    fn plugin_marker_layout() {
        let coords = Coordinates::plugin_marker("test.MySettingsPlugin", "1.0");
        assert_eq!(coords.to_string(), "test.MySettingsPlugin:test.MySettingsPlugin.plugin:1.0");
        assert_eq!(
            coords.url_path(),
            "test/MySettingsPlugin/test.MySettingsPlugin.plugin/1.0/test.MySettingsPlugin.plugin-1.0.toml"
        );
    }

    #[test]
    fn parses_module_notation() {
        let coords = Coordinates::parse("org.acme:answers:1.2.0").unwrap();
        assert_eq!(coords.relative_path(), PathBuf::from("org/acme/answers/1.2.0/answers-1.2.0.toml"));
        assert!(Coordinates::parse("org.acme:answers").is_err());
    }
}
