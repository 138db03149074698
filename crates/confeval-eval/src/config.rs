//! Runtime configuration for the evaluator.
//!
//! [`Config`] controls where the root script is looked up, where plugins and
//! build-logic artifacts come from, HTTP behavior and parallelism.
//! Use [`Config::default()`] for sensible defaults.
//!
//! # Config file: `.confevalrc`
//!
//! confeval uses `.confevalrc` files with TOML syntax:
//!
//! - **Global**: `~/.confevalrc`, applies to all builds
//! - **Local**: `.confevalrc` or `.confeval/.confevalrc` in your build, overrides global
//!
//! ```toml
//! # .confevalrc example
//! settings_file = "settings.gradle.kts"
//! plugin_portal_url = "https://plugins.example.com/m2"
//! build_src_dir = "buildSrc"
//! http_timeout = 10
//! max_parallel_threads = 4
//! auth_token = "secret"
//! strict_deprecations = true
//! offline = false
//! ```
//!
//! All fields are optional. Local values override global values field by field.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = ".confevalrc";
pub const DEFAULT_SETTINGS_FILE: &str = "settings.gradle.kts";
pub const DEFAULT_PLUGIN_PORTAL_URL: &str = "https://plugins.confeval.dev/m2";
pub const DEFAULT_BUILD_SRC_DIR: &str = "buildSrc";

/// Keys accepted in a `.confevalrc` file.
pub const CONFIG_KEYS: &[&str] = &[
    "search_root",
    "settings_file",
    "plugin_portal_url",
    "build_src_dir",
    "http_timeout",
    "max_parallel_threads",
    "auth_token",
    "strict_deprecations",
    "offline",
];

/// TOML-friendly intermediate representation (all fields optional).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    search_root: Option<PathBuf>,
    settings_file: Option<String>,
    plugin_portal_url: Option<String>,
    build_src_dir: Option<String>,
    /// HTTP timeout in seconds.
    http_timeout: Option<u64>,
    /// Max parallel threads (0 = all cores).
    max_parallel_threads: Option<usize>,
    auth_token: Option<String>,
    strict_deprecations: Option<bool>,
    offline: Option<bool>,
}

/// Runtime configuration for the evaluator.
///
/// # Defaults
///
/// | Setting | Default |
/// |---------|---------|
/// | `search_root` | `None` (= process working directory) |
/// | `settings_file` | `"settings.gradle.kts"` |
/// | `plugin_portal_url` | `"https://plugins.confeval.dev/m2"` |
/// | `build_src_dir` | `"buildSrc"` |
/// | `http_timeout` | 30 s |
/// | `max_parallel_threads` | `0` (= use all available cores) |
/// | `auth_token` | `None` |
/// | `strict_deprecations` | `false` |
/// | `offline` | `false` |
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base directory for the root script and the build-logic directory.
    pub search_root: Option<PathBuf>,
    /// Root script file name looked up in the search root.
    pub settings_file: String,
    /// Default plugin repository, used when `pluginManagement` declares none.
    /// Either an `http(s)://` URL or a directory.
    pub plugin_portal_url: String,
    /// Build-logic directory, relative to the search root.
    pub build_src_dir: String,
    /// Timeout for artifact downloads.
    pub http_timeout: Duration,
    /// Maximum number of threads for classpath resolution.
    /// `0` means "use all available cores" (rayon default).
    pub max_parallel_threads: usize,
    /// Optional bearer token sent as `Authorization: Bearer <token>`
    /// with every artifact download.
    pub auth_token: Option<String>,
    /// Treat deprecation warnings as failures in the CLI.
    pub strict_deprecations: bool,
    /// Never touch the network; HTTP repositories report a transport failure.
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_root: None,
            settings_file: DEFAULT_SETTINGS_FILE.to_string(),
            plugin_portal_url: DEFAULT_PLUGIN_PORTAL_URL.to_string(),
            build_src_dir: DEFAULT_BUILD_SRC_DIR.to_string(),
            http_timeout: Duration::from_secs(30),
            max_parallel_threads: 0,
            auth_token: None,
            strict_deprecations: false,
            offline: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration by merging global and local `.confevalrc` files.
    ///
    /// 1. Loads `~/.confevalrc` (global) if it exists
    /// 2. Searches for `.confevalrc` or `.confeval/.confevalrc` starting from `start_dir`
    /// 3. Local values override global values
    ///
    /// Returns `Config::default()` if no config files are found.
    pub fn load(start_dir: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(global_path) = Self::find_global_config() {
            if let Ok(global_file) = Self::read_file(&global_path) {
                config.merge(global_file, &global_path);
            }
        }

        if let Some(local_path) = Self::find_local_config(start_dir) {
            let local_file = Self::read_file(&local_path)?;
            config.merge(local_file, &local_path);
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge(Self::read_file(path)?, path);
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn from_str(toml_str: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(toml_str).context("Failed to parse config")?;
        let mut config = Self::default();
        config.merge(file, Path::new(""));
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<ConfigFile> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Overrides every field set in `file`. A relative `search_root` is taken
    /// relative to the directory holding the config file.
    fn merge(&mut self, file: ConfigFile, origin: &Path) {
        if let Some(root) = file.search_root {
            self.search_root = Some(match origin.parent() {
                Some(dir) if root.is_relative() => {
                    // `.confeval/.confevalrc` describes the directory above it
                    let dir = if dir.ends_with(".confeval") { dir.parent().unwrap_or(dir) } else { dir };
                    crate::path_resolver::resolve(dir, &root)
                }
                _ => root,
            });
        }
        if let Some(name) = file.settings_file {
            self.settings_file = name;
        }
        if let Some(url) = file.plugin_portal_url {
            self.plugin_portal_url = url;
        }
        if let Some(dir) = file.build_src_dir {
            self.build_src_dir = dir;
        }
        if let Some(timeout) = file.http_timeout {
            self.http_timeout = Duration::from_secs(timeout);
        }
        if let Some(threads) = file.max_parallel_threads {
            self.max_parallel_threads = threads;
        }
        if file.auth_token.is_some() {
            self.auth_token = file.auth_token;
        }
        if let Some(strict) = file.strict_deprecations {
            self.strict_deprecations = strict;
        }
        if let Some(offline) = file.offline {
            self.offline = offline;
        }
    }

    /// Global config file at `~/.confevalrc`, if present.
    pub fn find_global_config() -> Option<PathBuf> {
        Self::global_config_path().filter(|p| p.is_file())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    /// Walks up from `start_dir` looking for `.confevalrc` or `.confeval/.confevalrc`.
    pub fn find_local_config(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
        let mut dir = start_dir.as_ref().to_path_buf();

        if let Ok(abs) = dir.canonicalize() {
            dir = abs;
        }

        loop {
            let rc_file = dir.join(CONFIG_FILE_NAME);
            if rc_file.is_file() {
                return Some(rc_file);
            }

            let nested_rc = dir.join(".confeval").join(CONFIG_FILE_NAME);
            if nested_rc.is_file() {
                return Some(nested_rc);
            }

            if !dir.pop() {
                return None;
            }
        }
    }

    /// The configured search root, or the process working directory.
    pub fn search_root(&self) -> PathBuf {
        match &self.search_root {
            Some(root) => root.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Root script location: the configured settings file inside the search root.
    pub fn settings_path(&self) -> PathBuf {
        crate::path_resolver::resolve(&self.search_root(), &self.settings_file)
    }

    pub fn build_src_path(&self) -> PathBuf {
        crate::path_resolver::resolve(&self.search_root(), &self.build_src_dir)
    }

    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = Some(root.into());
        self
    }

    pub fn with_settings_file(mut self, name: impl Into<String>) -> Self {
        self.settings_file = name.into();
        self
    }

    pub fn with_plugin_portal_url(mut self, url: impl Into<String>) -> Self {
        self.plugin_portal_url = url.into();
        self
    }

    pub fn with_build_src_dir(mut self, dir: impl Into<String>) -> Self {
        self.build_src_dir = dir.into();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Builder: limit parallel threads (`0` = all cores).
    pub fn with_max_parallel_threads(mut self, n: usize) -> Self {
        self.max_parallel_threads = n;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_strict_deprecations(mut self, strict: bool) -> Self {
        self.strict_deprecations = strict;
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.settings_file, "settings.gradle.kts");
        assert_eq!(cfg.plugin_portal_url, DEFAULT_PLUGIN_PORTAL_URL);
        assert_eq!(cfg.build_src_dir, "buildSrc");
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_parallel_threads, 0);
        assert!(cfg.auth_token.is_none());
        assert!(!cfg.strict_deprecations);
        assert!(!cfg.offline);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            search_root = "/work/build"
            settings_file = "main.settings.gradle.kts"
            plugin_portal_url = "https://repo.example.com"
            build_src_dir = "logic"
            http_timeout = 10
            max_parallel_threads = 4
            auth_token = "secret"
            strict_deprecations = true
            offline = true
        "#;
        let cfg = Config::from_str(toml).unwrap();
        assert_eq!(cfg.search_root, Some(PathBuf::from("/work/build")));
        assert_eq!(cfg.settings_file, "main.settings.gradle.kts");
        assert_eq!(cfg.plugin_portal_url, "https://repo.example.com");
        assert_eq!(cfg.build_src_dir, "logic");
        assert_eq!(cfg.http_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_parallel_threads, 4);
        assert_eq!(cfg.auth_token.as_deref(), Some("secret"));
        assert!(cfg.strict_deprecations);
        assert!(cfg.offline);
    }

    #[test]
    fn test_parse_partial_config() {
        let cfg = Config::from_str("http_timeout = 120").unwrap();
        assert_eq!(cfg.http_timeout, Duration::from_secs(120));
        assert_eq!(cfg.settings_file, DEFAULT_SETTINGS_FILE);
        assert_eq!(cfg.max_parallel_threads, 0);
    }

    #[test]
    fn test_parse_empty_config() {
        let cfg = Config::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(Config::from_str("command_timeout = 5").is_err());
    }

    #[test]
    fn test_merge_configs() {
        let mut cfg = Config::from_str("http_timeout = 10\nmax_parallel_threads = 4").unwrap();
        let local: ConfigFile = toml::from_str("http_timeout = 120\nauth_token = \"local\"").unwrap();
        cfg.merge(local, Path::new("/work/.confevalrc"));

        assert_eq!(cfg.http_timeout, Duration::from_secs(120));
        assert_eq!(cfg.max_parallel_threads, 4);
        assert_eq!(cfg.auth_token.as_deref(), Some("local"));
    }

    #[test]
    fn test_relative_search_root_follows_config_file() {
        let mut cfg = Config::default();
        let file: ConfigFile = toml::from_str("search_root = \"build\"").unwrap();
        cfg.merge(file, Path::new("/work/.confeval/.confevalrc"));
        assert_eq!(cfg.search_root, Some(PathBuf::from("/work/build")));
    }

    #[test]
    fn test_settings_path_inside_search_root() {
        let cfg = Config::new().with_search_root("/work").with_settings_file("settings.gradle.kts");
        assert_eq!(cfg.settings_path(), PathBuf::from("/work/settings.gradle.kts"));
        assert_eq!(cfg.build_src_path(), PathBuf::from("/work/buildSrc"));
    }

    #[test]
    fn test_builder_methods() {
        let cfg = Config::new()
            .with_http_timeout(Duration::from_secs(5))
            .with_max_parallel_threads(2)
            .with_auth_token("tok")
            .with_offline(true);
        assert_eq!(cfg.http_timeout, Duration::from_secs(5));
        assert_eq!(cfg.max_parallel_threads, 2);
        assert_eq!(cfg.auth_token.as_deref(), Some("tok"));
        assert!(cfg.offline);
    }
}
