//! Artifact repositories and plugin resolution.
//!
//! Repositories are either directories on disk or HTTP base URLs sharing the
//! same layout (see [`Coordinates::relative_path`]). Downloads are cached
//! under `<cache_dir>/confeval/artifacts` and revalidated with ETags.

use crate::artifact::{Artifact, Coordinates, PluginDef};
use crate::classpath::{Classpath, ClasspathSource};
use crate::config::Config;
use crate::error::{RepositoryAttempt, ResolutionError, TransportError};
use confeval_syntax::error::Span;
use confeval_syntax::script::RepositorySpec;
use reqwest::StatusCode;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Repository {
    Directory(PathBuf),
    Http(String),
}

impl Repository {
    /// `http(s)://` locations are remote, anything else is a directory
    /// relative to `base_dir`.
    pub fn from_location(location: &str, base_dir: &Path) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Repository::Http(location.trim_end_matches('/').to_string())
        } else {
            let location = location.strip_prefix("file://").unwrap_or(location);
            Repository::Directory(crate::path_resolver::resolve(base_dir, location))
        }
    }

    /// Repository a `repositories { ... }` entry of a script in `base_dir` stands for.
    pub fn from_spec(spec: &RepositorySpec, base_dir: &Path, portal: &Repository) -> Self {
        match spec {
            RepositorySpec::Maven { url, .. } => Self::from_location(url, base_dir),
            RepositorySpec::PluginPortal { .. } => portal.clone(),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repository::Directory(path) => write!(f, "{}", path.display()),
            Repository::Http(url) => write!(f, "{}", url),
        }
    }
}

/// Where a fetched artifact ended up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub repository: Repository,
    pub coordinates: Coordinates,
    pub path: PathBuf,
}

/// Fetches artifacts from a single repository.
pub trait RepositoryTransport: Send + Sync {
    /// [`TransportError::NotFound`] means the repository does not serve
    /// `coordinates`; every other error is a transport failure.
    fn fetch(&self, coordinates: &Coordinates, repository: &Repository) -> Result<ArtifactLocation, TransportError>;
}

/// Serves directory repositories from disk and HTTP repositories through
/// a blocking `reqwest` client with an on-disk ETag cache.
#[derive(Debug, Clone)]
pub struct DefaultTransport {
    http_timeout: Duration,
    auth_token: Option<String>,
    offline: bool,
    cache_dir: Option<PathBuf>,
}

impl DefaultTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            http_timeout: config.http_timeout,
            auth_token: config.auth_token.clone(),
            offline: config.offline,
            cache_dir: dirs::cache_dir().map(|cache| cache.join("confeval").join("artifacts")),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    fn fetch_directory(&self, coordinates: &Coordinates, root: &Path) -> Result<PathBuf, TransportError> {
        let path = root.join(coordinates.relative_path());
        if path.is_file() {
            Ok(path)
        } else {
            Err(TransportError::NotFound { coordinates: coordinates.to_string() })
        }
    }

    fn cache_path(&self, base_url: &str, coordinates: &Coordinates) -> Result<PathBuf, TransportError> {
        let cache_dir = self.cache_dir.as_ref().ok_or_else(|| TransportError::Fetch {
            url: base_url.to_string(),
            message: "could not determine cache directory".to_string(),
        })?;
        let repo_key: String = base_url
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        Ok(cache_dir.join(repo_key).join(coordinates.relative_path()))
    }

    fn fetch_http(&self, coordinates: &Coordinates, base_url: &str) -> Result<PathBuf, TransportError> {
        if self.offline {
            return Err(TransportError::Offline { repository: base_url.to_string() });
        }

        let url = format!("{}/{}", base_url, coordinates.url_path());
        let path = self.cache_path(base_url, coordinates)?;
        let etag_path = path.with_extension("etag");
        let fetch_err = |message: String| TransportError::Fetch { url: url.clone(), message };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .map_err(|e| fetch_err(e.to_string()))?;

        let mut request = client.get(&url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        if path.exists() {
            if let Ok(etag) = fs::read_to_string(&etag_path) {
                request = request.header("If-None-Match", etag.trim());
            }
        }

        debug!(%url, "fetching artifact");
        let response = request.send().map_err(|e| fetch_err(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!(%url, "artifact is up-to-date (using cache)");
            return Ok(path);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound { coordinates: coordinates.to_string() });
        }
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {}", status)));
        }

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let content = response.text().map_err(|e| fetch_err(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| fetch_err(e.to_string()))?;
        }
        fs::write(&path, &content).map_err(|e| fetch_err(e.to_string()))?;
        if let Some(tag) = etag {
            let _ = fs::write(&etag_path, tag);
        }

        info!(%coordinates, "artifact cached");
        Ok(path)
    }
}

impl RepositoryTransport for DefaultTransport {
    fn fetch(&self, coordinates: &Coordinates, repository: &Repository) -> Result<ArtifactLocation, TransportError> {
        let path = match repository {
            Repository::Directory(root) => self.fetch_directory(coordinates, root)?,
            Repository::Http(url) => self.fetch_http(coordinates, url)?,
        };
        Ok(ArtifactLocation {
            repository: repository.clone(),
            coordinates: coordinates.clone(),
            path,
        })
    }
}

// ============================================================================
// PLUGIN RESOLUTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicator {
    /// `plugins { id("...") }`, resolved against the repository chain.
    Declarative,
    /// `apply<T>()` and friends, looked up on the script classpath.
    Imperative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRequest {
    /// Plugin id, or class name for imperative requests.
    pub id: String,
    pub version: Option<String>,
    pub applicator: Applicator,
    /// `false` for `apply(false)`: resolve only.
    pub apply: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOrigin {
    Repository(ArtifactLocation),
    Classpath(ClasspathSource),
}

#[derive(Debug, Clone)]
pub struct ResolvedPlugin {
    pub definition: PluginDef,
    pub artifact: Arc<Artifact>,
    pub artifact_path: PathBuf,
    pub origin: PluginOrigin,
}

impl ResolvedPlugin {
    pub fn id(&self) -> &str {
        self.definition.display_id()
    }
}

/// Resolves plugin requests. Holds no mutable state, so the same request
/// against the same chain always yields the same location.
pub struct PluginRepositoryClient<'a> {
    transport: &'a dyn RepositoryTransport,
}

impl<'a> PluginRepositoryClient<'a> {
    pub fn new(transport: &'a dyn RepositoryTransport) -> Self {
        Self { transport }
    }

    pub fn resolve(
        &self,
        request: &PluginRequest,
        repositories: &[Repository],
        classpath: &Classpath,
    ) -> Result<ResolvedPlugin, ResolutionError> {
        match request.applicator {
            Applicator::Declarative => self.resolve_declarative(request, repositories),
            Applicator::Imperative => Self::resolve_imperative(request, classpath),
        }
    }

    fn resolve_declarative(
        &self,
        request: &PluginRequest,
        repositories: &[Repository],
    ) -> Result<ResolvedPlugin, ResolutionError> {
        let version = request
            .version
            .as_deref()
            .ok_or_else(|| ResolutionError::PluginVersionMissing(request.id.clone()))?;
        let coordinates = Coordinates::plugin_marker(&request.id, version);
        let mut attempts = Vec::with_capacity(repositories.len());

        for repository in repositories {
            match self.transport.fetch(&coordinates, repository) {
                Ok(location) => {
                    debug!(plugin = %request.id, %repository, "plugin marker found");
                    return Self::load_marker(&request.id, location);
                }
                Err(e) if e.is_not_found() => {
                    debug!(plugin = %request.id, %repository, "no match");
                    attempts.push(RepositoryAttempt { repository: repository.to_string(), error: None });
                }
                Err(e) => {
                    warn!(plugin = %request.id, %repository, error = %e, "repository unavailable");
                    attempts.push(RepositoryAttempt {
                        repository: repository.to_string(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Err(ResolutionError::PluginNotFound {
            id: request.id.clone(),
            version: version.to_string(),
            attempts,
        })
    }

    fn load_marker(id: &str, location: ArtifactLocation) -> Result<ResolvedPlugin, ResolutionError> {
        let invalid = |message: String| ResolutionError::InvalidArtifact {
            path: location.path.display().to_string(),
            message,
        };
        let artifact = Artifact::load(&location.path).map_err(|e| invalid(format!("{:#}", e)))?;
        let definition = artifact
            .plugin_by_id(id)
            .cloned()
            .ok_or_else(|| invalid(format!("it does not declare plugin '{}'", id)))?;
        Ok(ResolvedPlugin {
            definition,
            artifact: Arc::new(artifact),
            artifact_path: location.path.clone(),
            origin: PluginOrigin::Repository(location),
        })
    }

    fn resolve_imperative(request: &PluginRequest, classpath: &Classpath) -> Result<ResolvedPlugin, ResolutionError> {
        let (definition, entry, artifact) = classpath
            .find_plugin(&request.id)
            .ok_or_else(|| ResolutionError::PluginClassNotFound(request.id.clone()))?;
        Ok(ResolvedPlugin {
            definition: definition.clone(),
            artifact: Arc::clone(artifact),
            artifact_path: entry.path.clone(),
            origin: PluginOrigin::Classpath(entry.source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn request(id: &str, version: Option<&str>) -> PluginRequest {
        PluginRequest {
            id: id.to_string(),
            version: version.map(str::to_string),
            applicator: Applicator::Declarative,
            apply: true,
            span: Span::new(1, 1, 0, 2),
        }
    }

    fn write_marker(root: &Path, id: &str, version: &str) {
        let coords = Coordinates::plugin_marker(id, version);
        let path = root.join(coords.relative_path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            format!("[[plugins]]\nid = \"{}\"\nclass = \"P\"\napply = 'println(\"{}\")'\n", id, root.display()),
        )
        .unwrap();
    }

    /// Fails every fetch with a transport error and records what was asked.
    struct FlakyTransport(Mutex<Vec<String>>);

    impl RepositoryTransport for FlakyTransport {
        fn fetch(&self, _: &Coordinates, repository: &Repository) -> Result<ArtifactLocation, TransportError> {
            self.0.lock().unwrap().push(repository.to_string());
            Err(TransportError::Fetch { url: repository.to_string(), message: "connection refused".into() })
        }
    }

    #[test]
    fn first_matching_repository_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write_marker(second.path(), "a.b", "1.0");
        write_marker(first.path(), "a.b", "1.0");

        let transport = DefaultTransport::new(&Config::default());
        let client = PluginRepositoryClient::new(&transport);
        let repos = vec![
            Repository::Directory(first.path().to_path_buf()),
            Repository::Directory(second.path().to_path_buf()),
        ];
        let resolved = client.resolve(&request("a.b", Some("1.0")), &repos, &Classpath::default()).unwrap();
        assert!(resolved.artifact_path.starts_with(first.path()));

        let again = client.resolve(&request("a.b", Some("1.0")), &repos, &Classpath::default()).unwrap();
        assert_eq!(resolved.origin, again.origin);
    }

    #[test]
    fn missing_version_is_reported() {
        let transport = DefaultTransport::new(&Config::default());
        let client = PluginRepositoryClient::new(&transport);
        let err = client.resolve(&request("a.b", None), &[], &Classpath::default()).unwrap_err();
        assert_eq!(err, ResolutionError::PluginVersionMissing("a.b".into()));
    }

    #[test]
    fn transport_failures_are_aggregated() {
        let transport = FlakyTransport(Mutex::new(Vec::new()));
        let client = PluginRepositoryClient::new(&transport);
        let repos = vec![Repository::Http("https://a.example".into()), Repository::Http("https://b.example".into())];
        let err = client.resolve(&request("a.b", Some("1.0")), &repos, &Classpath::default()).unwrap_err();

        let ResolutionError::PluginNotFound { attempts, .. } = err else {
            panic!("Expected PluginNotFound");
        };
        assert_eq!(attempts.len(), 2);
        assert!(attempts.iter().all(|a| a.error.as_deref() == Some("could not fetch https://a.example: connection refused")
            || a.error.as_deref() == Some("could not fetch https://b.example: connection refused")));
        assert_eq!(transport.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn offline_mode_skips_http() {
        let transport = DefaultTransport::new(&Config::default().with_offline(true));
        let err = transport
            .fetch(&Coordinates::plugin_marker("a.b", "1.0"), &Repository::Http("https://x.example".into()))
            .unwrap_err();
        assert!(matches!(err, TransportError::Offline { .. }));
    }

    #[test]
    fn repository_from_location() {
        assert_eq!(
            Repository::from_location("https://repo.example/m2/", Path::new("/b")),
            Repository::Http("https://repo.example/m2".into())
        );
        assert_eq!(
            Repository::from_location("../repo", Path::new("/b/settings")),
            Repository::Directory(PathBuf::from("/b/repo"))
        );
    }
}
