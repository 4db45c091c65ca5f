//! Repository configuration
//!
//! A TOML file (default `~/.book2pdf.toml`) holds one table per environment.
//! Each environment names the Islandora object endpoint, the Solr endpoint
//! and optional tuning. The selected environment becomes a
//! [`RepositoryConfig`] that is handed to every component constructor.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name, relative to the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".book2pdf.toml";

/// Default environment section
pub const DEFAULT_ENVIRONMENT: &str = "prod";

/// A network endpoint split into its URL components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// `http` or `https`
    pub protocol: String,
    /// Host name or address
    pub hostname: String,
    /// TCP port
    pub port: u16,
    /// Path prefix, without leading slash
    #[serde(default)]
    pub path: String,
}

impl Endpoint {
    /// Create endpoint
    pub fn new(
        protocol: impl Into<String>,
        hostname: impl Into<String>,
        port: u16,
        path: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            hostname: hostname.into(),
            port,
            path: path.into(),
        }
    }

    /// Base URL, never ending in `/`
    #[must_use]
    pub fn url(&self) -> String {
        let path = self.path.trim_matches('/');
        if path.is_empty() {
            format!("{}://{}:{}", self.protocol, self.hostname, self.port)
        } else {
            format!("{}://{}:{}/{}", self.protocol, self.hostname, self.port, path)
        }
    }
}

/// Tunables with defaults suited to a single workstation on the VPN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Concurrent page downloads within one book
    pub page_concurrency: usize,
    /// Concurrent books in collection mode
    pub book_concurrency: usize,
    /// Rows requested per index query
    pub index_page_size: usize,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Attempts per network call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on every retry
    pub initial_backoff_ms: u64,
    /// Upper bound on a single retry delay
    pub max_backoff_ms: u64,
    /// External image-to-PDF program
    pub converter: String,
    /// Arguments placed before the image paths
    pub converter_args: Vec<String>,
    /// RELS-EXT element holding the page sequence number
    pub sequence_tag: String,
    /// Datastream holding the page image
    pub image_datastream: String,
    /// Datastream holding a previously generated PDF
    pub artifact_datastream: String,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            page_concurrency: 4,
            book_concurrency: 1,
            index_page_size: 10_000,
            request_timeout_secs: 60,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            converter: "img2pdf".to_string(),
            converter_args: Vec::new(),
            sequence_tag: "islandora:isSequenceNumber".to_string(),
            image_datastream: "LARGE_JPG".to_string(),
            artifact_datastream: "PDF".to_string(),
        }
    }
}

/// One environment table of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Islandora object endpoint (`.../islandora/object`)
    pub islandora: Endpoint,
    /// Solr core endpoint (`.../solr/collection1`)
    pub solr: Endpoint,
    /// Optional tuning overrides
    #[serde(default)]
    pub tuning: Tuning,
}

/// The whole configuration file: environment name → settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigFile {
    /// Environments keyed by section name
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

impl ConfigFile {
    /// Parse configuration text; `path` is used for error messages only
    ///
    /// # Errors
    /// `ConfigError::Parse` when the text is not valid for this schema.
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read and parse a configuration file
    ///
    /// # Errors
    /// `ConfigError::NotFound`, `ConfigError::Read` or `ConfigError::Parse`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_toml(&content, path)
    }

    /// Select one environment
    ///
    /// # Errors
    /// `ConfigError::MissingEnvironment` if the section is absent.
    pub fn environment(&self, name: &str, path: &Path) -> Result<RepositoryConfig, ConfigError> {
        let env = self
            .environments
            .get(name)
            .ok_or_else(|| ConfigError::MissingEnvironment {
                environment: name.to_string(),
                path: path.to_path_buf(),
            })?;
        Ok(RepositoryConfig::from_environment(env))
    }
}

/// Location of the default configuration file
///
/// # Errors
/// `ConfigError::HomeDirUnknown` if `HOME` is unset.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(DEFAULT_CONFIG_FILE))
        .ok_or(ConfigError::HomeDirUnknown)
}

/// Resolved settings for one environment, passed explicitly to components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Base URL of the Islandora object endpoint
    pub islandora_url: String,
    /// Base URL of the Solr core
    pub solr_url: String,
    /// Tunables
    pub tuning: Tuning,
}

impl RepositoryConfig {
    /// Create configuration from base URLs with default tuning
    pub fn new(islandora_url: impl Into<String>, solr_url: impl Into<String>) -> Self {
        Self {
            islandora_url: islandora_url.into().trim_end_matches('/').to_string(),
            solr_url: solr_url.into().trim_end_matches('/').to_string(),
            tuning: Tuning::default(),
        }
    }

    /// Build from one environment table
    #[must_use]
    pub fn from_environment(env: &EnvironmentConfig) -> Self {
        Self {
            islandora_url: env.islandora.url(),
            solr_url: env.solr.url(),
            tuning: env.tuning.clone(),
        }
    }

    /// Replace tuning
    #[inline]
    #[must_use]
    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// With page download concurrency (at least one)
    #[inline]
    #[must_use]
    pub fn with_page_concurrency(mut self, n: usize) -> Self {
        self.tuning.page_concurrency = n.max(1);
        self
    }

    /// With book concurrency (at least one)
    #[inline]
    #[must_use]
    pub fn with_book_concurrency(mut self, n: usize) -> Self {
        self.tuning.book_concurrency = n.max(1);
        self
    }

    /// Per-request timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.tuning.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[prod.islandora]
protocol = "https"
hostname = "compass.fivecolleges.edu"
port = 443
path = "islandora/object"

[prod.solr]
protocol = "http"
hostname = "compass-fedora-prod.fivecolleges.edu"
port = 8080
path = "/solr/collection1/"

[staging.islandora]
protocol = "https"
hostname = "compass-stage.fivecolleges.edu"
port = 443
path = "islandora/object"

[staging.solr]
protocol = "http"
hostname = "compass-fedora-stage.fivecolleges.edu"
port = 8080
path = "solr/collection1"

[staging.tuning]
page_concurrency = 8
converter_args = ["--pagesize", "A4"]
"#;

    #[test]
    fn endpoint_url_joins_components() {
        let endpoint = Endpoint::new("http", "localhost", 8080, "/solr/collection1/");
        assert_eq!(endpoint.url(), "http://localhost:8080/solr/collection1");

        let bare = Endpoint::new("http", "localhost", 80, "");
        assert_eq!(bare.url(), "http://localhost:80");
    }

    #[test]
    fn parses_environments() {
        let file = ConfigFile::from_toml(SAMPLE, Path::new("test.toml")).unwrap();
        assert_eq!(file.environments.len(), 2);

        let prod = file.environment("prod", Path::new("test.toml")).unwrap();
        assert_eq!(
            prod.islandora_url,
            "https://compass.fivecolleges.edu:443/islandora/object"
        );
        assert_eq!(
            prod.solr_url,
            "http://compass-fedora-prod.fivecolleges.edu:8080/solr/collection1"
        );
        assert_eq!(prod.tuning, Tuning::default());
    }

    #[test]
    fn tuning_overrides_merge_with_defaults() {
        let file = ConfigFile::from_toml(SAMPLE, Path::new("test.toml")).unwrap();
        let staging = file.environment("staging", Path::new("test.toml")).unwrap();
        assert_eq!(staging.tuning.page_concurrency, 8);
        assert_eq!(staging.tuning.converter_args, vec!["--pagesize", "A4"]);
        assert_eq!(staging.tuning.converter, "img2pdf");
    }

    #[test]
    fn missing_environment_is_reported() {
        let file = ConfigFile::from_toml(SAMPLE, Path::new("test.toml")).unwrap();
        let err = file.environment("dev", Path::new("test.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvironment { .. }));
        assert!(err.to_string().contains("'dev'"));
    }

    #[test]
    fn missing_endpoint_key_is_parse_error() {
        let broken = "[prod.islandora]\nprotocol = \"https\"\n";
        let err = ConfigFile::from_toml(broken, Path::new("broken.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            ConfigFile::load(&path),
            Err(ConfigError::NotFound(p)) if p == path
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book2pdf.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let file = ConfigFile::load(&path).unwrap();
        assert!(file.environments.contains_key("staging"));
    }

    #[test]
    fn repository_config_builders_clamp() {
        let config = RepositoryConfig::new("http://a/", "http://b/")
            .with_page_concurrency(0)
            .with_book_concurrency(3);
        assert_eq!(config.islandora_url, "http://a");
        assert_eq!(config.solr_url, "http://b");
        assert_eq!(config.tuning.page_concurrency, 1);
        assert_eq!(config.tuning.book_concurrency, 3);
    }
}
