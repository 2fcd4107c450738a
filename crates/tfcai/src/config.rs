//! run configuration
//!
//! Loaded from YAML, every field optional. Command line flags are applied on top.
//! ```yaml
//! project: my-project
//! offline: false
//! convert_unchanged: false
//! ancestry_cache:
//!   my-project: organizations/123/folders/456
//! directory:
//!   v1_endpoint: https://cloudresourcemanager.googleapis.com/v1/
//!   v3_endpoint: https://cloudresourcemanager.googleapis.com/v3/
//!   timeout_secs: 120
//! ```
use crate::ancestry::{AncestryCache, AncestryResolver};
use crate::directory::http::{HttpDirectory, DEFAULT_V1_ENDPOINT, DEFAULT_V3_ENDPOINT};
use crate::directory::retry::{RetryPolicy, DEFAULT_CALL_TIMEOUT};
use crate::directory::DirectoryAdapter;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the bearer token when none is configured
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// provider default project
    pub project: Option<String>,
    /// never call the directory, cache misses fail
    pub offline: bool,
    /// include no-op changes
    pub convert_unchanged: bool,
    /// `locator -> ancestry path` seed entries
    pub ancestry_cache: IndexMap<String, String>,
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectoryConfig {
    pub v1_endpoint: String,
    pub v3_endpoint: String,
    pub timeout_secs: u64,
    pub access_token: Option<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            v1_endpoint: DEFAULT_V1_ENDPOINT.to_string(),
            v3_endpoint: DEFAULT_V3_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
            access_token: None,
        }
    }
}

impl DirectoryConfig {
    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
            .filter(|token| !token.is_empty())
    }
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Adds (or replaces) one seed entry
    pub fn seed(&mut self, key: impl Into<String>, path: impl Into<String>) {
        self.ancestry_cache.insert(key.into(), path.into());
    }

    pub fn cache(&self) -> AncestryCache {
        AncestryCache::seeded(
            self.ancestry_cache
                .iter()
                .map(|(key, path)| (key.as_str(), path.as_str())),
        )
    }

    /// `None` when offline
    pub fn directory_adapter(&self) -> Option<DirectoryAdapter> {
        if self.offline {
            return None;
        }

        let client = HttpDirectory::new(
            self.directory.v1_endpoint.clone(),
            self.directory.v3_endpoint.clone(),
            self.directory.access_token(),
        );
        let retry =
            RetryPolicy::default().with_timeout(Duration::from_secs(self.directory.timeout_secs));
        Some(DirectoryAdapter::with_retry(Box::new(client), retry))
    }

    pub fn resolver(&self) -> AncestryResolver {
        AncestryResolver::new(self.cache(), self.directory_adapter())
            .with_default_project(self.project.clone())
    }
}

/// Parses a `KEY=PATH` seed argument
pub fn parse_seed(value: &str) -> Result<(String, String), ConfigError> {
    match value.split_once('=') {
        Some((key, path)) if !key.is_empty() && !path.is_empty() => {
            Ok((key.to_string(), path.to_string()))
        }
        _ => Err(ConfigError::InvalidSeed(value.to_string())),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file")]
    Yaml(#[from] serde_yaml::Error),
    #[error("ancestry entry {0:?} must have the form KEY=PATH")]
    InvalidSeed(String),
}
