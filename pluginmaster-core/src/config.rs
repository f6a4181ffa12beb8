//! Run configuration (`pluginmaster.yaml`)
//!
//! Carries the version table, the source list and the transport / output
//! settings. Every section except `versions` and `repos` has defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::history::DEFAULT_API_BASE;
use crate::repo::{RepoDescriptor, RepoSource};
use crate::rewrite::DEFAULT_MIRROR;
use crate::schedule::VersionInfo;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "pluginmaster.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Prefix prepended to canonical GitHub URLs
    pub mirror: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            mirror: DEFAULT_MIRROR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base: String,
    /// Environment variable holding the API token
    pub token_env: String,
    pub timeout_seconds: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl GitHubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Token from the configured environment variable, if set and non-empty
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Local directory holding one subdirectory per delay key
    pub dir: PathBuf,
    /// Public URL the store directory is published under
    pub base_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("store"),
            base_url: "https://raw.githubusercontent.com/LiangYuxuan/dalamud-plugin-cn-fetcher/master/store"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Listing with mirrored URLs
    pub proxied: PathBuf,
    /// Listing with direct GitHub URLs
    pub direct: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            proxied: PathBuf::from("pluginmaster.json"),
            direct: PathBuf::from("pluginmaster_gh.json"),
        }
    }
}

/// Whole configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Newest first
    pub versions: Vec<VersionInfo>,

    pub repos: Vec<RepoDescriptor>,
}

impl Config {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        Self::from_yaml(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Parse and validate config YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(content).context("Failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.versions.is_empty() {
            anyhow::bail!("'versions' must list at least one version");
        }

        let mut delay_keys = HashSet::new();
        for descriptor in &self.repos {
            match &descriptor.source {
                RepoSource::GithubGlobal {
                    owner,
                    repo,
                    branch,
                    path,
                }
                | RepoSource::GithubCn {
                    owner,
                    repo,
                    branch,
                    path,
                } => {
                    if [owner, repo, branch, path].iter().any(|f| f.trim().is_empty()) {
                        anyhow::bail!(
                            "Source '{}' has an empty owner, repo, branch or path",
                            descriptor.label()
                        );
                    }
                }
                RepoSource::Direct { url } => validate_url(url)?,
                RepoSource::Delay { url, key } => {
                    validate_url(url)?;
                    if key.trim().is_empty() || key.contains(['/', '\\']) || key == ".." {
                        anyhow::bail!("Delay key '{}' is not a valid directory name", key);
                    }
                    if !delay_keys.insert(key.as_str()) {
                        anyhow::bail!("Delay key '{}' is used by more than one source", key);
                    }
                }
            }
        }

        Ok(())
    }
}

fn validate_url(url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("Source URL must start with http:// or https://: {}", url);
    }
    Ok(())
}
