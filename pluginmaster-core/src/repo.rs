//! Manifest sources and how to fetch them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::history::HistoryResolver;
use crate::manifest::{self, Manifest};
use crate::rules::RuleSet;
use crate::url;

/// Where a listing comes from, and which strategy the pipeline uses for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RepoSource {
    /// Listing on GitHub that follows the global release; pinned to the cutoff
    GithubGlobal {
        owner: String,
        repo: String,
        branch: String,
        path: String,
    },
    /// Listing on GitHub maintained for the CN release; served as-is
    GithubCn {
        owner: String,
        repo: String,
        branch: String,
        path: String,
    },
    /// Any HTTP JSON endpoint; served as-is
    Direct { url: String },
    /// HTTP JSON endpoint whose binaries are stored locally under `key`
    Delay { url: String, key: String },
}

/// A configured source with its rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    #[serde(flatten)]
    pub source: RepoSource,

    #[serde(flatten)]
    pub rules: RuleSet,
}

impl RepoSource {
    /// URL of the listing; GitHub sources read it at `reference`
    pub fn fetch_url_at(&self, reference: Option<&str>) -> String {
        match self {
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
            } => url::raw_content_url(owner, repo, reference.unwrap_or(branch), path),
            RepoSource::Direct { url } | RepoSource::Delay { url, .. } => url.clone(),
        }
    }

    /// URL of the listing at the tip of its branch
    pub fn fetch_url(&self) -> String {
        self.fetch_url_at(None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RepoSource::GithubGlobal { .. } => "github-global",
            RepoSource::GithubCn { .. } => "github-cn",
            RepoSource::Direct { .. } => "direct",
            RepoSource::Delay { .. } => "delay",
        }
    }
}

impl fmt::Display for RepoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
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
            } => write!(f, "{owner}/{repo}@{branch}:{path}"),
            RepoSource::Direct { url } => write!(f, "{url}"),
            RepoSource::Delay { url, key } => write!(f, "{url} ({key})"),
        }
    }
}

impl RepoDescriptor {
    pub fn new(source: RepoSource) -> Self {
        Self {
            source,
            rules: RuleSet::default(),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Human-readable label used in logs and errors
    pub fn label(&self) -> String {
        self.source.to_string()
    }
}

/// Fetch and parse the listing of one source
///
/// A `github-global` source with a cutoff is read at the commit that was the
/// branch tip at the cutoff, so the listing matches the pinned binaries.
pub async fn fetch_manifests(
    descriptor: &RepoDescriptor,
    cutoff: Option<&DateTime<Utc>>,
    resolver: &HistoryResolver,
) -> Result<Vec<Manifest>> {
    let label = descriptor.label();
    fetch_listing(descriptor, cutoff, resolver)
        .await
        .inspect(|manifests| info!("Fetched {} plugins from {}", manifests.len(), label))
        .inspect_err(|e| error!("Failed to fetch {}: {}", label, e))
}

async fn fetch_listing(
    descriptor: &RepoDescriptor,
    cutoff: Option<&DateTime<Utc>>,
    resolver: &HistoryResolver,
) -> Result<Vec<Manifest>> {
    let url = match (&descriptor.source, cutoff) {
        (
            RepoSource::GithubGlobal {
                owner,
                repo,
                branch,
                ..
            },
            Some(cutoff),
        ) => {
            let sha = resolver
                .resolve_commit_before(owner, repo, branch, cutoff)
                .await?;
            descriptor.source.fetch_url_at(Some(&sha))
        }
        (source, _) => source.fetch_url(),
    };

    let value = resolver.fetcher().get_json(&url).await?;
    manifest::parse_listing(value).map_err(|source| Error::Payload { url, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ManifestMatch;
    use pretty_assertions::assert_eq;

    fn global() -> RepoSource {
        RepoSource::GithubGlobal {
            owner: "o".to_string(),
            repo: "r".to_string(),
            branch: "main".to_string(),
            path: "repo.json".to_string(),
        }
    }

    #[test]
    fn test_fetch_urls_and_labels() {
        assert_eq!(
            global().fetch_url(),
            "https://raw.githubusercontent.com/o/r/main/repo.json"
        );
        assert_eq!(
            global().fetch_url_at(Some("abc123")),
            "https://raw.githubusercontent.com/o/r/abc123/repo.json"
        );
        assert_eq!(global().to_string(), "o/r@main:repo.json");

        let delay = RepoSource::Delay {
            url: "https://plugins.example.com/".to_string(),
            key: "example".to_string(),
        };
        assert_eq!(delay.fetch_url_at(Some("ignored")), "https://plugins.example.com/");
        assert_eq!(delay.to_string(), "https://plugins.example.com/ (example)");
        assert_eq!(delay.kind(), "delay");
    }

    #[test]
    fn test_descriptor_from_yaml() {
        let yaml = r#"
type: github-cn
owner: o
repo: r
branch: CN
path: release/pluginmaster.json
include:
  - Name: A
"#;
        let descriptor: RepoDescriptor = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(descriptor.source.kind(), "github-cn");
        assert_eq!(descriptor.label(), "o/r@CN:release/pluginmaster.json");
        assert_eq!(descriptor.rules.include, Some(vec![ManifestMatch::name("A")]));
        assert!(descriptor.rules.exclude.is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let yaml = "type: gitlab\nurl: https://example.com\n";
        assert!(serde_yaml_ng::from_str::<RepoDescriptor>(yaml).is_err());
    }
}
