//! Point-in-time history lookups against the GitHub REST API
//!
//! Answers "which commit / release was the newest one at or before the
//! cutoff" and memoizes the answers for the lifetime of the resolver.
//!
//! The caches are advisory. A lookup reads the cache, computes the result
//! with no lock held and writes the finished value, so two concurrent lookups
//! of the same key may both hit the network but never observe a partial
//! entry. Entries are never evicted; a run touches a handful of keys.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fetch::PagedFetch;

/// Default REST API base
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Render a cutoff the way it appears in cache keys and `until=` queries
pub fn format_cutoff(cutoff: &DateTime<Utc>) -> String {
    cutoff.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Cutoff at the precision the API filters with
///
/// Both lookups compare against this value, so a commit query and a release
/// scan for the same cutoff agree on the instant.
pub fn truncate_cutoff(cutoff: &DateTime<Utc>) -> DateTime<Utc> {
    cutoff.trunc_subsecs(0)
}

pub fn commit_cache_key(owner: &str, repo: &str, branch: &str, cutoff: &DateTime<Utc>) -> String {
    format!("{owner}/{repo}/{branch}/{}", format_cutoff(cutoff))
}

pub fn release_cache_key(owner: &str, repo: &str, cutoff: &DateTime<Utc>) -> String {
    format!("{owner}/{repo}/{}", format_cutoff(cutoff))
}

/// Process-scoped key -> identifier map
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: RwLock<HashMap<String, String>>,
}

impl ResolutionCache {
    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: String, value: String) {
        self.entries.write().await.insert(key, value);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Entry of `GET /repos/{owner}/{repo}/commits`
#[derive(Debug, Deserialize)]
struct CommitEntry {
    sha: String,
}

/// Entry of `GET /repos/{owner}/{repo}/releases`
#[derive(Debug, Deserialize)]
struct ReleaseEntry {
    tag_name: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ReleaseEntry {
    /// Drafts have no publish date; fall back to creation
    fn effective_at(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

/// Memoizing commit/release lookups
pub struct HistoryResolver {
    fetcher: Arc<dyn PagedFetch>,
    api_base: String,
    commits: ResolutionCache,
    releases: ResolutionCache,
}

impl HistoryResolver {
    /// Create a resolver against the public GitHub API
    pub fn new(fetcher: Arc<dyn PagedFetch>) -> Self {
        Self::with_api_base(fetcher, DEFAULT_API_BASE)
    }

    /// Create a resolver against a custom API base (GitHub Enterprise, tests)
    pub fn with_api_base(fetcher: Arc<dyn PagedFetch>, api_base: impl Into<String>) -> Self {
        Self {
            fetcher,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            commits: ResolutionCache::default(),
            releases: ResolutionCache::default(),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn PagedFetch> {
        &self.fetcher
    }

    pub fn commit_cache(&self) -> &ResolutionCache {
        &self.commits
    }

    pub fn release_cache(&self) -> &ResolutionCache {
        &self.releases
    }

    /// Newest commit on `branch` at or before `cutoff`
    ///
    /// The API filters with `until=` and returns at most one commit; an empty
    /// answer means the branch has no history before the cutoff.
    pub async fn resolve_commit_before(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        cutoff: &DateTime<Utc>,
    ) -> Result<String> {
        let cutoff = &truncate_cutoff(cutoff);
        let key = commit_cache_key(owner, repo, branch, cutoff);
        if let Some(sha) = self.commits.get(&key).await {
            debug!("Commit cache hit for {}", key);
            return Ok(sha);
        }

        let url = format!(
            "{}/repos/{owner}/{repo}/commits?sha={branch}&until={}&per_page=1",
            self.api_base,
            format_cutoff(cutoff)
        );
        let value = self.fetcher.get_json(&url).await?;
        let commits: Vec<CommitEntry> =
            serde_json::from_value(value).map_err(|source| Error::Payload {
                url: url.clone(),
                source,
            })?;

        let sha = commits
            .into_iter()
            .next()
            .map(|c| c.sha)
            .ok_or_else(|| Error::Resolution {
                kind: "commit",
                owner: owner.to_string(),
                repo: repo.to_string(),
                cutoff: format_cutoff(cutoff),
            })?;

        info!("Resolved {}/{}@{} before {} to {}", owner, repo, branch, format_cutoff(cutoff), sha);
        self.commits.insert(key, sha.clone()).await;
        Ok(sha)
    }

    /// Tag of the first release, in listing order, at or before `cutoff`
    ///
    /// Pages are scanned one after another until a match or an empty page.
    /// The listing is not assumed to be sorted by date, so the first
    /// qualifying entry wins even if a later one is chronologically closer.
    pub async fn resolve_release_before(
        &self,
        owner: &str,
        repo: &str,
        cutoff: &DateTime<Utc>,
    ) -> Result<Option<String>> {
        let cutoff = &truncate_cutoff(cutoff);
        let key = release_cache_key(owner, repo, cutoff);
        if let Some(tag) = self.releases.get(&key).await {
            debug!("Release cache hit for {}", key);
            return Ok(Some(tag));
        }

        let mut page: u32 = 1;
        loop {
            let url = format!("{}/repos/{owner}/{repo}/releases?page={page}", self.api_base);
            let value = self.fetcher.get_json(&url).await?;
            let releases: Vec<ReleaseEntry> =
                serde_json::from_value(value).map_err(|source| Error::Payload {
                    url: url.clone(),
                    source,
                })?;

            if releases.is_empty() {
                debug!("Release history of {}/{} exhausted at page {}", owner, repo, page);
                return Ok(None);
            }

            if let Some(release) = releases.iter().find(|r| r.effective_at() <= *cutoff) {
                let tag = release.tag_name.clone();
                info!(
                    "Resolved release of {}/{} before {} to {} (page {})",
                    owner,
                    repo,
                    format_cutoff(cutoff),
                    tag,
                    page
                );
                self.releases.insert(key, tag.clone()).await;
                return Ok(Some(tag));
            }

            page += 1;
        }
    }

    /// Like [`resolve_release_before`](Self::resolve_release_before), but a
    /// missing release is a resolution error
    pub async fn require_release_before(
        &self,
        owner: &str,
        repo: &str,
        cutoff: &DateTime<Utc>,
    ) -> Result<String> {
        self.resolve_release_before(owner, repo, cutoff)
            .await?
            .ok_or_else(|| Error::Resolution {
                kind: "release",
                owner: owner.to_string(),
                repo: repo.to_string(),
                cutoff: format_cutoff(cutoff),
            })
    }
}
