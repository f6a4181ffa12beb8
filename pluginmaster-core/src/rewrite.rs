//! Manifest URL rewriting
//!
//! Two modes, picked per source by the caller:
//! - proxy: send every recognized GitHub URL through a caching mirror
//! - date: pin raw-content refs and "latest" release links to what existed
//!   at the cutoff

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tracing::{debug, error};

use crate::error::Result;
use crate::history::HistoryResolver;
use crate::manifest::Manifest;
use crate::url::{self, GitHubUrl};

/// Default caching mirror prefix
pub const DEFAULT_MIRROR: &str = "https://ghproxy.com/";

/// Rewrite every URL-bearing field to go through `mirror`
///
/// Idempotent: mirrored URLs no longer classify as GitHub URLs.
pub fn to_proxy(manifests: &[Manifest], mirror: &str) -> Vec<Manifest> {
    manifests
        .iter()
        .map(|manifest| manifest.map_urls(|u| url::proxy_url(u, mirror)))
        .collect()
}

/// Pin one URL to the cutoff
///
/// Fixed-tag release links are already concrete and pass through, as do
/// URLs that are not GitHub content.
pub async fn url_to_date_before(
    resolver: &HistoryResolver,
    raw: &str,
    cutoff: &DateTime<Utc>,
) -> Result<String> {
    match GitHubUrl::classify(raw) {
        GitHubUrl::RawContent {
            owner,
            repo,
            reference,
            path,
        } => {
            let sha = resolver
                .resolve_commit_before(&owner, &repo, &reference, cutoff)
                .await?;
            Ok(url::raw_content_url(&owner, &repo, &sha, &path))
        }
        GitHubUrl::LatestReleaseAsset {
            owner,
            repo,
            tailing,
        } => {
            let tag = resolver.require_release_before(&owner, &repo, cutoff).await?;
            Ok(url::release_asset_url(&owner, &repo, &tag, &tailing))
        }
        GitHubUrl::ReleaseAsset { .. } | GitHubUrl::Unrecognized => Ok(raw.to_string()),
    }
}

/// Rewrite one manifest; the first failing field abandons the manifest
pub async fn manifest_to_date_before(
    resolver: &HistoryResolver,
    manifest: &Manifest,
    cutoff: &DateTime<Utc>,
) -> Result<Manifest> {
    let originals: Vec<String> = manifest.urls().into_iter().map(str::to_string).collect();
    let pinned = try_join_all(
        originals
            .iter()
            .map(|u| url_to_date_before(resolver, u, cutoff)),
    )
    .await
    .inspect_err(|e| error!("Failed to pin {}: {}", manifest.display_name(), e))?;

    let mut pinned = pinned.into_iter();
    let rewritten = manifest.map_urls(|original| pinned.next().unwrap_or_else(|| original.to_string()));

    debug!("Pinned {} URLs of {}", originals.len(), manifest.display_name());
    Ok(rewritten)
}

/// Rewrite every manifest to the state at `cutoff`
///
/// Manifests are processed concurrently; lookups of the same repository
/// share the resolver's caches.
pub async fn to_date_before(
    manifests: &[Manifest],
    cutoff: &DateTime<Utc>,
    resolver: &HistoryResolver,
) -> Result<Vec<Manifest>> {
    try_join_all(
        manifests
            .iter()
            .map(|manifest| manifest_to_date_before(resolver, manifest, cutoff)),
    )
    .await
}
